//! WordPress, phpMyAdmin and wp-cli installation.
//!
//! Downloads land in the staging directory. WordPress is unpacked there once
//! and then copied to both the document root and the mirror directory, each
//! with its own rendered `wp-config.php`.

use std::fs;
use std::path::Path;

use tracing::info;

use super::{ProvisionContext, Step};
use crate::artifacts::{copy_tree, extract_tar_gz, make_executable};
use crate::error::Result;
use crate::stage::ProvisionStage;
use crate::wpconfig::{
    DbSettings, WP_CONFIG_PLACEHOLDERS, ensure_no_placeholders, generate_blowfish_secret,
    render_phpmyadmin_config, render_wp_config, validate_salts,
};

const WP_CONFIG: &str = "wp-config.php";
const WP_CONFIG_SAMPLE: &str = "wp-config-sample.php";
const PMA_CONFIG: &str = "config.inc.php";
const PMA_CONFIG_SAMPLE: &str = "config.sample.inc.php";

fn skip_download(ctx: &ProvisionContext<'_>, url: &str, dest: &Path) -> bool {
    if ctx.dry_run {
        info!("[DRY RUN] Skipped download of {} to {}", url, dest.display());
    }
    ctx.dry_run
}

pub struct InstallWordPress;

impl Step for InstallWordPress {
    fn name(&self) -> &'static str {
        "install-wordpress"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::InstallingArtifacts
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        Ok(ctx.config.document_root.join(WP_CONFIG).is_file()
            && ctx.config.wordpress_mirror_dir.join(WP_CONFIG).is_file())
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let config = ctx.config;
        let bundle = ctx.secrets()?;
        let archive = config.staging_dir.join("wordpress.tar.gz");
        if skip_download(ctx, &config.wordpress_url, &archive) {
            return Ok(());
        }

        fs::create_dir_all(&config.staging_dir)?;
        ctx.fetcher.download(&config.wordpress_url, &archive)?;

        let unpacked = config.staging_dir.join("wordpress");
        if unpacked.exists() {
            fs::remove_dir_all(&unpacked)?;
        }
        extract_tar_gz(&archive, &unpacked, 1)?;

        let salts = ctx.fetcher.fetch_text(&config.salt_url)?;
        validate_salts(&salts)?;

        let sample = fs::read_to_string(unpacked.join(WP_CONFIG_SAMPLE))?;
        let db = DbSettings {
            name: &bundle.db_name,
            user: &bundle.db_user,
            password: &bundle.db_password,
        };
        let rendered = render_wp_config(&sample, db, &salts)?;
        let substituted = [db.name, db.user, db.password];

        for dest in [&config.document_root, &config.wordpress_mirror_dir] {
            copy_tree(&unpacked, dest)?;

            let path = dest.join(WP_CONFIG);
            fs::write(&path, &rendered)?;
            let written = fs::read_to_string(&path)?;
            ensure_no_placeholders(
                &written,
                &WP_CONFIG_PLACEHOLDERS,
                &substituted,
                &path.display().to_string(),
            )?;
            info!(path = %dest.display(), "WordPress installed");
        }

        fs::remove_file(&archive)?;
        Ok(())
    }
}

pub struct InstallPhpMyAdmin;

impl Step for InstallPhpMyAdmin {
    fn name(&self) -> &'static str {
        "install-phpmyadmin"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::InstallingArtifacts
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        Ok(ctx.config.phpmyadmin_dir.join(PMA_CONFIG).is_file())
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let config = ctx.config;
        let archive = config.staging_dir.join("phpmyadmin.tar.gz");
        if skip_download(ctx, &config.phpmyadmin_url, &archive) {
            return Ok(());
        }

        fs::create_dir_all(&config.staging_dir)?;
        ctx.fetcher.download(&config.phpmyadmin_url, &archive)?;
        extract_tar_gz(&archive, &config.phpmyadmin_dir, 1)?;

        let sample = fs::read_to_string(config.phpmyadmin_dir.join(PMA_CONFIG_SAMPLE))?;
        let rendered = render_phpmyadmin_config(&sample, &generate_blowfish_secret()?)?;
        fs::write(config.phpmyadmin_dir.join(PMA_CONFIG), rendered)?;

        fs::remove_file(&archive)?;
        info!(path = %config.phpmyadmin_dir.display(), "phpMyAdmin installed");
        Ok(())
    }
}

pub struct InstallWpCli;

impl Step for InstallWpCli {
    fn name(&self) -> &'static str {
        "install-wp-cli"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::InstallingArtifacts
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        Ok(ctx.config.wp_cli_path.is_file())
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let config = ctx.config;
        if skip_download(ctx, &config.wp_cli_url, &config.wp_cli_path) {
            return Ok(());
        }

        ctx.fetcher.download(&config.wp_cli_url, &config.wp_cli_path)?;
        make_executable(&config.wp_cli_path)?;
        info!(path = %config.wp_cli_path.display(), "wp-cli installed");
        Ok(())
    }
}
