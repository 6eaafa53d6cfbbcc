//! Provisioning configuration.
//!
//! Every constant the bootstrap depends on lives here with a default equal to
//! the stock EC2 recipe, so running without a file behaves like the plain
//! user-data script. A JSON file may override any subset of fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commands::packages::PackageManager;
use crate::readiness::ReadinessPolicy;

pub const DEFAULT_LOG_FILE: &str = "/var/log/wordpress-install.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    // Secrets & metadata
    pub secret_id: String,
    /// Skips the region lookup when set
    pub region: Option<String>,
    pub metadata_endpoint: String,

    pub log_file: PathBuf,

    // Packages & services
    pub package_manager: PackageManager,
    pub packages: Vec<String>,
    pub web_service: String,
    pub db_service: String,

    // Artifacts
    pub wordpress_url: String,
    pub salt_url: String,
    pub phpmyadmin_url: String,
    pub wp_cli_url: String,
    pub staging_dir: PathBuf,
    pub document_root: PathBuf,
    /// Second WordPress copy, served under `/wordpress`
    pub wordpress_mirror_dir: PathBuf,
    pub phpmyadmin_dir: PathBuf,
    pub wp_cli_path: PathBuf,

    // Application
    pub site_title: String,
    pub theme: String,

    // Ownership
    pub web_user: String,
    pub web_group: String,
    /// Interactive login added to the web group
    pub login_user: String,

    // Timing
    pub readiness_timeout_secs: u64,
    pub readiness_interval_ms: u64,
    pub http_timeout_secs: u64,

    /// Probe each step and skip it when its outcome is already present
    pub skip_completed_steps: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            secret_id: "wordpress/bootstrap".to_string(),
            region: None,
            metadata_endpoint: "http://169.254.169.254".to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            package_manager: PackageManager::Dnf,
            packages: [
                "httpd",
                "mariadb105-server",
                "php",
                "php-mysqlnd",
                "php-fpm",
                "php-json",
                "php-mbstring",
                "php-xml",
                "php-gd",
                "php-intl",
                "php-zip",
                "wget",
            ]
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
            web_service: "httpd".to_string(),
            db_service: "mariadb".to_string(),
            wordpress_url: "https://wordpress.org/latest.tar.gz".to_string(),
            salt_url: "https://api.wordpress.org/secret-key/1.1/salt/".to_string(),
            phpmyadmin_url:
                "https://www.phpmyadmin.net/downloads/phpMyAdmin-latest-all-languages.tar.gz"
                    .to_string(),
            wp_cli_url:
                "https://raw.githubusercontent.com/wp-cli/builds/gh-pages/phar/wp-cli.phar"
                    .to_string(),
            staging_dir: PathBuf::from("/tmp/wpprovision"),
            document_root: PathBuf::from("/var/www/html"),
            wordpress_mirror_dir: PathBuf::from("/var/www/html/wordpress"),
            phpmyadmin_dir: PathBuf::from("/var/www/html/phpMyAdmin"),
            wp_cli_path: PathBuf::from("/usr/local/bin/wp"),
            site_title: "My WordPress Site".to_string(),
            theme: "astra".to_string(),
            web_user: "apache".to_string(),
            web_group: "apache".to_string(),
            login_user: "ec2-user".to_string(),
            readiness_timeout_secs: 60,
            readiness_interval_ms: 1000,
            http_timeout_secs: 120,
            skip_completed_steps: true,
        }
    }
}

impl ProvisionConfig {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise start from the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(
            Duration::from_secs(self.readiness_timeout_secs),
            Duration::from_millis(self.readiness_interval_ms),
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret_id.trim().is_empty() {
            anyhow::bail!("secret_id must be specified");
        }

        if let Some(region) = &self.region {
            if region.trim().is_empty()
                || !region
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                anyhow::bail!("region must look like `us-east-1`, got {:?}", region);
            }
        }

        if self.packages.is_empty() {
            anyhow::bail!("packages must not be empty");
        }
        if let Some(bad) = self
            .packages
            .iter()
            .find(|p| p.trim().is_empty() || p.starts_with('-'))
        {
            anyhow::bail!("invalid package name {:?}", bad);
        }

        for (name, service) in [("web_service", &self.web_service), ("db_service", &self.db_service)] {
            if service.trim().is_empty() {
                anyhow::bail!("{} must be specified", name);
            }
        }

        for (name, url) in [
            ("metadata_endpoint", &self.metadata_endpoint),
            ("wordpress_url", &self.wordpress_url),
            ("salt_url", &self.salt_url),
            ("phpmyadmin_url", &self.phpmyadmin_url),
            ("wp_cli_url", &self.wp_cli_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        for (name, path) in [
            ("log_file", &self.log_file),
            ("staging_dir", &self.staging_dir),
            ("document_root", &self.document_root),
            ("wordpress_mirror_dir", &self.wordpress_mirror_dir),
            ("phpmyadmin_dir", &self.phpmyadmin_dir),
            ("wp_cli_path", &self.wp_cli_path),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("{} must be an absolute path, got {:?}", name, path);
            }
        }

        if self.wordpress_mirror_dir == self.document_root {
            anyhow::bail!("wordpress_mirror_dir must differ from document_root");
        }

        if self.site_title.trim().is_empty() {
            anyhow::bail!("site_title must be specified");
        }

        if self.theme.is_empty()
            || !self
                .theme
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            anyhow::bail!("theme must be a wordpress.org theme slug, got {:?}", self.theme);
        }

        for (name, value) in [
            ("web_user", &self.web_user),
            ("web_group", &self.web_group),
            ("login_user", &self.login_user),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must be specified", name);
            }
        }

        if self.readiness_timeout_secs == 0 {
            anyhow::bail!("readiness_timeout_secs must be greater than zero");
        }
        if self.readiness_interval_ms == 0 {
            anyhow::bail!("readiness_interval_ms must be greater than zero");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be greater than zero");
        }

        Ok(())
    }
}
