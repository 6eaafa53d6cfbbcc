//! MariaDB bootstrap.
//!
//! The server is restarted with grant tables disabled so root can be given a
//! password without knowing the current one. Readiness is polled with
//! `mysqladmin ping` after every start. Once the server is back in normal
//! mode the application database and user are created through an option
//! file holding the new root credential, and both credentials are checked.

use std::path::PathBuf;

use tracing::{info, warn};

use super::{ProvisionContext, Step};
use crate::command_runner::{probe, run_checked, run_command};
use crate::commands::mysql::{
    MysqlArgs, MysqlAuth, MysqladminPingArgs, OptionFile, quote_identifier, quote_literal,
};
use crate::commands::systemctl::{ManagerEnvArgs, ServiceAction, SystemctlArgs};
use crate::error::{ProvisionError, Result};
use crate::readiness::wait_until;
use crate::secrets::SecretBundle;
use crate::stage::ProvisionStage;

const SERVER_OPTS_KEY: &str = "MYSQLD_OPTS";
const GRANT_BYPASS_OPTS: &str = "--skip-grant-tables --skip-networking";

/// SQL that sets the root password while grant tables are skipped.
///
/// The leading `FLUSH PRIVILEGES` reloads the grant tables so `ALTER USER`
/// is accepted.
pub fn root_password_sql(root_password: &str) -> String {
    format!(
        "FLUSH PRIVILEGES;\nALTER USER 'root'@'localhost' IDENTIFIED BY {};\nFLUSH PRIVILEGES;\n",
        quote_literal(root_password)
    )
}

/// SQL that creates the application database and its scoped user.
pub fn application_sql(bundle: &SecretBundle) -> String {
    let database = quote_identifier(&bundle.db_name);
    let user = quote_literal(&bundle.db_user);
    format!(
        "CREATE DATABASE {database};\n\
         CREATE USER {user}@'localhost' IDENTIFIED BY {password};\n\
         GRANT ALL PRIVILEGES ON {database}.* TO {user}@'localhost';\n\
         FLUSH PRIVILEGES;\n",
        password = quote_literal(&bundle.db_password),
    )
}

fn schema_query(db_name: &str) -> String {
    format!(
        "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = {};",
        quote_literal(db_name)
    )
}

/// Path logged in place of the root option file when nothing is written.
fn dry_run_option_file() -> PathBuf {
    std::env::temp_dir().join(".wpprovision-my-dry-run.cnf")
}

pub struct BootstrapDatabase;

impl BootstrapDatabase {
    fn service(&self, ctx: &ProvisionContext<'_>, action: ServiceAction) -> SystemctlArgs {
        SystemctlArgs::new(action, &[ctx.config.db_service.as_str()])
    }

    fn wait_for_server(&self, ctx: &ProvisionContext<'_>) -> Result<()> {
        if ctx.dry_run {
            info!("[DRY RUN] Skipped readiness wait for {}", ctx.config.db_service);
            return Ok(());
        }
        wait_until(&ctx.config.db_service, ctx.config.readiness_policy(), || {
            probe(ctx.runner, &MysqladminPingArgs)
        })?;
        Ok(())
    }

    /// Set the root password with grant tables skipped.
    fn reset_root_password(&self, ctx: &ProvisionContext<'_>, root_password: &str) -> Result<()> {
        run_checked(ctx.runner, &self.service(ctx, ServiceAction::Stop))?;
        run_checked(
            ctx.runner,
            &ManagerEnvArgs::Set {
                key: SERVER_OPTS_KEY.to_string(),
                value: GRANT_BYPASS_OPTS.to_string(),
            },
        )?;

        let bypassed = (|| -> Result<()> {
            run_checked(ctx.runner, &self.service(ctx, ServiceAction::Start))?;
            self.wait_for_server(ctx)?;
            run_checked(
                ctx.runner,
                &MysqlArgs::execute(MysqlAuth::RootWithoutPassword, root_password_sql(root_password)),
            )?;
            run_checked(ctx.runner, &self.service(ctx, ServiceAction::Stop))?;
            Ok(())
        })();

        // Never leave the server configured without grant tables
        let unset = run_checked(
            ctx.runner,
            &ManagerEnvArgs::Unset {
                key: SERVER_OPTS_KEY.to_string(),
            },
        );
        if let (Err(_), Err(e)) = (&bypassed, &unset) {
            warn!("failed to clear {}: {}", SERVER_OPTS_KEY, e);
        }
        bypassed?;
        unset?;

        run_checked(ctx.runner, &self.service(ctx, ServiceAction::Start))?;
        self.wait_for_server(ctx)
    }

    /// The passwordless root login must be refused and both new credentials
    /// accepted.
    fn verify_credentials(&self, ctx: &ProvisionContext<'_>, bundle: &SecretBundle) -> Result<()> {
        let anonymous_root = run_command(
            ctx.runner,
            &MysqlArgs::query(MysqlAuth::RootWithoutPassword, "SELECT 1;"),
        )?;
        if anonymous_root.success {
            return Err(ProvisionError::verification(
                "root still accepts a login without a password",
            ));
        }

        let root = OptionFile::new("root", &bundle.root_password)?;
        let output = run_command(
            ctx.runner,
            &MysqlArgs::query(MysqlAuth::OptionFile(root.path().to_path_buf()), "SELECT 1;"),
        )?;
        if !output.success {
            return Err(ProvisionError::verification(format!(
                "root password is not accepted: {}",
                output.stderr.trim()
            )));
        }

        let app = OptionFile::new(&bundle.db_user, &bundle.db_password)?;
        let output = run_command(
            ctx.runner,
            &MysqlArgs::query(
                MysqlAuth::OptionFile(app.path().to_path_buf()),
                schema_query(&bundle.db_name),
            ),
        )?;
        if !output.success || output.stdout.trim() != bundle.db_name {
            return Err(ProvisionError::verification(format!(
                "user `{}` cannot reach database `{}`: {}",
                bundle.db_user,
                bundle.db_name,
                output.stderr.trim()
            )));
        }

        info!(db_user = %bundle.db_user, "database credentials verified");
        Ok(())
    }
}

impl Step for BootstrapDatabase {
    fn name(&self) -> &'static str {
        "bootstrap-database"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::BootstrappingDatabase
    }

    /// Satisfied when the server is running, the root password from the
    /// bundle authenticates and the application database exists.
    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        let bundle = ctx.secrets()?;
        if !probe(ctx.runner, &self.service(ctx, ServiceAction::IsActive))? {
            return Ok(false);
        }

        let root = OptionFile::new("root", &bundle.root_password)?;
        let output = run_command(
            ctx.runner,
            &MysqlArgs::query(
                MysqlAuth::OptionFile(root.path().to_path_buf()),
                schema_query(&bundle.db_name),
            ),
        )?;
        Ok(output.success && output.stdout.trim() == bundle.db_name)
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let ctx = &*ctx;
        let bundle = ctx.secrets()?;

        self.reset_root_password(ctx, &bundle.root_password)?;
        info!("root password set");

        let root = if ctx.dry_run {
            None
        } else {
            Some(OptionFile::new("root", &bundle.root_password)?)
        };
        let root_path = root
            .as_ref()
            .map_or_else(dry_run_option_file, |file| file.path().to_path_buf());
        run_checked(
            ctx.runner,
            &MysqlArgs::execute(MysqlAuth::OptionFile(root_path), application_sql(bundle)),
        )?;
        drop(root);
        info!(db_name = %bundle.db_name, db_user = %bundle.db_user, "application database created");

        if ctx.dry_run {
            info!("[DRY RUN] Skipped credential verification");
            return Ok(());
        }
        self.verify_credentials(ctx, bundle)
    }
}
