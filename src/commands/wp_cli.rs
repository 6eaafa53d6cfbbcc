//! wp-cli invocations.
//!
//! The provisioner runs as root, so every call carries `--allow-root` and an
//! explicit `--path` to the WordPress document root.

use std::path::PathBuf;

use crate::command_args::CommandArgs;

/// The wp-cli subcommands the provisioner uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WpCommand {
    /// `core is-installed`
    CoreIsInstalled,
    /// `core install`; the admin password is read from stdin via `--prompt`
    CoreInstall {
        url: String,
        title: String,
        admin_user: String,
        admin_email: String,
        admin_password: String,
    },
    /// `theme is-active <slug>`
    ThemeIsActive(String),
    /// `theme install <slug> --activate`
    ThemeInstall(String),
    /// `option update <key> <value>`
    OptionUpdate { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct WpArgs {
    /// Path of the wp-cli executable
    pub binary: String,
    /// WordPress document root
    pub path: PathBuf,
    pub command: WpCommand,
}

impl WpArgs {
    pub fn new(binary: impl Into<String>, path: impl Into<PathBuf>, command: WpCommand) -> Self {
        Self {
            binary: binary.into(),
            path: path.into(),
            command,
        }
    }
}

impl CommandArgs for WpArgs {
    fn program(&self) -> &str {
        &self.binary
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = match &self.command {
            WpCommand::CoreIsInstalled => vec!["core".into(), "is-installed".into()],
            WpCommand::CoreInstall {
                url,
                title,
                admin_user,
                admin_email,
                ..
            } => vec![
                "core".into(),
                "install".into(),
                format!("--url={url}"),
                format!("--title={title}"),
                format!("--admin_user={admin_user}"),
                format!("--admin_email={admin_email}"),
                "--skip-email".into(),
                "--prompt=admin_password".into(),
            ],
            WpCommand::ThemeIsActive(theme) => {
                vec!["theme".into(), "is-active".into(), theme.clone()]
            }
            WpCommand::ThemeInstall(theme) => vec![
                "theme".into(),
                "install".into(),
                theme.clone(),
                "--activate".into(),
            ],
            WpCommand::OptionUpdate { key, value } => {
                vec!["option".into(), "update".into(), key.clone(), value.clone()]
            }
        };
        args.push(format!("--path={}", self.path.display()));
        args.push("--allow-root".into());
        args
    }

    fn stdin(&self) -> Option<String> {
        match &self.command {
            WpCommand::CoreInstall { admin_password, .. } => Some(format!("{admin_password}\n")),
            _ => None,
        }
    }

    fn is_mutating(&self) -> bool {
        !matches!(
            self.command,
            WpCommand::CoreIsInstalled | WpCommand::ThemeIsActive(_)
        )
    }

    fn is_sensitive(&self) -> bool {
        matches!(self.command, WpCommand::CoreInstall { .. })
    }
}
