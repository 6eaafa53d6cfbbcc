//! systemd service management.

use strum::Display;

use crate::command_args::CommandArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    /// `enable --now`
    EnableNow,
    IsActive,
    IsEnabled,
}

impl ServiceAction {
    pub fn is_query(self) -> bool {
        matches!(self, Self::IsActive | Self::IsEnabled)
    }
}

/// `systemctl <action> <units...>`
#[derive(Debug, Clone)]
pub struct SystemctlArgs {
    pub action: ServiceAction,
    pub units: Vec<String>,
}

impl SystemctlArgs {
    pub fn new(action: ServiceAction, units: &[&str]) -> Self {
        Self {
            action,
            units: units.iter().map(|u| (*u).to_string()).collect(),
        }
    }
}

impl CommandArgs for SystemctlArgs {
    fn program(&self) -> &str {
        "systemctl"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = match self.action {
            ServiceAction::EnableNow => vec!["enable".to_string(), "--now".to_string()],
            action if action.is_query() => vec![action.to_string(), "--quiet".to_string()],
            action => vec![action.to_string()],
        };
        args.extend(self.units.iter().cloned());
        args
    }

    fn is_mutating(&self) -> bool {
        !self.action.is_query()
    }
}

/// `systemctl set-environment KEY=VALUE` / `systemctl unset-environment KEY`
///
/// The MariaDB unit reads `MYSQLD_OPTS` from the manager environment, which
/// is how the server is started without grant tables.
#[derive(Debug, Clone)]
pub enum ManagerEnvArgs {
    Set { key: String, value: String },
    Unset { key: String },
}

impl CommandArgs for ManagerEnvArgs {
    fn program(&self) -> &str {
        "systemctl"
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self {
            Self::Set { key, value } => {
                vec!["set-environment".to_string(), format!("{key}={value}")]
            }
            Self::Unset { key } => vec!["unset-environment".to_string(), key.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_now() {
        let args = SystemctlArgs::new(ServiceAction::EnableNow, &["httpd", "mariadb"]);
        assert_eq!(
            args.to_cli_args(),
            vec!["enable", "--now", "httpd", "mariadb"]
        );
        assert!(args.is_mutating());
    }

    #[test]
    fn test_queries_are_quiet_and_read_only() {
        let args = SystemctlArgs::new(ServiceAction::IsActive, &["httpd"]);
        assert_eq!(args.to_cli_args(), vec!["is-active", "--quiet", "httpd"]);
        assert!(!args.is_mutating());

        let args = SystemctlArgs::new(ServiceAction::IsEnabled, &["mariadb"]);
        assert_eq!(args.to_cli_args(), vec!["is-enabled", "--quiet", "mariadb"]);
    }

    #[test]
    fn test_restart() {
        let args = SystemctlArgs::new(ServiceAction::Restart, &["httpd"]);
        assert_eq!(args.to_cli_args(), vec!["restart", "httpd"]);
    }

    #[test]
    fn test_manager_env() {
        let set = ManagerEnvArgs::Set {
            key: "MYSQLD_OPTS".into(),
            value: "--skip-grant-tables --skip-networking".into(),
        };
        assert_eq!(
            set.to_cli_args(),
            vec![
                "set-environment",
                "MYSQLD_OPTS=--skip-grant-tables --skip-networking"
            ]
        );

        let unset = ManagerEnvArgs::Unset {
            key: "MYSQLD_OPTS".into(),
        };
        assert_eq!(unset.to_cli_args(), vec!["unset-environment", "MYSQLD_OPTS"]);
    }
}
