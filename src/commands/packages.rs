//! Package manager commands.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::command_args::CommandArgs;

/// Package manager used to install the OS packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    /// Amazon Linux 2023
    #[default]
    Dnf,
    /// Amazon Linux 2
    Yum,
}

impl PackageManager {
    pub fn binary(self) -> &'static str {
        match self {
            Self::Dnf => "dnf",
            Self::Yum => "yum",
        }
    }
}

/// `dnf install -y <packages...>`
#[derive(Debug, Clone)]
pub struct InstallPackagesArgs {
    pub manager: PackageManager,
    pub packages: Vec<String>,
}

impl CommandArgs for InstallPackagesArgs {
    fn program(&self) -> &str {
        self.manager.binary()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["install".to_string(), "-y".to_string()];
        args.extend(self.packages.iter().cloned());
        args
    }
}

/// `rpm -q <packages...>`; exits 0 only if every package is installed.
#[derive(Debug, Clone)]
pub struct QueryPackagesArgs {
    pub packages: Vec<String>,
}

impl CommandArgs for QueryPackagesArgs {
    fn program(&self) -> &str {
        "rpm"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["-q".to_string()];
        args.extend(self.packages.iter().cloned());
        args
    }

    fn is_mutating(&self) -> bool {
        false
    }
}
