//! Ownership, mode and group membership commands.

use std::path::PathBuf;

use crate::command_args::CommandArgs;

/// `chown -R <owner>:<group> <path>`
#[derive(Debug, Clone)]
pub struct ChownArgs {
    pub owner: String,
    pub group: String,
    pub path: PathBuf,
}

impl CommandArgs for ChownArgs {
    fn program(&self) -> &str {
        "chown"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-R".to_string(),
            format!("{}:{}", self.owner, self.group),
            self.path.display().to_string(),
        ]
    }
}

/// Which entries of a tree a mode applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directories,
    Files,
}

impl EntryKind {
    fn find_type(self) -> &'static str {
        match self {
            Self::Directories => "d",
            Self::Files => "f",
        }
    }
}

/// `find <path> -type d|f -exec chmod <mode> {} +`
#[derive(Debug, Clone)]
pub struct ChmodTreeArgs {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Octal mode, e.g. `2775`
    pub mode: String,
}

impl CommandArgs for ChmodTreeArgs {
    fn program(&self) -> &str {
        "find"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.path.display().to_string(),
            "-type".to_string(),
            self.kind.find_type().to_string(),
            "-exec".to_string(),
            "chmod".to_string(),
            self.mode.clone(),
            "{}".to_string(),
            "+".to_string(),
        ]
    }
}

/// `usermod -a -G <group> <user>`
#[derive(Debug, Clone)]
pub struct AddToGroupArgs {
    pub user: String,
    pub group: String,
}

impl CommandArgs for AddToGroupArgs {
    fn program(&self) -> &str {
        "usermod"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-a".to_string(),
            "-G".to_string(),
            self.group.clone(),
            self.user.clone(),
        ]
    }
}
