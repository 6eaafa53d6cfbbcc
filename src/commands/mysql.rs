//! MariaDB client commands and SQL quoting.
//!
//! SQL is always written to the client's stdin. Credentials reach the client
//! either not at all (root before a password is set, or with grant tables
//! skipped) or through an `OptionFile` passed as `--defaults-extra-file`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::command_args::CommandArgs;

// ============================================================================
// OptionFile - client credentials on disk for the lifetime of a step
// ============================================================================

/// A `[client]` option file holding a user and password.
///
/// Created with mode 0600; overwritten with zeros and unlinked on drop, so the
/// password never shows up in `ps` output or shell history.
#[derive(Debug)]
pub struct OptionFile {
    path: PathBuf,
    size: usize,
}

impl OptionFile {
    /// Create the option file in the system temp directory.
    pub fn new(user: &str, password: &str) -> std::io::Result<Self> {
        Self::new_in(&std::env::temp_dir(), user, password)
    }

    /// Create the option file in `dir`.
    pub fn new_in(dir: &Path, user: &str, password: &str) -> std::io::Result<Self> {
        let suffix: u64 = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            ^ u64::from(std::process::id());
        let path = dir.join(format!(".wpprovision-my-{:016x}.cnf", suffix));

        let contents = format!(
            "[client]\nuser={}\npassword=\"{}\"\n",
            user,
            escape_option_value(password)
        );

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;

        debug!(path = %path.display(), "option file created");

        Ok(Self {
            path,
            size: contents.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn secure_wipe(&self) {
        if let Ok(mut file) = OpenOptions::new().write(true).open(&self.path) {
            let _ = file.write_all(&vec![0u8; self.size]);
            let _ = file.sync_all();
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove option file");
        }
    }
}

impl Drop for OptionFile {
    fn drop(&mut self) {
        self.secure_wipe();
    }
}

/// Escape a value for a double-quoted option file entry.
///
/// Only backslashes need escaping; passwords with `"` or line breaks are rejected
/// when the secret bundle is validated.
fn escape_option_value(value: &str) -> String {
    value.replace('\\', "\\\\")
}

// ============================================================================
// SQL quoting
// ============================================================================

/// Quote a string literal: `it's` becomes `'it\'s'`.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

// ============================================================================
// Client invocations
// ============================================================================

/// How the client authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MysqlAuth {
    /// `-u root` with no password
    RootWithoutPassword,
    /// `--defaults-extra-file=<path>`
    OptionFile(PathBuf),
}

impl MysqlAuth {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            // --defaults-extra-file must be the first argument
            Self::OptionFile(path) => {
                args.push(format!("--defaults-extra-file={}", path.display()));
            }
            Self::RootWithoutPassword => {
                args.push("-u".to_string());
                args.push("root".to_string());
            }
        }
    }
}

/// `mysql --batch --skip-column-names` with SQL on stdin.
#[derive(Debug, Clone)]
pub struct MysqlArgs {
    pub auth: MysqlAuth,
    pub sql: String,
    pub mutating: bool,
}

impl MysqlArgs {
    /// A read-only query.
    pub fn query(auth: MysqlAuth, sql: impl Into<String>) -> Self {
        Self {
            auth,
            sql: sql.into(),
            mutating: false,
        }
    }

    /// A statement batch that changes server state.
    pub fn execute(auth: MysqlAuth, sql: impl Into<String>) -> Self {
        Self {
            auth,
            sql: sql.into(),
            mutating: true,
        }
    }
}

impl CommandArgs for MysqlArgs {
    fn program(&self) -> &str {
        "mysql"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        self.auth.push_args(&mut args);
        args.push("--batch".to_string());
        args.push("--skip-column-names".to_string());
        args
    }

    fn stdin(&self) -> Option<String> {
        Some(self.sql.clone())
    }

    fn is_mutating(&self) -> bool {
        self.mutating
    }

    fn is_sensitive(&self) -> bool {
        true
    }
}

/// `mysqladmin ping --silent`; exits 0 once the server accepts connections,
/// even if the anonymous login itself is refused.
#[derive(Debug, Clone, Default)]
pub struct MysqladminPingArgs;

impl CommandArgs for MysqladminPingArgs {
    fn program(&self) -> &str {
        "mysqladmin"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["ping".to_string(), "--silent".to_string()]
    }

    fn is_mutating(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it\\'s'");
        assert_eq!(quote_literal("back\\slash"), "'back\\\\slash'");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("wordpress"), "`wordpress`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_option_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let file = OptionFile::new_in(dir.path(), "root", "s3cr\\et").unwrap();
            path = file.path().to_path_buf();

            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(contents, "[client]\nuser=root\npassword=\"s3cr\\\\et\"\n");

            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        assert!(!path.exists(), "option file should be removed on drop");
    }

    #[test]
    fn test_mysql_args_with_option_file() {
        let args = MysqlArgs::execute(
            MysqlAuth::OptionFile(PathBuf::from("/tmp/x.cnf")),
            "FLUSH PRIVILEGES;",
        );
        assert_eq!(
            args.to_cli_args(),
            vec![
                "--defaults-extra-file=/tmp/x.cnf",
                "--batch",
                "--skip-column-names"
            ]
        );
        assert_eq!(args.stdin().as_deref(), Some("FLUSH PRIVILEGES;"));
        assert!(args.is_sensitive());
        assert!(args.is_mutating());
    }

    #[test]
    fn test_mysql_query_without_password() {
        let args = MysqlArgs::query(MysqlAuth::RootWithoutPassword, "SELECT 1");
        assert_eq!(
            args.to_cli_args(),
            vec!["-u", "root", "--batch", "--skip-column-names"]
        );
        assert!(!args.is_mutating());
    }
}
