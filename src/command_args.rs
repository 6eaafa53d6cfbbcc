//! Type-safe command argument contracts.
//!
//! Every external program the provisioner drives is described by a struct
//! implementing `CommandArgs`. The struct is the contract: flag names live in
//! exactly one place, and the runner never sees a hand-assembled `Vec<String>`.
//!
//! Secrets never travel through argv. Implementors that need a password hand
//! it over through `stdin()` (or an option file path) and mark themselves
//! `is_sensitive()` so the runner keeps stdin and stdout out of the log.

/// Trait for typed command arguments.
///
/// # Contract
///
/// - `program()`: executable name or absolute path.
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `get_env_vars()`: extra environment for the child.
/// - `stdin()`: data written to the child's stdin, if any.
/// - `is_mutating()`: false for read-only probes, which still execute in
///   dry-run mode.
/// - `is_sensitive()`: true when stdin or stdout carries secret material.
pub trait CommandArgs {
    fn program(&self) -> &str;

    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    fn stdin(&self) -> Option<String> {
        None
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn is_sensitive(&self) -> bool {
        false
    }
}
