//! Typed argument structs for every external program.
//!
//! Each struct implements `CommandArgs` and maps its fields to the exact
//! flags the program expects.

pub mod aws;
pub mod files;
pub mod mysql;
pub mod packages;
pub mod systemctl;
pub mod wp_cli;
