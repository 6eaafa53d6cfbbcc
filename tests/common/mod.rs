//! Shared fakes for integration tests.
//!
//! `FakeHost` stands in for the EC2 instance: it answers every command the
//! provisioner issues and tracks the resulting host state, so a second run
//! against the same host sees what the first one left behind.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;

use wpprovision::artifacts::ArtifactFetcher;
use wpprovision::command_runner::{CommandOutput, CommandRunner, Invocation};
use wpprovision::config::ProvisionConfig;
use wpprovision::error::{ProvisionError, Result};
use wpprovision::metadata::{InstanceMetadata, MetadataSource};
use wpprovision::steps::{ProvisionContext, Provisioner, RunReport, Step};

pub const ROOT_PASSWORD: &str = "r00t-Pa55";
pub const DB_PASSWORD: &str = "db-Pa55'word";
pub const ADMIN_PASSWORD: &str = "admin-Pa55";
pub const HOSTNAME: &str = "ec2-3-1-2-3.compute-1.amazonaws.com";

pub fn valid_payload() -> serde_json::Value {
    json!({
        "root_password": ROOT_PASSWORD,
        "db_name": "wordpress",
        "db_user": "wp_user",
        "db_password": DB_PASSWORD,
        "wp_admin_user": "admin",
        "wp_admin_password": ADMIN_PASSWORD,
        "wp_admin_email": "admin@example.com",
    })
}

#[derive(Debug, Default, Clone)]
pub struct HostState {
    pub packages_installed: bool,
    pub services_enabled: bool,
    pub root_password: Option<String>,
    pub grant_tables_skipped: bool,
    pub database_created: bool,
    pub app_password: Option<String>,
    pub core_installed: bool,
    pub theme_active: bool,
}

pub enum SecretStore {
    Payload(String),
    Missing,
}

pub struct FakeHost {
    pub state: RefCell<HostState>,
    pub calls: RefCell<Vec<Invocation>>,
    pub secret: SecretStore,
}

impl FakeHost {
    pub fn new(secret: SecretStore) -> Self {
        Self {
            state: RefCell::new(HostState::default()),
            calls: RefCell::new(Vec::new()),
            secret,
        }
    }

    pub fn with_valid_secret() -> Self {
        Self::new(SecretStore::Payload(valid_payload().to_string()))
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Invocation::command_line).collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.program.clone()).collect()
    }

    fn systemctl(&self, inv: &Invocation) -> CommandOutput {
        let mut state = self.state.borrow_mut();
        match inv.args.first().map(String::as_str) {
            Some("enable") => {
                state.services_enabled = true;
                CommandOutput::succeeded("")
            }
            Some("is-enabled") | Some("is-active") if !state.services_enabled => {
                CommandOutput::failed(3, "")
            }
            Some("set-environment") => {
                state.grant_tables_skipped = true;
                CommandOutput::succeeded("")
            }
            Some("unset-environment") => {
                state.grant_tables_skipped = false;
                CommandOutput::succeeded("")
            }
            _ => CommandOutput::succeeded(""),
        }
    }

    /// The password literal following `IDENTIFIED BY`, unescaped.
    fn identified_by(sql: &str) -> Option<String> {
        let start = sql.find("IDENTIFIED BY '")? + "IDENTIFIED BY '".len();
        let mut password = String::new();
        let mut chars = sql[start..].chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => password.push(chars.next()?),
                '\'' => return Some(password),
                _ => password.push(c),
            }
        }
        None
    }

    /// Credentials from a `--defaults-extra-file` option file.
    fn option_file_login(inv: &Invocation) -> Option<(String, String)> {
        let path = inv.args.first()?.strip_prefix("--defaults-extra-file=")?;
        let contents = fs::read_to_string(path).ok()?;
        let mut user = None;
        let mut password = None;
        for line in contents.lines() {
            if let Some(v) = line.strip_prefix("user=") {
                user = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("password=") {
                password = Some(v.trim_matches('"').to_string());
            }
        }
        Some((user?, password?))
    }

    fn mysql(&self, inv: &Invocation) -> CommandOutput {
        let sql = inv.stdin.clone().unwrap_or_default();
        let mut state = self.state.borrow_mut();

        let authenticated = match Self::option_file_login(inv) {
            _ if state.grant_tables_skipped => true,
            Some((user, password)) if user == "root" => {
                state.root_password.as_deref() == Some(password.as_str())
            }
            Some((user, password)) => {
                user == "wp_user" && state.app_password.as_deref() == Some(password.as_str())
            }
            None => state.root_password.is_none(),
        };
        if !authenticated {
            return CommandOutput::failed(1, "ERROR 1045 (28000): Access denied");
        }

        if sql.contains("ALTER USER") {
            state.root_password = Self::identified_by(&sql);
            CommandOutput::succeeded("")
        } else if sql.contains("CREATE DATABASE") {
            if state.database_created {
                return CommandOutput::failed(
                    1,
                    "ERROR 1007 (HY000) at line 1: Can't create database 'wordpress'; database exists",
                );
            }
            state.database_created = true;
            state.app_password = Self::identified_by(&sql);
            CommandOutput::succeeded("")
        } else if sql.contains("SCHEMATA") {
            if state.database_created {
                CommandOutput::succeeded("wordpress\n")
            } else {
                CommandOutput::succeeded("")
            }
        } else {
            CommandOutput::succeeded("1\n")
        }
    }

    fn wp(&self, inv: &Invocation) -> CommandOutput {
        let mut state = self.state.borrow_mut();
        let sub: Vec<&str> = inv.args.iter().take(2).map(String::as_str).collect();
        match sub.as_slice() {
            ["core", "is-installed"] if !state.core_installed => CommandOutput::failed(1, ""),
            ["core", "install"] => {
                if !state.database_created {
                    return CommandOutput::failed(1, "Error establishing a database connection");
                }
                state.core_installed = true;
                CommandOutput::succeeded("Success: WordPress installed successfully.")
            }
            ["theme", "is-active"] if !state.theme_active => CommandOutput::failed(1, ""),
            ["theme", "install"] => {
                state.theme_active = true;
                CommandOutput::succeeded("")
            }
            _ => CommandOutput::succeeded(""),
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, inv: &Invocation) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(inv.clone());

        let output = match inv.program.as_str() {
            "aws" => match &self.secret {
                SecretStore::Payload(payload) => CommandOutput::succeeded(format!("{payload}\n")),
                SecretStore::Missing => CommandOutput::failed(
                    254,
                    "An error occurred (ResourceNotFoundException) when calling the \
                     GetSecretValue operation: Secrets Manager can't find the specified secret.",
                ),
            },
            "dnf" | "yum" => {
                self.state.borrow_mut().packages_installed = true;
                CommandOutput::succeeded("Complete!")
            }
            "rpm" if !self.state.borrow().packages_installed => {
                CommandOutput::failed(1, "package httpd is not installed")
            }
            "systemctl" => self.systemctl(inv),
            "mysql" => self.mysql(inv),
            program if program.ends_with("/wp") => self.wp(inv),
            _ => CommandOutput::succeeded(""),
        };
        Ok(output)
    }
}

pub struct StaticMetadata;

impl MetadataSource for StaticMetadata {
    fn fetch(&self, region_override: Option<&str>) -> Result<InstanceMetadata> {
        InstanceMetadata::assemble(
            Some(region_override.unwrap_or("us-east-1").to_string()),
            Some(HOSTNAME.to_string()),
            Some("3.1.2.3".to_string()),
        )
    }
}

pub const WP_CONFIG_SAMPLE: &str = "<?php
define( 'DB_NAME', 'database_name_here' );
define( 'DB_USER', 'username_here' );
define( 'DB_PASSWORD', 'password_here' );
define( 'DB_HOST', 'localhost' );
define( 'AUTH_KEY',         'put your unique phrase here' );
define( 'SECURE_AUTH_KEY',  'put your unique phrase here' );
define( 'LOGGED_IN_KEY',    'put your unique phrase here' );
define( 'NONCE_KEY',        'put your unique phrase here' );
define( 'AUTH_SALT',        'put your unique phrase here' );
define( 'SECURE_AUTH_SALT', 'put your unique phrase here' );
define( 'LOGGED_IN_SALT',   'put your unique phrase here' );
define( 'NONCE_SALT',       'put your unique phrase here' );
$table_prefix = 'wp_';
";

pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serves the three artifacts and the salt block from memory.
pub struct LocalFetcher {
    config: ProvisionConfig,
    pub downloads: RefCell<Vec<String>>,
}

impl LocalFetcher {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            config: config.clone(),
            downloads: RefCell::new(Vec::new()),
        }
    }
}

impl ArtifactFetcher for LocalFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloads.borrow_mut().push(url.to_string());
        let body = if url == self.config.wordpress_url {
            tarball(&[
                ("wordpress/index.php", "<?php require __DIR__ . '/wp-blog-header.php';"),
                ("wordpress/wp-config-sample.php", WP_CONFIG_SAMPLE),
                ("wordpress/wp-admin/install.php", "<?php"),
            ])
        } else if url == self.config.phpmyadmin_url {
            tarball(&[
                ("phpMyAdmin-5.2.1-all-languages/index.php", "<?php"),
                (
                    "phpMyAdmin-5.2.1-all-languages/config.sample.inc.php",
                    "<?php\n$cfg['blowfish_secret'] = ''; /* YOU MUST FILL IN THIS FOR COOKIE AUTH! */\n",
                ),
            ])
        } else if url == self.config.wp_cli_url {
            b"#!/usr/bin/env php\n<?php // wp-cli".to_vec()
        } else {
            return Err(ProvisionError::http(format!("{url}: 404 Not Found")));
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, body)?;
        Ok(())
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        if url != self.config.salt_url {
            return Err(ProvisionError::http(format!("{url}: 404 Not Found")));
        }
        Ok([
            "AUTH_KEY",
            "SECURE_AUTH_KEY",
            "LOGGED_IN_KEY",
            "NONCE_KEY",
            "AUTH_SALT",
            "SECURE_AUTH_SALT",
            "LOGGED_IN_SALT",
            "NONCE_SALT",
        ]
        .iter()
        .map(|key| format!("define('{key}', '{key}-generated-salt');\n"))
        .collect())
    }
}

/// Configuration rooted in `root` with fast readiness polling.
pub fn sandbox_config(root: &Path) -> ProvisionConfig {
    let docroot = root.join("var/www/html");
    ProvisionConfig {
        staging_dir: root.join("staging"),
        wordpress_mirror_dir: docroot.join("wordpress"),
        phpmyadmin_dir: docroot.join("phpMyAdmin"),
        wp_cli_path: root.join("usr/local/bin/wp"),
        document_root: docroot,
        log_file: root.join("wordpress-install.log"),
        readiness_timeout_secs: 1,
        readiness_interval_ms: 1,
        ..ProvisionConfig::default()
    }
}

/// Run `steps` against `host` and return the result with the provisioner.
pub fn run_steps(
    host: &FakeHost,
    config: &ProvisionConfig,
    steps: Vec<Box<dyn Step>>,
    skip_completed: bool,
) -> (Result<RunReport>, Provisioner) {
    let fetcher = LocalFetcher::new(config);
    let mut ctx = ProvisionContext::new(config, host, &StaticMetadata, &fetcher, false);
    let mut provisioner = Provisioner::new(steps, skip_completed);
    let result = provisioner.run(&mut ctx);
    (result, provisioner)
}
