//! Rendering of `wp-config.php` and phpMyAdmin's `config.inc.php`.
//!
//! Both are produced from the sample files shipped in the archives by plain
//! text substitution. A rendered `wp-config.php` must not contain any of the
//! sample's placeholder tokens.

use std::fs::File;
use std::io::Read;

use crate::error::{ProvisionError, Result};

pub const DB_NAME_TOKEN: &str = "database_name_here";
pub const DB_USER_TOKEN: &str = "username_here";
pub const DB_PASSWORD_TOKEN: &str = "password_here";
pub const SALT_TOKEN: &str = "put your unique phrase here";

/// Every token that must be gone from a rendered `wp-config.php`.
pub const WP_CONFIG_PLACEHOLDERS: [&str; 4] =
    [DB_NAME_TOKEN, DB_USER_TOKEN, DB_PASSWORD_TOKEN, SALT_TOKEN];

const BLOWFISH_EMPTY: &str = "$cfg['blowfish_secret'] = ''";

/// Database settings written into `wp-config.php`.
#[derive(Debug, Clone, Copy)]
pub struct DbSettings<'a> {
    pub name: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

/// Escape for a single-quoted PHP string.
pub fn php_single_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Render `wp-config.php` from `wp-config-sample.php`.
///
/// The database tokens are replaced with the escaped settings. The sample's
/// eight salt `define` lines are replaced by `salts`, the block served by the
/// WordPress secret-key API.
pub fn render_wp_config(sample: &str, db: DbSettings<'_>, salts: &str) -> Result<String> {
    let mut rendered = String::with_capacity(sample.len() + salts.len());
    let mut salts_written = false;

    for line in sample.split_inclusive('\n') {
        if line.contains(SALT_TOKEN) {
            if !salts_written {
                rendered.push_str(salts.trim_end());
                rendered.push('\n');
                salts_written = true;
            }
            continue;
        }
        rendered.push_str(line);
    }

    if !salts_written {
        return Err(ProvisionError::Placeholder {
            token: SALT_TOKEN.to_string(),
            path: "wp-config-sample.php (salt lines not found)".to_string(),
        });
    }

    let rendered = substitute_first(
        &rendered,
        &[
            (DB_NAME_TOKEN, php_single_quoted(db.name)),
            (DB_USER_TOKEN, php_single_quoted(db.user)),
            (DB_PASSWORD_TOKEN, php_single_quoted(db.password)),
        ],
    );

    Ok(rendered)
}

/// Replace the first occurrence of each token in a single left-to-right pass.
///
/// Substituted text is never rescanned, so a value that contains another
/// token stays as written.
fn substitute_first(text: &str, replacements: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut used = vec![false; replacements.len()];
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        let hit = replacements
            .iter()
            .enumerate()
            .find(|(i, (token, _))| !used[*i] && rest.starts_with(token));
        match hit {
            Some((i, (token, value))) => {
                out.push_str(value);
                rest = &rest[token.len()..];
                used[i] = true;
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Fail with `Placeholder` if `contents` still holds any of `tokens`.
///
/// Values substituted for the tokens are excluded from the search, so a
/// secret that merely contains token text does not trip the check.
pub fn ensure_no_placeholders(
    contents: &str,
    tokens: &[&str],
    substituted: &[&str],
    path: &str,
) -> Result<()> {
    let mut scrubbed = contents.to_string();
    for value in substituted.iter().filter(|v| !v.is_empty()) {
        scrubbed = scrubbed.replace(&php_single_quoted(value), "");
    }

    match tokens.iter().find(|token| scrubbed.contains(*token)) {
        Some(token) => Err(ProvisionError::Placeholder {
            token: (*token).to_string(),
            path: path.to_string(),
        }),
        None => Ok(()),
    }
}

/// The secret-key API answers with eight `define(...)` lines.
pub fn validate_salts(salts: &str) -> Result<()> {
    let defines = salts
        .lines()
        .filter(|l| l.trim_start().starts_with("define("))
        .count();
    if defines < 8 || salts.contains(SALT_TOKEN) {
        return Err(ProvisionError::http(format!(
            "salt response has {defines} define lines, expected 8"
        )));
    }
    Ok(())
}

/// Render `config.inc.php` from `config.sample.inc.php`.
pub fn render_phpmyadmin_config(sample: &str, blowfish_secret: &str) -> Result<String> {
    if !sample.contains(BLOWFISH_EMPTY) {
        return Err(ProvisionError::Placeholder {
            token: BLOWFISH_EMPTY.to_string(),
            path: "config.sample.inc.php (blowfish_secret line not found)".to_string(),
        });
    }
    let replacement = format!(
        "$cfg['blowfish_secret'] = '{}'",
        php_single_quoted(blowfish_secret)
    );
    Ok(sample.replacen(BLOWFISH_EMPTY, &replacement, 1))
}

/// 32 hex characters from the kernel CSPRNG, the length phpMyAdmin expects.
pub fn generate_blowfish_secret() -> Result<String> {
    let mut bytes = [0u8; 16];
    File::open("/dev/urandom")?.read_exact(&mut bytes)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
