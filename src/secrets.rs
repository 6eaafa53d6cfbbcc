//! Secret bundle retrieval and validation.
//!
//! The bundle is a JSON object with seven string fields, fetched once from
//! AWS Secrets Manager and kept only in memory. Retrieval makes a single
//! attempt; any failure ends the run with exit code 1.

use std::fmt;

use serde_json::Value;
use tracing::info;

use crate::command_runner::{CommandRunner, run_command};
use crate::commands::aws::GetSecretValueArgs;
use crate::error::{ProvisionError, Result};

/// Required keys, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "root_password",
    "db_name",
    "db_user",
    "db_password",
    "wp_admin_user",
    "wp_admin_password",
    "wp_admin_email",
];

const MAX_DB_NAME_LEN: usize = 64;
const MAX_DB_USER_LEN: usize = 80;

#[derive(Clone, PartialEq, Eq)]
pub struct SecretBundle {
    pub root_password: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub wp_admin_user: String,
    pub wp_admin_password: String,
    pub wp_admin_email: String,
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("root_password", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("wp_admin_user", &self.wp_admin_user)
            .field("wp_admin_password", &"<redacted>")
            .field("wp_admin_email", &self.wp_admin_email)
            .finish()
    }
}

impl SecretBundle {
    /// Parse and validate a secret payload.
    ///
    /// # Errors
    ///
    /// - `SecretRetrieval` if the payload is empty
    /// - `SecretValidation` if it is not a JSON object, a required key is
    ///   missing or blank, or a value is malformed
    pub fn from_json(payload: &str) -> Result<Self> {
        if payload.trim().is_empty() {
            return Err(ProvisionError::secret_retrieval("secret payload is empty"));
        }

        let value: Value = serde_json::from_str(payload.trim()).map_err(|e| {
            ProvisionError::secret_validation(format!("secret payload is not valid JSON: {e}"))
        })?;
        let Value::Object(map) = value else {
            return Err(ProvisionError::secret_validation(
                "secret payload must be a JSON object",
            ));
        };

        let field = |key: &str| -> Result<String> {
            match map.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                Some(Value::String(_)) | None | Some(Value::Null) => {
                    Err(ProvisionError::secret_validation(format!(
                        "required field `{key}` is missing or empty"
                    )))
                }
                Some(_) => Err(ProvisionError::secret_validation(format!(
                    "required field `{key}` must be a string"
                ))),
            }
        };

        let bundle = Self {
            root_password: field("root_password")?,
            db_name: field("db_name")?,
            db_user: field("db_user")?,
            db_password: field("db_password")?,
            wp_admin_user: field("wp_admin_user")?,
            wp_admin_password: field("wp_admin_password")?,
            wp_admin_email: field("wp_admin_email")?,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<()> {
        check_identifier("db_name", &self.db_name, MAX_DB_NAME_LEN)?;
        check_identifier("db_user", &self.db_user, MAX_DB_USER_LEN)?;

        // Written verbatim into a double-quoted option file value
        if self
            .root_password
            .chars()
            .any(|c| c == '"' || c == '\n' || c == '\r')
        {
            return Err(ProvisionError::secret_validation(
                "field `root_password` must not contain double quotes or line breaks",
            ));
        }

        // Fed to wp-cli as a single stdin line
        if self.wp_admin_password.contains(['\n', '\r']) {
            return Err(ProvisionError::secret_validation(
                "field `wp_admin_password` must not contain line breaks",
            ));
        }

        let mut parts = self.wp_admin_email.split('@');
        let valid_email = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
        );
        if !valid_email {
            return Err(ProvisionError::secret_validation(format!(
                "field `wp_admin_email` is not an email address: {:?}",
                self.wp_admin_email
            )));
        }

        Ok(())
    }
}

fn check_identifier(name: &str, value: &str, max_len: usize) -> Result<()> {
    if value.len() > max_len {
        return Err(ProvisionError::secret_validation(format!(
            "field `{name}` is longer than {max_len} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(ProvisionError::secret_validation(format!(
            "field `{name}` may only contain letters, digits, `_` and `$`"
        )));
    }
    Ok(())
}

/// Fetch the raw secret string from Secrets Manager.
pub fn fetch_secret_payload(
    runner: &dyn CommandRunner,
    region: &str,
    secret_id: &str,
) -> Result<String> {
    info!(region, secret_id, "retrieving secret bundle");

    let args = GetSecretValueArgs {
        region: region.to_string(),
        secret_id: secret_id.to_string(),
    };
    let output = run_command(runner, &args)?;

    if !output.success {
        return Err(ProvisionError::secret_retrieval(format!(
            "could not read secret `{}` in {}: {}",
            secret_id,
            region,
            output.stderr.trim()
        )));
    }

    let payload = output.stdout.trim();
    // The CLI prints `None` when the secret has no SecretString
    if payload.is_empty() || payload == "None" {
        return Err(ProvisionError::secret_retrieval(format!(
            "secret `{}` returned an empty payload",
            secret_id
        )));
    }

    Ok(payload.to_string())
}
