//! AWS CLI commands.

use crate::command_args::CommandArgs;

/// `aws secretsmanager get-secret-value --region <r> --secret-id <id>
/// --query SecretString --output text`
///
/// Stdout is the raw secret string, so the invocation is sensitive.
#[derive(Debug, Clone)]
pub struct GetSecretValueArgs {
    pub region: String,
    pub secret_id: String,
}

impl CommandArgs for GetSecretValueArgs {
    fn program(&self) -> &str {
        "aws"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "secretsmanager".to_string(),
            "get-secret-value".to_string(),
            "--region".to_string(),
            self.region.clone(),
            "--secret-id".to_string(),
            self.secret_id.clone(),
            "--query".to_string(),
            "SecretString".to_string(),
            "--output".to_string(),
            "text".to_string(),
        ]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        // Keep the pager from swallowing output on hosts with AWS CLI v2
        vec![("AWS_PAGER".to_string(), String::new())]
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn is_sensitive(&self) -> bool {
        true
    }
}
