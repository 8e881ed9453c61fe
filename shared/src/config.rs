use std::env;
use thiserror::Error;

pub const DEFAULT_TABLE_NAME: &str = "evok-leads";
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoConfig {
    pub user_pool_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Runtime settings read once at cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_name: String,
    /// Origin allowed by CORS.
    pub client_url: String,
    pub cognito: CognitoConfig,
    /// Trust an `X-User-Id` header in place of authorizer claims (local development only).
    pub allow_user_id_header: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let allow_user_id_header = match lookup("ALLOW_USER_ID_HEADER").as_deref() {
            None | Some("") | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "ALLOW_USER_ID_HEADER",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            table_name: lookup("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            client_url: lookup("CLIENT_URL").unwrap_or_else(|| DEFAULT_CLIENT_URL.to_string()),
            cognito: CognitoConfig {
                user_pool_id: required("COGNITO_USER_POOL_ID")?,
                client_id: required("COGNITO_CLIENT_ID")?,
                client_secret: required("COGNITO_CLIENT_SECRET")?,
            },
            allow_user_id_header,
        })
    }

    /// Configuration for tests and local runs without AWS.
    pub fn local() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            client_url: DEFAULT_CLIENT_URL.to_string(),
            cognito: CognitoConfig {
                user_pool_id: "local".to_string(),
                client_id: "local".to_string(),
                client_secret: "local".to_string(),
            },
            allow_user_id_header: true,
        }
    }
}
