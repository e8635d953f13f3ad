use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DirectoryConfig {
    /// LDAP URI of the authoritative directory
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Bind DN; empty means anonymous bind
    #[serde(default)]
    pub bind_dn: String,

    /// Bind password
    #[serde(default)]
    pub password: String,

    /// Search base of the replicated subtree
    #[serde(default)]
    pub base_dn: String,

    /// Per-operation timeout in seconds
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Reconnect policy; `max_retries` 0 means retry forever
    #[serde(default)]
    pub retry: BackoffPolicy,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            bind_dn: String::new(),
            password: String::new(),
            base_dn: String::new(),
            operation_timeout_secs: default_operation_timeout_secs(),
            retry: BackoffPolicy::default(),
        }
    }
}

impl DirectoryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.uri.starts_with("ldap://") && !self.uri.starts_with("ldapi://") {
            return Err(Error::Config(ConfigError::Message(format!(
                "directory: unsupported uri {:?}",
                self.uri
            ))));
        }

        if self.operation_timeout_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "directory: operation_timeout_secs cannot be 0".to_string(),
            )));
        }

        self.retry.validate("directory.retry")?;

        Ok(())
    }
}

fn default_uri() -> String {
    "ldap://localhost:389".to_string()
}
fn default_operation_timeout_secs() -> u64 {
    300
}
