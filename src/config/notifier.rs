use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Idle seconds before an ALIVE probe is sent and the pending GET_ID
    /// is reissued
    #[serde(default = "default_alive_idle_secs")]
    pub alive_idle_secs: u64,

    /// Reconnect policy; `max_retries` 0 means retry forever
    #[serde(default)]
    pub retry: BackoffPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            alive_idle_secs: default_alive_idle_secs(),
            retry: BackoffPolicy::default(),
        }
    }
}

impl NotifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "notifier: host cannot be empty".to_string(),
            )));
        }

        if self.alive_idle_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "notifier: alive_idle_secs cannot be 0".to_string(),
            )));
        }

        self.retry.validate("notifier.retry")?;

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6669
}
fn default_alive_idle_secs() -> u64 {
    300
}
