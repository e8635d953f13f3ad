//! Configuration management for the directory listener.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod directory;
mod notifier;
mod retry;
mod runtime;

pub use directory::*;
pub use notifier::*;
pub use retry::*;
pub use runtime::*;

#[cfg(test)]
mod config_test;

//---
use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the listener process
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct ListenerConfig {
    /// Data directory, module paths, watchdog thresholds
    pub runtime: RuntimeConfig,
    /// Notifier endpoint and keepalive parameters
    pub notifier: NotifierConfig,
    /// Authoritative directory endpoint and credentials
    pub directory: DirectoryConfig,
}

impl Debug for ListenerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ListenerConfig")
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl ListenerConfig {
    /// Creates a new configuration with hierarchical override support.
    ///
    /// Configuration sources are merged in the following order (later sources
    /// override earlier ones):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable
    /// 3. Environment variables with `LISTENER__` prefix (highest priority)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("LISTENER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-component configuration rules.
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;
        self.notifier.validate()?;
        self.directory.validate()?;
        Ok(())
    }
}
