//! # dirsync
//!
//! A directory listener: tails an authoritative directory service's change
//! log through a central notifier, materializes a local shadow copy of
//! every entry, and fans each change out to a prioritized set of handler
//! modules.
//!
//! ## Features
//! - **Ordered replication**: one transaction at a time, strict id order,
//!   durable resume cursor
//! - **Crash consistency**: cache fsync and transaction-file append before
//!   every cursor advance
//! - **Pluggable handlers**: priority-ordered modules with filter and
//!   changed-attribute gating, loaded from shared objects or registered
//!   statically
//! - **Self-healing connections**: exponential-backoff reconnect to both
//!   the notifier and the directory
//!
//! ## Quick Start
//! ```no_run
//! use dirsync::config::ListenerConfig;
//! use tokio::sync::watch;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> dirsync::Result<()> {
//!     let config = ListenerConfig::load()?;
//!     let (_graceful_tx, graceful_rx) = watch::channel(());
//!     let (_reload_tx, reload_rx) = watch::channel(());
//!
//!     let mut listener = dirsync::build_listener(config, graceful_rx, reload_rx).await?;
//!     listener.run().await
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod diff;
pub mod directory;
pub mod handlers;
pub mod model;
pub mod notifier;
pub mod txlog;

mod constants;
mod errors;

pub use constants::HANDLER_STATE_READY;
pub use constants::REPLICATION_HANDLER;
pub use errors::*;

#[doc(hidden)]
pub mod utils;

//-----------------------------------------------------------
// Test utils
#[cfg(test)]
#[doc(hidden)]
pub mod test_utils;

//-----------------------------------------------------------
// Production wiring

use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::init_cache_db;
use crate::cache::HandlerStateStore;
use crate::cache::MasterCursor;
use crate::cache::SledEntryCache;
use crate::config::ListenerConfig;
use crate::constants::CACHE_DIR;
use crate::constants::MASTER_STATE_FILE;
use crate::core::Dispatcher;
use crate::core::Listener;
use crate::core::Supervisor;
use crate::directory::LdapDirectory;
use crate::handlers::load_modules;
use crate::handlers::HandlerSet;
use crate::handlers::PrivilegeGuard;
use crate::notifier::NotifierClient;
use crate::txlog::TransactionLog;

/// Production listener type: LDAP directory client over a sled cache.
pub type ProductionListener = Listener<LdapDirectory, SledEntryCache>;

/// Assembles the full pipeline from configuration: cache, cursor, optional
/// transaction file, handler modules, and both protocol clients.
pub async fn build_listener(
    config: ListenerConfig,
    shutdown: watch::Receiver<()>,
    reload: watch::Receiver<()>,
) -> Result<ProductionListener> {
    let cache_dir = config.runtime.cache_dir();

    let db = init_cache_db(&cache_dir)?;
    let cache = SledEntryCache::new(Arc::new(db))?;

    let mut cursor = MasterCursor::load(cache_dir.join(MASTER_STATE_FILE))?;
    cursor.update_modules_hash(&config.runtime.module_dirs)?;

    let txlog = if config.runtime.write_transaction_file {
        Some(TransactionLog::open(&config.runtime.data_dir)?)
    } else {
        None
    };

    let privileges = PrivilegeGuard::new(config.runtime.drop_privileges_to.as_deref());
    let mut handlers = HandlerSet::new(
        HandlerStateStore::new(config.runtime.data_dir.join(CACHE_DIR)),
        privileges,
        config.runtime.init_only,
    );
    load_modules(&mut handlers, &config.runtime.module_dirs);
    handlers.initialize_all().await?;
    handlers
        .setdata_all("basedn", &config.directory.base_dn)
        .await;
    handlers
        .setdata_all("binddn", &config.directory.bind_dn)
        .await;
    handlers
        .setdata_all("bindpw", &config.directory.password)
        .await;

    let directory = LdapDirectory::new(config.directory.clone());
    let notifier = NotifierClient::new(config.notifier.clone());
    let supervisor = Supervisor::new(&config.runtime);

    let dispatcher = Dispatcher::new(directory, cache, handlers, cursor, txlog);
    Ok(Listener::new(
        dispatcher, notifier, supervisor, config, shutdown, reload,
    ))
}
