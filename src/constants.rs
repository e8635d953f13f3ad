// -
// Database namespaces

/// Sled database tree namespaces
pub(crate) const ENTRY_TREE: &str = "_entries";
pub(crate) const META_TREE: &str = "_meta";

/// Cache metadata keys mirrored for external readers
pub(crate) const META_KEY_NOTIFIER_ID: &str = "notifier_id";
pub(crate) const META_KEY_SCHEMA_ID: &str = "schema_id";

// -
// On-disk layout inside the data directory

pub(crate) const CACHE_DIR: &str = "cache";
pub(crate) const MASTER_STATE_FILE: &str = "master.state";
pub(crate) const HANDLER_STATE_DIR: &str = "handlers";
pub(crate) const TRANSACTION_FILE: &str = "transaction";
pub(crate) const TRANSACTION_INDEX_FILE: &str = "transaction.index";
pub(crate) const QUARANTINE_SENTINEL: &str = "failed.ldif";

// -
// Handler runtime

/// The handler that replicates the raw entry; runs first and on every delete.
pub const REPLICATION_HANDLER: &str = "replication";

/// File suffix recognized by the module loader.
pub(crate) const HANDLER_MODULE_SUFFIX: &str = ".so";

/// Symbol every handler module must export.
pub(crate) const HANDLER_CREATE_SYMBOL: &[u8] = b"handler_create";

/// Bit in the persisted handler state: the handler finished initialization.
pub const HANDLER_STATE_READY: u32 = 0x1;

// -
// Entry cache record codec

/// Leading byte of every serialized entry record.
pub(crate) const ENTRY_RECORD_VERSION: u8 = 1;

// -
// Notifier wire protocol

pub(crate) const NOTIFIER_CMD_GET_ID: &str = "GET_ID";
pub(crate) const NOTIFIER_CMD_ALIVE: &str = "ALIVE";
pub(crate) const NOTIFIER_CMD_GET_SCHEMA_ID: &str = "GET_SCHEMA_ID";
pub(crate) const NOTIFIER_REPLY_OK: &str = "OK";

/// Base of the directory change-log subtree queried for transaction details.
pub(crate) const TRANSLOG_BASE: &str = "cn=translog";
