//! Listener Error Hierarchy
//!
//! Defines the error types for the replication pipeline, categorized by the
//! component that raised them and by operational concern. The classifier at
//! the bottom feeds the shared retry adapter: every error is either
//! recoverable in place (reconnect and retry) or terminates the process.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// How the retry adapter should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to heal; reconnect/retry per the active backoff policy.
    Transient,
    /// Malformed or mismatched protocol traffic. The connection is closed
    /// and the request retried once on a fresh one; a second desync
    /// escalates to fatal.
    Protocol,
    /// Propagates to the supervisor and terminates the process.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Notifier protocol client failures
    #[error(transparent)]
    Notifier(#[from] NotifierError),

    /// Authoritative directory client failures
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Local entry cache failures
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Transaction file failures
    #[error(transparent)]
    TxLog(#[from] TxLogError),

    /// Handler runtime failures
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Pipeline-level violations (ordering, quarantine, free space)
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Uncategorized I/O failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// Socket-level failures on the notifier connection
    #[error("notifier connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// The reply could not be parsed or carried an unknown message id
    #[error("notifier protocol desync: {0}")]
    Desync(String),

    /// The bounded wait elapsed without a reply
    #[error("notifier wait timed out after {0:?}")]
    WaitTimeout(Duration),

    /// Requested transaction id is below the notifier's retention window
    #[error("transaction id {0} is below the notifier's retention")]
    BelowRetention(u64),

    /// Reconnect attempts exhausted per policy
    #[error("notifier retry exhausted after {attempts} attempts")]
    RetryExhausted { attempts: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The directory server is unreachable or the connection dropped
    #[error("directory server down: {0}")]
    ServerDown(String),

    /// Bind (authentication) was rejected
    #[error("directory bind failed: {0}")]
    BindFailed(String),

    /// Change-log entry for a transaction id was missing or malformed
    #[error("change log entry for transaction {id} is unusable: {reason}")]
    BadChangeRecord { id: u64, reason: String },

    /// Non-transient LDAP-level failure
    #[error("directory operation failed: {0}")]
    Operation(#[from] ldap3::LdapError),

    /// A handler filter string could not be parsed
    #[error("invalid filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Embedded database errors
    #[error(transparent)]
    Db(#[from] sled::Error),

    /// Serialization failures for cursor/meta blobs
    #[error(transparent)]
    Encoding(#[from] bincode::Error),

    /// A stored record failed the serialization check on read
    #[error("cache record for {dn:?} is corrupt: {reason}")]
    Corrupt { dn: String, reason: String },

    /// Keys must be canonical DNs
    #[error("non-canonical cache key: {0:?}")]
    NonCanonicalKey(String),

    /// Filesystem failures around the cache directory
    #[error("cache path error at {path}")]
    Path {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TxLogError {
    /// Disk I/O failures on the transaction or index file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Ids must be appended in strictly ascending order without gaps
    #[error("transaction log gap: expected id {expected}, got {got}")]
    Gap { expected: u64, got: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Module file could not be loaded
    #[error("failed to load handler module {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// Two modules registered under the same name
    #[error("duplicate handler name {0:?}")]
    DuplicateName(String),

    /// Handler state file could not be written
    #[error("failed to persist state for handler {name}")]
    State {
        name: String,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Notifier announced an id that is not the expected cursor successor
    #[error("notifier returned transaction id {got} ({expected} expected)")]
    Ordering { expected: u64, got: u64 },

    /// The failed-replay sentinel is present
    #[error("quarantine sentinel present: {0}")]
    Quarantined(PathBuf),

    /// A monitored filesystem is below the free-space threshold
    #[error("file system {path} full: {free_mib} MiB < {min_mib} MiB")]
    FreeSpace {
        path: PathBuf,
        free_mib: u64,
        min_mib: u64,
    },

    /// The authoritative schema generation moved backwards
    #[error("schema generation regressed: persisted {persisted}, notifier {reported}")]
    SchemaRegression { persisted: u64, reported: u64 },
}

impl Error {
    /// Classifies the error for the retry adapter. Anything not listed as
    /// transient terminates the process per the propagation policy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            Error::Notifier(e) => e.classify(),
            Error::Directory(e) => e.classify(),
            Error::Io(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }
}

impl NotifierError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            NotifierError::Connection(_) | NotifierError::WaitTimeout(_) => ErrorClass::Transient,
            NotifierError::Desync(_) => ErrorClass::Protocol,
            NotifierError::BelowRetention(_) | NotifierError::RetryExhausted { .. } => ErrorClass::Fatal,
        }
    }
}

impl DirectoryError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            DirectoryError::ServerDown(_) => ErrorClass::Transient,
            DirectoryError::Operation(e) => match e {
                ldap3::LdapError::Io { .. }
                | ldap3::LdapError::EndOfStream { .. }
                | ldap3::LdapError::Timeout { .. } => ErrorClass::Transient,
                _ => ErrorClass::Fatal,
            },
            _ => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod errors_test {
    use super::*;

    #[test]
    fn transient_classification_covers_reconnectable_failures() {
        let e: Error = NotifierError::Connection(std::io::Error::other("boom")).into();
        assert_eq!(e.classify(), ErrorClass::Transient);

        let e: Error = DirectoryError::ServerDown("connection reset".into()).into();
        assert_eq!(e.classify(), ErrorClass::Transient);
    }

    #[test]
    fn desync_is_protocol_class_not_transient() {
        let e: Error = NotifierError::Desync("unframed reply".into()).into();
        assert_eq!(e.classify(), ErrorClass::Protocol);
        assert!(!e.is_transient());
    }

    #[test]
    fn fatal_classification_covers_pipeline_violations() {
        let e: Error = PipelineError::Ordering {
            expected: 501,
            got: 502,
        }
        .into();
        assert_eq!(e.classify(), ErrorClass::Fatal);

        let e: Error = NotifierError::BelowRetention(7).into();
        assert_eq!(e.classify(), ErrorClass::Fatal);

        let e: Error = CacheError::Corrupt {
            dn: "cn=x".into(),
            reason: "bad version byte".into(),
        }
        .into();
        assert_eq!(e.classify(), ErrorClass::Fatal);
    }
}
