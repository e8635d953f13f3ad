//! The local entry cache: a durable shadow of every replicated directory
//! entry plus the per-handler bookkeeping and the master cursor.

mod codec;
mod handler_state;
mod master;
mod sled_cache;

pub use codec::*;
pub use handler_state::*;
pub use master::*;
pub use sled_cache::*;

#[cfg(test)]
mod sled_cache_test;

use std::path::Path;

use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::model::Dn;
use crate::model::Entry;
use crate::Result;

/// Durable DN-keyed store of entries and their module-present sets.
///
/// Single writer; readers outside the process see atomic snapshots. `flush`
/// is the durability barrier the dispatcher takes before advancing the
/// master cursor.
#[cfg_attr(test, automock)]
pub trait EntryCache: Send {
    fn get(
        &self,
        dn: &Dn,
    ) -> Result<Option<Entry>>;

    fn put(
        &self,
        dn: &Dn,
        entry: &Entry,
    ) -> Result<()>;

    fn delete(
        &self,
        dn: &Dn,
    ) -> Result<()>;

    /// Synchronously flushes all dirty IO buffers and calls fsync. If this
    /// succeeds, every previous write survives a crash.
    fn flush(&self) -> Result<()>;

    /// Typed metadata mirrored for external readers (`notifier_id`,
    /// `schema_id`, free-form keys).
    fn get_meta(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    fn set_meta(
        &self,
        key: &str,
        value: &[u8],
    ) -> Result<()>;
}

/// Helper over [`EntryCache::set_meta`] for the two u64 counters.
pub fn set_meta_u64<C: EntryCache + ?Sized>(
    cache: &C,
    key: &str,
    value: u64,
) -> Result<()> {
    cache.set_meta(key, &value.to_le_bytes())
}

pub fn get_meta_u64<C: EntryCache + ?Sized>(
    cache: &C,
    key: &str,
) -> Result<Option<u64>> {
    match cache.get_meta(key)? {
        Some(bytes) => match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(raw) => Ok(Some(u64::from_le_bytes(raw))),
            Err(_) => {
                warn!(key, len = bytes.len(), "meta counter has unexpected width");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Opens the cache database under `cache_dir`. Entries compress well
/// (attribute names repeat across the whole tree), so compression stays on.
pub fn init_cache_db(cache_dir: impl AsRef<Path>) -> std::result::Result<sled::Db, std::io::Error> {
    let db_path = cache_dir.as_ref().join("entries.db");

    sled::Config::default()
        .path(&db_path)
        .cache_capacity(64 << 20)
        .use_compression(true)
        .open()
        .map_err(|e| {
            warn!(path = %db_path.display(), %e, "entry cache database would not open");
            std::io::Error::other(e)
        })
}
