use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::trace;

use super::decode_entry;
use super::encode_entry;
use super::EntryCache;
use crate::constants::ENTRY_TREE;
use crate::constants::META_TREE;
use crate::model::CachedEntry;
use crate::model::Dn;
use crate::model::Entry;
use crate::CacheError;
use crate::Result;

/// Sled-backed entry cache: tree `_entries` maps canonical DN bytes to
/// versioned records, tree `_meta` mirrors the cursor counters for external
/// readers.
#[derive(Clone)]
pub struct SledEntryCache {
    #[allow(dead_code)]
    db: Arc<sled::Db>,
    entries: sled::Tree,
    meta: sled::Tree,
}

impl std::fmt::Debug for SledEntryCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledEntryCache")
            .field("entries_len", &self.entries.len())
            .finish()
    }
}

impl SledEntryCache {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        let entries = db.open_tree(ENTRY_TREE).map_err(CacheError::Db)?;
        let meta = db.open_tree(META_TREE).map_err(CacheError::Db)?;
        Ok(Self { db, entries, meta })
    }

    /// Snapshot scan of every cached entry, for resynchronization tooling.
    /// Non-canonical keys are treated as corruption.
    pub fn scan(&self) -> Result<Vec<CachedEntry>> {
        let mut out = Vec::new();
        for item in self.entries.iter() {
            let (key, value) = item.map_err(CacheError::Db)?;
            let raw_dn = std::str::from_utf8(&key).map_err(|_| CacheError::Corrupt {
                dn: String::from_utf8_lossy(&key).into_owned(),
                reason: "cache key is not UTF-8".to_string(),
            })?;
            let dn = Dn::from_canonical(raw_dn)
                .ok_or_else(|| CacheError::NonCanonicalKey(raw_dn.to_string()))?;
            let entry = decode_entry(raw_dn, &value)?;
            out.push(CachedEntry { dn, entry });
        }
        Ok(out)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Drop for SledEntryCache {
    fn drop(&mut self) {
        match self.flush() {
            Ok(_) => debug!("entry cache flushed"),
            Err(e) => error!(?e, "failed to flush entry cache"),
        }
    }
}

impl EntryCache for SledEntryCache {
    fn get(
        &self,
        dn: &Dn,
    ) -> Result<Option<Entry>> {
        match self.entries.get(dn.as_bytes()).map_err(CacheError::Db)? {
            Some(ivec) => Ok(Some(decode_entry(dn.as_str(), &ivec)?)),
            None => Ok(None),
        }
    }

    fn put(
        &self,
        dn: &Dn,
        entry: &Entry,
    ) -> Result<()> {
        trace!(%dn, modules = entry.module_count(), "cache put");
        self.entries
            .insert(dn.as_bytes(), encode_entry(entry))
            .map_err(CacheError::Db)?;
        Ok(())
    }

    fn delete(
        &self,
        dn: &Dn,
    ) -> Result<()> {
        trace!(%dn, "cache delete");
        self.entries.remove(dn.as_bytes()).map_err(CacheError::Db)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.entries.flush().map_err(CacheError::Db)?;
        self.meta.flush().map_err(CacheError::Db)?;
        Ok(())
    }

    fn get_meta(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        match self.meta.get(key.as_bytes()).map_err(CacheError::Db)? {
            Some(ivec) => Ok(Some(ivec.to_vec())),
            None => Ok(None),
        }
    }

    fn set_meta(
        &self,
        key: &str,
        value: &[u8],
    ) -> Result<()> {
        self.meta
            .insert(key.as_bytes(), value)
            .map_err(CacheError::Db)?;
        Ok(())
    }
}
