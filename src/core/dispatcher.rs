use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::set_meta_u64;
use crate::cache::EntryCache;
use crate::cache::MasterCursor;
use crate::constants::META_KEY_NOTIFIER_ID;
use crate::constants::META_KEY_SCHEMA_ID;
use crate::diff::changed_attributes;
use crate::directory::DirectoryService;
use crate::handlers::HandlerSet;
use crate::model::Announcement;
use crate::model::ChangeCommand;
use crate::model::Entry;
use crate::model::Transaction;
use crate::txlog::TransactionLog;
use crate::PipelineError;
use crate::Result;

/// Drives one transaction at a time end-to-end:
///
/// ```text
/// got_id -> FETCH_META -> FETCH_ENTRY -> LOAD_OLD -> DIFF ->
/// RUN_REPLICATION -> RUN_OTHERS -> COMMIT_CACHE -> APPEND_TXLOG ->
/// ADVANCE_CURSOR
/// ```
///
/// Every transition is synchronous on the previous step's result; there is
/// no parallelism inside the pipeline. Any non-retryable error leaves the
/// cursor unchanged and halts the pipeline.
pub struct Dispatcher<D, C> {
    directory: D,
    cache: C,
    handlers: HandlerSet,
    cursor: MasterCursor,
    txlog: Option<TransactionLog>,
}

impl<D, C> Dispatcher<D, C>
where
    D: DirectoryService,
    C: EntryCache,
{
    pub fn new(
        directory: D,
        cache: C,
        handlers: HandlerSet,
        cursor: MasterCursor,
        txlog: Option<TransactionLog>,
    ) -> Self {
        Self {
            directory,
            cache,
            handlers,
            cursor,
            txlog,
        }
    }

    pub fn cursor(&self) -> &MasterCursor {
        &self.cursor
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerSet {
        &mut self.handlers
    }

    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    /// The single entry point: applies the announced transaction and
    /// advances the cursor. Handler failures are contained; everything else
    /// propagates.
    pub async fn process(
        &mut self,
        announcement: Announcement,
    ) -> Result<()> {
        let committed = self.cursor.notifier_id();
        let expected = committed + 1;

        // Already processed: the cursor does not move, the caller yields.
        if announcement.id <= committed {
            warn!(
                id = announcement.id,
                committed, "announced transaction already processed"
            );
            return Ok(());
        }

        // A legacy payload names a specific transaction; anything but the
        // cursor successor is an ordering violation. A modern bare id only
        // says "something at or after this id exists", so the gap check
        // happens against the change log read below.
        if announcement.id != expected && announcement.detail.is_some() {
            return Err(PipelineError::Ordering {
                expected,
                got: announcement.id,
            }
            .into());
        }

        // FETCH_META
        let (dn, command) = match announcement.detail {
            Some(detail) => detail,
            None => self.directory.read_change(expected).await?,
        };
        let txn = Transaction {
            id: expected,
            dn,
            command,
        };
        info!(
            id = txn.id,
            dn = %txn.dn,
            command = %txn.command.as_char(),
            "processing transaction"
        );

        match txn.command {
            ChangeCommand::Delete => self.apply_delete(txn).await,
            _ => {
                // FETCH_ENTRY
                match self.directory.read(&txn.dn).await? {
                    Some(new) => self.apply_update(txn, new).await,
                    None => {
                        // Deleted between announcement and fetch: the
                        // transaction becomes a delete.
                        info!(dn = %txn.dn, "entry vanished, treating as delete");
                        self.apply_delete(txn).await
                    }
                }
            }
        }
    }

    /// Reacts to the schema generation the notifier reported: a newer
    /// generation drops the directory binding (the next read binds afresh
    /// against the new schema) and fences before the next transaction.
    pub fn schema_fence(
        &mut self,
        reported: u64,
    ) -> Result<()> {
        let persisted = self.cursor.schema_id();
        match reported.cmp(&persisted) {
            std::cmp::Ordering::Equal => Ok(()),
            std::cmp::Ordering::Greater => {
                info!(persisted, reported, "schema generation advanced, reinitializing");
                self.directory.close();
                self.cursor.set_schema_id(reported)?;
                set_meta_u64(&self.cache, META_KEY_SCHEMA_ID, reported)?;
                Ok(())
            }
            std::cmp::Ordering::Less => Err(PipelineError::SchemaRegression {
                persisted,
                reported,
            }
            .into()),
        }
    }

    async fn apply_update(
        &mut self,
        txn: Transaction,
        mut new: Entry,
    ) -> Result<()> {
        // LOAD_OLD
        let old = self.cache.get(&txn.dn)?;

        // DIFF
        let changes = changed_attributes(old.as_ref(), Some(&new));
        debug!(dn = %txn.dn, ?changes, "changed attributes");

        // RUN_REPLICATION + RUN_OTHERS
        self.handlers
            .run_update(&txn.dn, &mut new, old.as_ref(), txn.command, &changes)
            .await;

        // COMMIT_CACHE
        self.cache.put(&txn.dn, &new)?;
        self.commit(&txn)
    }

    async fn apply_delete(
        &mut self,
        txn: Transaction,
    ) -> Result<()> {
        let mut old = self.cache.get(&txn.dn)?.unwrap_or_default();

        self.handlers
            .run_delete(&txn.dn, &mut old, ChangeCommand::Delete)
            .await;

        self.cache.delete(&txn.dn)?;
        let txn = Transaction {
            command: ChangeCommand::Delete,
            ..txn
        };
        self.commit(&txn)
    }

    /// Durability tail of the state machine: cache fsync, then the
    /// transaction file, then the cursor. The cursor never runs ahead of
    /// either.
    fn commit(
        &mut self,
        txn: &Transaction,
    ) -> Result<()> {
        set_meta_u64(&self.cache, META_KEY_NOTIFIER_ID, txn.id)?;
        self.cache.flush()?;

        if let Some(txlog) = &mut self.txlog {
            txlog.append(txn)?;
        }

        self.cursor.advance(txn.id)?;
        debug!(id = txn.id, "cursor advanced");
        Ok(())
    }
}
