//! Append-only transaction file for downstream tailers.
//!
//! Two files live side by side in the data directory: `transaction`, one
//! `<id> <dn> <command>` line per committed transaction, and
//! `transaction.index`, fixed-width `(id, byte offset)` pairs for random
//! access by id. Both are fsynced before the master cursor advances; on
//! open, both are truncated back to their last mutually consistent point so
//! a torn append from a crash never survives.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::info;
use tracing::warn;

use crate::constants::TRANSACTION_FILE;
use crate::constants::TRANSACTION_INDEX_FILE;
use crate::model::ChangeCommand;
use crate::model::Dn;
use crate::model::Transaction;
use crate::Result;
use crate::TxLogError;


const INDEX_RECORD_LEN: u64 = 16;

pub struct TransactionLog {
    log: File,
    index: File,
    /// In-memory mirror of the index file, ascending by id.
    offsets: Vec<(u64, u64)>,
    log_len: u64,
    path: PathBuf,
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("records", &self.offsets.len())
            .field("path", &self.path)
            .finish()
    }
}

impl TransactionLog {
    /// Opens (creating if absent) and recovers the pair of files.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(TRANSACTION_FILE);
        let index_path = data_dir.join(TRANSACTION_INDEX_FILE);

        let mut log = open_rw(&path)?;
        let mut index = open_rw(&index_path)?;

        let (offsets, log_len) = recover(&mut log, &mut index, &path)?;

        Ok(Self {
            log,
            index,
            offsets,
            log_len,
            path,
        })
    }

    pub fn last_id(&self) -> Option<u64> {
        self.offsets.last().map(|(id, _)| *id)
    }

    /// Appends one committed transaction and makes it durable.
    ///
    /// Re-appending the id at the tail is a no-op (crash replay); anything
    /// else out of order is a gap and halts the pipeline.
    pub fn append(
        &mut self,
        txn: &Transaction,
    ) -> Result<()> {
        if let Some(last) = self.last_id() {
            if txn.id <= last {
                warn!(id = txn.id, last, "transaction already logged, skipping append");
                return Ok(());
            }
            if txn.id != last + 1 {
                return Err(TxLogError::Gap {
                    expected: last + 1,
                    got: txn.id,
                }
                .into());
            }
        }

        let offset = self.log_len;
        let line = format!("{} {} {}\n", txn.id, txn.dn, txn.command.as_char());

        self.log.seek(SeekFrom::End(0)).map_err(TxLogError::Io)?;
        self.log.write_all(line.as_bytes()).map_err(TxLogError::Io)?;
        self.log.sync_data().map_err(TxLogError::Io)?;

        let mut pair = [0u8; INDEX_RECORD_LEN as usize];
        pair[..8].copy_from_slice(&txn.id.to_le_bytes());
        pair[8..].copy_from_slice(&offset.to_le_bytes());
        self.index.seek(SeekFrom::End(0)).map_err(TxLogError::Io)?;
        self.index.write_all(&pair).map_err(TxLogError::Io)?;
        self.index.sync_data().map_err(TxLogError::Io)?;

        self.log_len += line.len() as u64;
        self.offsets.push((txn.id, offset));

        Ok(())
    }

    /// Random access by id through the index.
    pub fn read(
        &mut self,
        id: u64,
    ) -> Result<Option<Transaction>> {
        let slot = match self.offsets.binary_search_by_key(&id, |(id, _)| *id) {
            Ok(slot) => slot,
            Err(_) => return Ok(None),
        };
        let (_, offset) = self.offsets[slot];

        self.log.seek(SeekFrom::Start(offset)).map_err(TxLogError::Io)?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.log.read(&mut byte).map_err(TxLogError::Io)?;
            if n == 0 || byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }

        let line = String::from_utf8(line)
            .map_err(|_| TxLogError::Io(std::io::Error::other("non-UTF-8 transaction record")))?;
        Ok(parse_record(&line))
    }
}

fn open_rw(path: &Path) -> Result<File> {
    crate::utils::file_io::create_parent_dir_if_not_exist(path)?;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| TxLogError::Io(e).into())
}

fn parse_record(line: &str) -> Option<Transaction> {
    let (id, rest) = line.split_once(' ')?;
    let (dn, cmd) = rest.rsplit_once(' ')?;
    let mut chars = cmd.chars();
    let command = ChangeCommand::from_char(chars.next()?)?;
    if chars.next().is_some() {
        return None;
    }
    Some(Transaction {
        id: id.parse().ok()?,
        dn: Dn::new(dn),
        command,
    })
}

/// Truncates both files back to the last point where every index pair
/// references one complete, newline-terminated record.
fn recover(
    log: &mut File,
    index: &mut File,
    path: &Path,
) -> Result<(Vec<(u64, u64)>, u64)> {
    let index_len = index.metadata().map_err(TxLogError::Io)?.len();
    let whole_pairs = index_len / INDEX_RECORD_LEN;
    if index_len % INDEX_RECORD_LEN != 0 {
        warn!(index_len, "truncating torn index tail");
        index
            .set_len(whole_pairs * INDEX_RECORD_LEN)
            .map_err(TxLogError::Io)?;
    }

    let mut raw = Vec::with_capacity((whole_pairs * INDEX_RECORD_LEN) as usize);
    index.seek(SeekFrom::Start(0)).map_err(TxLogError::Io)?;
    index.read_to_end(&mut raw).map_err(TxLogError::Io)?;

    let mut log_bytes = Vec::new();
    log.seek(SeekFrom::Start(0)).map_err(TxLogError::Io)?;
    log.read_to_end(&mut log_bytes).map_err(TxLogError::Io)?;

    let mut offsets = Vec::with_capacity(whole_pairs as usize);
    let mut consistent_len = 0u64;

    for pair in raw.chunks_exact(INDEX_RECORD_LEN as usize) {
        let id = u64::from_le_bytes(pair[..8].try_into().unwrap());
        let offset = u64::from_le_bytes(pair[8..].try_into().unwrap());

        // A usable pair points at a complete line inside the log.
        let end = log_bytes[offset.min(log_bytes.len() as u64) as usize..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|pos| offset + pos as u64 + 1);
        match end {
            Some(end) if offset == consistent_len => {
                offsets.push((id, offset));
                consistent_len = end;
            }
            _ => {
                warn!(id, offset, "index pair without complete record, truncating");
                break;
            }
        }
    }

    let keep_pairs = offsets.len() as u64 * INDEX_RECORD_LEN;
    if keep_pairs != index_len || consistent_len != log_bytes.len() as u64 {
        info!(
            path = %path.display(),
            records = offsets.len(),
            bytes = consistent_len,
            "recovered transaction log"
        );
        index.set_len(keep_pairs).map_err(TxLogError::Io)?;
        index.sync_data().map_err(TxLogError::Io)?;
        log.set_len(consistent_len).map_err(TxLogError::Io)?;
        log.sync_data().map_err(TxLogError::Io)?;
    }

    Ok((offsets, consistent_len))
}
