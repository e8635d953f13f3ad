use std::collections::HashMap;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::format_request;
use super::parse_announcement;
use super::parse_reply;
use super::parse_schema_id;
use super::ProtocolVersion;
use crate::config::NotifierConfig;
use crate::constants::NOTIFIER_CMD_ALIVE;
use crate::constants::NOTIFIER_CMD_GET_ID;
use crate::constants::NOTIFIER_CMD_GET_SCHEMA_ID;
use crate::constants::NOTIFIER_REPLY_OK;
use crate::model::Announcement;
use crate::utils::retry::backoff_delay;
use crate::NotifierError;
use crate::Result;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[derive(Debug, Clone, Copy)]
struct PendingGetId {
    msg_id: u32,
    target: u64,
}

/// Request/reply and streaming client for the notifier.
///
/// Message ids are allocated monotonically per connection and recycled only
/// on reconnect; replies are matched to requests by id, unmatched replies
/// are dropped with a warning. On any I/O error or protocol desync the
/// connection is torn down; [`NotifierClient::reconnect`] reopens it with
/// exponential backoff and reissues the in-flight `GET_ID`.
pub struct NotifierClient {
    config: NotifierConfig,
    conn: Option<Connection>,
    next_msg_id: u32,
    /// Replies that arrived while another request was being awaited.
    stashed: HashMap<u32, String>,
    pending_get_id: Option<PendingGetId>,
    version: Option<ProtocolVersion>,
}

impl NotifierClient {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            conn: None,
            next_msg_id: 1,
            stashed: HashMap::new(),
            pending_get_id: None,
            version: None,
        }
    }

    /// Protocol version detected so far, if any `GET_ID` completed.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Opens the connection if necessary. A fresh connection restarts the
    /// message id sequence and forgets stashed replies from the old one.
    pub async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let address = self.config.address();
        debug!(%address, "connecting to notifier");
        let stream = TcpStream::connect(&address)
            .await
            .map_err(NotifierError::Connection)?;
        let (read_half, write_half) = stream.into_split();

        self.conn = Some(Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
        });
        self.next_msg_id = 1;
        self.stashed.clear();
        info!(%address, "notifier connection established");
        Ok(())
    }

    /// Tears down and reopens the connection with exponential backoff, then
    /// reissues the in-flight `GET_ID` (same target id, fresh message id).
    /// Attempt budget comes from the retry policy; exhaustion is fatal.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect();

        let policy = self.config.retry;
        let mut attempt: u32 = 0;
        loop {
            let result = match self.connect().await {
                Ok(()) => match self.pending_get_id.take() {
                    // Reissue the in-flight request on the fresh connection.
                    Some(pending) => {
                        let reissued = self.send_get_id(pending.target).await;
                        if reissued.is_err() {
                            self.pending_get_id = Some(pending);
                        }
                        reissued
                    }
                    None => Ok(()),
                },
                Err(e) => Err(e),
            };

            let e = match result {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            attempt += 1;
            if policy.max_retries != 0 && attempt as usize > policy.max_retries {
                warn!(%e, attempt, "notifier reconnect budget exhausted");
                return Err(NotifierError::RetryExhausted {
                    attempts: attempt as usize,
                }
                .into());
            }
            let delay = backoff_delay(&policy, attempt);
            warn!(%e, attempt, ?delay, "notifier reconnect failed, backing off");
            tokio::time::sleep(delay).await;
            self.disconnect();
        }
    }

    /// Drops the connection; pending `GET_ID` state survives so it can be
    /// reissued on reconnect.
    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!("notifier connection closed");
        }
        self.stashed.clear();
    }

    /// Asks for the transaction after `target - 1`, i.e. `GET_ID <target>`.
    /// The reply is collected later through [`NotifierClient::wait`].
    pub async fn send_get_id(
        &mut self,
        target: u64,
    ) -> Result<()> {
        let msg_id = self.allocate_msg_id();
        let request = format_request(msg_id, NOTIFIER_CMD_GET_ID, Some(&target.to_string()));
        self.write(request.as_bytes()).await?;
        self.pending_get_id = Some(PendingGetId { msg_id, target });
        debug!(msg_id, target, "GET_ID sent");
        Ok(())
    }

    pub fn has_pending_get_id(&self) -> bool {
        self.pending_get_id.is_some()
    }

    /// Bounded wait for the pending `GET_ID` reply. `Ok(None)` on timeout;
    /// the request stays in flight.
    pub async fn wait(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Announcement>> {
        let pending = self
            .pending_get_id
            .ok_or_else(|| NotifierError::Desync("wait without pending GET_ID".to_string()))?;

        let payload = match self.wait_for(pending.msg_id, timeout).await {
            Ok(payload) => payload,
            Err(e) => {
                if matches!(e, crate::Error::Notifier(NotifierError::WaitTimeout(_))) {
                    return Ok(None);
                }
                return Err(e);
            }
        };

        self.pending_get_id = None;
        let (announcement, version) = match parse_announcement(&payload, pending.target) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Protocol desync closes the connection so a retry starts
                // on a clean one.
                self.disconnect();
                return Err(e);
            }
        };
        if self.version != Some(version) {
            info!(?version, "notifier protocol version detected");
            self.version = Some(version);
        }
        Ok(Some(announcement))
    }

    /// Keepalive probe; sent when the pipeline has been idle.
    pub async fn alive(&mut self) -> Result<bool> {
        let payload = self.transact(NOTIFIER_CMD_ALIVE, None).await?;
        Ok(payload == NOTIFIER_REPLY_OK)
    }

    /// Current authoritative schema generation.
    pub async fn get_schema_id(&mut self) -> Result<u64> {
        let payload = self.transact(NOTIFIER_CMD_GET_SCHEMA_ID, None).await?;
        match parse_schema_id(&payload) {
            Ok(schema_id) => Ok(schema_id),
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    // - internals

    fn allocate_msg_id(&mut self) -> u32 {
        let id = self.next_msg_id;
        self.next_msg_id += 1;
        id
    }

    async fn transact(
        &mut self,
        command: &str,
        arg: Option<&str>,
    ) -> Result<String> {
        let msg_id = self.allocate_msg_id();
        let request = format_request(msg_id, command, arg);
        self.write(request.as_bytes()).await?;

        let timeout = Duration::from_millis(self.config.retry.timeout_ms);
        self.wait_for(msg_id, timeout).await
    }

    async fn write(
        &mut self,
        raw: &[u8],
    ) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| NotifierError::Connection(std::io::Error::other("not connected")))?;
        if let Err(e) = conn.writer.write_all(raw).await {
            self.disconnect();
            return Err(NotifierError::Connection(e).into());
        }
        Ok(())
    }

    /// Reads replies until `msg_id` answers or `timeout` elapses. Replies
    /// for the pending `GET_ID` are stashed instead of dropped; anything
    /// else unmatched is dropped with a warning.
    async fn wait_for(
        &mut self,
        msg_id: u32,
        timeout: Duration,
    ) -> Result<String> {
        if let Some(payload) = self.stashed.remove(&msg_id) {
            return Ok(payload);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or(NotifierError::WaitTimeout(timeout))?;

            let line = self.read_line(remaining, timeout).await?;
            let (reply_id, payload) = match parse_reply(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.disconnect();
                    return Err(e);
                }
            };

            if reply_id == msg_id {
                return Ok(payload.to_string());
            }

            let interesting = self.pending_get_id.map(|p| p.msg_id) == Some(reply_id);
            if interesting {
                self.stashed.insert(reply_id, payload.to_string());
            } else {
                warn!(reply_id, expected = msg_id, "dropping unmatched notifier reply");
            }
        }
    }

    async fn read_line(
        &mut self,
        remaining: Duration,
        timeout: Duration,
    ) -> Result<String> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| NotifierError::Connection(std::io::Error::other("not connected")))?;

        let mut line = String::new();
        match tokio::time::timeout(remaining, conn.reader.read_line(&mut line)).await {
            Err(_) => Err(NotifierError::WaitTimeout(timeout).into()),
            Ok(Err(e)) => {
                self.disconnect();
                Err(NotifierError::Connection(e).into())
            }
            Ok(Ok(0)) => {
                self.disconnect();
                Err(NotifierError::Connection(std::io::Error::other(
                    "notifier closed the connection",
                ))
                .into())
            }
            Ok(Ok(_)) => Ok(line),
        }
    }
}
