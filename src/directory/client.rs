use std::time::Duration;

use async_trait::async_trait;
use ldap3::Ldap;
use ldap3::LdapConnAsync;
use ldap3::LdapConnSettings;
use ldap3::LdapError;
use ldap3::Scope;
use ldap3::SearchEntry;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::config::DirectoryConfig;
use crate::constants::TRANSLOG_BASE;
use crate::model::ChangeCommand;
use crate::model::Dn;
use crate::model::Entry;
use crate::utils::retry::retry_with;
use crate::DirectoryError;
use crate::Result;

const LDAP_RC_NO_SUCH_OBJECT: u32 = 32;

/// The two reads the dispatcher needs from the authoritative directory.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DirectoryService: Send {
    /// Fetches a single entry with all attributes; `None` means the entry
    /// no longer exists (implicit delete).
    async fn read(
        &mut self,
        dn: &Dn,
    ) -> Result<Option<Entry>>;

    /// Fetches the change-log record for transaction `id`.
    async fn read_change(
        &mut self,
        id: u64,
    ) -> Result<(Dn, ChangeCommand)>;

    /// Drops the current connection so the next read binds afresh. Used by
    /// the idle path and by the schema fence.
    fn close(&mut self);
}

/// `ldap3`-backed directory client. The connection is opened lazily and
/// reopened with backoff whenever an operation reports server-down.
pub struct LdapDirectory {
    config: DirectoryConfig,
    ldap: Option<Ldap>,
}

impl LdapDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config, ldap: None }
    }

    async fn open(&mut self) -> Result<()> {
        if self.ldap.is_some() {
            return Ok(());
        }

        debug!(url = %self.config.uri, "connecting to directory");
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.config.operation_timeout_secs));

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.uri)
            .await
            .map_err(map_ldap_error)?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver error");
            }
        });

        if !self.config.bind_dn.is_empty() {
            let result = ldap
                .simple_bind(&self.config.bind_dn, &self.config.password)
                .await
                .map_err(map_ldap_error)?;
            if result.rc != 0 {
                return Err(DirectoryError::BindFailed(format!(
                    "code {}: {}",
                    result.rc, result.text
                ))
                .into());
            }
        }

        info!(url = %self.config.uri, "directory connection established");
        self.ldap = Some(ldap);
        Ok(())
    }

    async fn reopen(&mut self) -> Result<()> {
        self.close();
        self.open().await
    }

    async fn try_read(
        &mut self,
        dn: &Dn,
    ) -> Result<Option<Entry>> {
        self.open().await?;
        let ldap = self.ldap.as_mut().expect("connection just opened");
        let timeout = Duration::from_secs(self.config.operation_timeout_secs);

        let search = ldap
            .with_timeout(timeout)
            .search(dn.as_str(), Scope::Base, "(objectClass=*)", vec!["*", "+"])
            .await
            .map_err(map_ldap_error)?;

        let (entries, _) = match search.success() {
            Ok(done) => done,
            Err(LdapError::LdapResult { result }) if result.rc == LDAP_RC_NO_SUCH_OBJECT => {
                return Ok(None);
            }
            Err(e) => return Err(map_ldap_error(e)),
        };

        let Some(first) = entries.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(to_entry(SearchEntry::construct(first))))
    }

    async fn try_read_change(
        &mut self,
        id: u64,
    ) -> Result<(Dn, ChangeCommand)> {
        self.open().await?;
        let ldap = self.ldap.as_mut().expect("connection just opened");
        let timeout = Duration::from_secs(self.config.operation_timeout_secs);

        let base = format!("reqSession={id},{TRANSLOG_BASE}");
        let search = ldap
            .with_timeout(timeout)
            .search(&base, Scope::Base, "(objectClass=*)", vec!["reqType", "reqDN"])
            .await
            .map_err(map_ldap_error)?;

        let (entries, _) = search.success().map_err(map_ldap_error)?;
        let Some(first) = entries.into_iter().next() else {
            return Err(DirectoryError::BadChangeRecord {
                id,
                reason: "no change log entry".to_string(),
            }
            .into());
        };

        let record = SearchEntry::construct(first);
        let bad = |reason: &str| DirectoryError::BadChangeRecord {
            id,
            reason: reason.to_string(),
        };

        let dn = record
            .attrs
            .get("reqDN")
            .and_then(|vals| vals.first())
            .filter(|dn| !dn.is_empty())
            .ok_or_else(|| bad("missing reqDN"))?;
        let command = record
            .attrs
            .get("reqType")
            .and_then(|vals| vals.first())
            .and_then(|raw| {
                let mut chars = raw.chars();
                chars
                    .next()
                    .and_then(ChangeCommand::from_char)
                    .filter(|_| chars.next().is_none())
            })
            .ok_or_else(|| bad("missing or bad reqType"))?;

        debug!(id, dn = %dn, command = %command.as_char(), "change log record fetched");
        Ok((Dn::new(dn), command))
    }
}

#[async_trait]
impl DirectoryService for LdapDirectory {
    async fn read(
        &mut self,
        dn: &Dn,
    ) -> Result<Option<Entry>> {
        let policy = self.config.retry;
        let dn = dn.clone();
        retry_with(
            "directory.read",
            &policy,
            self,
            move |s| {
                let dn = dn.clone();
                Box::pin(async move { s.try_read(&dn).await })
            },
            |s| Box::pin(s.reopen()),
        )
        .await
    }

    async fn read_change(
        &mut self,
        id: u64,
    ) -> Result<(Dn, ChangeCommand)> {
        let policy = self.config.retry;
        retry_with(
            "directory.read_change",
            &policy,
            self,
            move |s| Box::pin(s.try_read_change(id)),
            |s| Box::pin(s.reopen()),
        )
        .await
    }

    fn close(&mut self) {
        if self.ldap.take().is_some() {
            debug!("directory connection closed");
        }
    }
}

fn map_ldap_error(e: LdapError) -> crate::Error {
    match e {
        // Connection-level failures reconnect; everything else is surfaced.
        LdapError::Io { .. } | LdapError::EndOfStream { .. } | LdapError::Timeout { .. } => {
            DirectoryError::ServerDown(e.to_string()).into()
        }
        other => DirectoryError::Operation(other).into(),
    }
}

/// Converts an `ldap3` search entry into the canonical in-process
/// representation. Text and binary attribute maps are merged; values become
/// opaque octet strings either way.
fn to_entry(raw: SearchEntry) -> Entry {
    let mut entry = Entry::new();
    for (name, values) in raw.attrs {
        for value in values {
            entry.add_value(&name, value.into_bytes());
        }
    }
    for (name, values) in raw.bin_attrs {
        for value in values {
            entry.add_value(&name, value);
        }
    }
    entry
}
