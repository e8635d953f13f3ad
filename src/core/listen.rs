use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Dispatcher;
use super::Supervisor;
use crate::cache::EntryCache;
use crate::config::ListenerConfig;
use crate::directory::DirectoryService;
use crate::handlers::load_modules;
use crate::model::Announcement;
use crate::notifier::NotifierClient;
use crate::Error;
use crate::ErrorClass;
use crate::Result;

/// The long-running event loop: asks the notifier for the next transaction,
/// lets the dispatcher apply it, and handles the idle housekeeping
/// (directory close + postrun, keepalive, reconnects, schema fencing).
pub struct Listener<D, C> {
    dispatcher: Dispatcher<D, C>,
    notifier: NotifierClient,
    supervisor: Supervisor,
    config: ListenerConfig,
    shutdown: watch::Receiver<()>,
    reload: watch::Receiver<()>,
    /// A protocol desync gets one clean retry; set until healthy traffic
    /// is seen again.
    protocol_retried: bool,
}

enum Waited {
    Announcement(Announcement),
    Shutdown,
}

impl<D, C> Listener<D, C>
where
    D: DirectoryService,
    C: EntryCache,
{
    pub fn new(
        dispatcher: Dispatcher<D, C>,
        notifier: NotifierClient,
        supervisor: Supervisor,
        config: ListenerConfig,
        shutdown: watch::Receiver<()>,
        reload: watch::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher,
            notifier,
            supervisor,
            config,
            shutdown,
            reload,
            protocol_retried: false,
        }
    }

    /// Whether the loop may recover from `e` in place. Transient failures
    /// reconnect per policy; a protocol desync is granted exactly one
    /// reconnect before it escalates; everything else is fatal.
    fn recoverable(
        &mut self,
        e: &Error,
    ) -> bool {
        match e.classify() {
            ErrorClass::Transient => true,
            ErrorClass::Protocol => !std::mem::replace(&mut self.protocol_retried, true),
            ErrorClass::Fatal => false,
        }
    }

    /// Runs until shutdown is signalled or a fatal error surfaces. A signal
    /// received mid-transaction drains that transaction to completion
    /// first.
    pub async fn run(&mut self) -> Result<()> {
        if let Err(e) = self.connect_and_fence().await {
            if !self.recoverable(&e) {
                return Err(e);
            }
            warn!(%e, "initial notifier handshake failed, retrying");
            self.connect_and_fence().await?;
        }

        loop {
            if self.shutdown_requested() {
                info!("shutdown requested, draining");
                break;
            }
            self.supervisor.check()?;
            self.handle_reload_request().await?;

            let committed = self.dispatcher.cursor().notifier_id();
            debug!(committed, "last notifier id");

            if !self.notifier.has_pending_get_id() {
                if let Err(e) = self.notifier.send_get_id(committed + 1).await {
                    if !self.recoverable(&e) {
                        return Err(e);
                    }
                    warn!(%e, "GET_ID send failed, reconnecting");
                    self.reconnect_and_fence().await?;
                    continue;
                }
            }

            let announcement = match self.await_announcement().await? {
                Waited::Announcement(announcement) => announcement,
                Waited::Shutdown => {
                    info!("shutdown requested while idle");
                    break;
                }
            };

            self.dispatcher.process(announcement).await?;
        }

        self.dispatcher.handlers_mut().clean_all().await;
        info!("listener stopped cleanly");
        Ok(())
    }

    fn shutdown_requested(&mut self) -> bool {
        self.shutdown.has_changed().unwrap_or(true)
    }

    /// First idle phase closes the directory connection and fires postrun
    /// once; later phases probe the notifier with ALIVE. A failed probe or
    /// a broken connection goes through backoff reconnect, which reissues
    /// the pending `GET_ID` for the same target.
    async fn await_announcement(&mut self) -> Result<Waited> {
        let postrun_idle = Duration::from_secs(self.config.runtime.postrun_idle_secs);
        let alive_idle = Duration::from_secs(self.config.notifier.alive_idle_secs);
        let mut postrun_done = false;

        loop {
            // A desync may have dropped the in-flight request; reissue
            // before waiting so there is always exactly one pending GET_ID.
            if !self.notifier.has_pending_get_id() {
                let committed = self.dispatcher.cursor().notifier_id();
                if let Err(e) = self.notifier.send_get_id(committed + 1).await {
                    if !self.recoverable(&e) {
                        return Err(e);
                    }
                    warn!(%e, "GET_ID reissue failed, reconnecting");
                    self.reconnect_and_fence().await?;
                    continue;
                }
            }

            let timeout = if postrun_done { alive_idle } else { postrun_idle };

            let waited = {
                let Self {
                    notifier, shutdown, ..
                } = self;
                tokio::select! {
                    biased;
                    // Shutdown takes priority over a simultaneously ready
                    // reply or socket error.
                    _ = shutdown.changed() => return Ok(Waited::Shutdown),
                    result = notifier.wait(timeout) => result,
                }
            };

            match waited {
                Ok(Some(announcement)) => {
                    self.protocol_retried = false;
                    return Ok(Waited::Announcement(announcement));
                }
                Ok(None) => {
                    if !postrun_done {
                        // Idle housekeeping: drop the directory binding and
                        // give handlers their postrun.
                        debug!("idle, closing directory connection and running postrun");
                        self.dispatcher.directory_mut().close();
                        self.dispatcher.handlers_mut().postrun_all().await;
                        postrun_done = true;
                    } else {
                        match self.notifier.alive().await {
                            Ok(true) => {
                                debug!("notifier alive");
                                self.protocol_retried = false;
                            }
                            Ok(false) => {
                                error!("failed to get alive answer");
                                self.reconnect_and_fence().await?;
                            }
                            Err(e) => {
                                if !self.recoverable(&e) {
                                    return Err(e);
                                }
                                warn!(%e, "alive probe failed");
                                self.reconnect_and_fence().await?;
                            }
                        }
                    }
                }
                Err(e) => {
                    if !self.recoverable(&e) {
                        return Err(e);
                    }
                    warn!(%e, "notifier wait failed, reconnecting");
                    self.reconnect_and_fence().await?;
                }
            }
        }
    }

    async fn connect_and_fence(&mut self) -> Result<()> {
        self.notifier.reconnect().await?;
        let schema_id = self.notifier.get_schema_id().await?;
        self.dispatcher.schema_fence(schema_id)?;
        Ok(())
    }

    /// Backoff reconnect plus the schema fence that must run before the
    /// next transaction is processed.
    async fn reconnect_and_fence(&mut self) -> Result<()> {
        self.notifier.reconnect().await?;
        match self.notifier.get_schema_id().await {
            Ok(schema_id) => self.dispatcher.schema_fence(schema_id)?,
            Err(e) => {
                if !self.recoverable(&e) {
                    return Err(e);
                }
                // The next wait cycle will reconnect again.
                warn!(%e, "schema id probe failed after reconnect");
            }
        }
        Ok(())
    }

    async fn handle_reload_request(&mut self) -> Result<()> {
        let requested = self.reload.has_changed().unwrap_or(false);
        if !requested {
            return Ok(());
        }
        self.reload.borrow_and_update();

        info!("reloading handler modules");
        let module_dirs = self.config.runtime.module_dirs.clone();
        let handlers = self.dispatcher.handlers_mut();
        handlers.unload_all();
        load_modules(handlers, &module_dirs);
        handlers.initialize_all().await?;
        Ok(())
    }
}
