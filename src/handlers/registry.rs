use libloading::Library;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Handler;
use super::HandlerDescriptor;
use super::PrivilegeGuard;
use crate::cache::HandlerStateStore;
use crate::constants::HANDLER_STATE_READY;
use crate::constants::REPLICATION_HANDLER;
use crate::directory::Filter;
use crate::model::ChangeCommand;
use crate::model::Dn;
use crate::model::Entry;
use crate::HandlerError;
use crate::Result;

/// One registered handler with its parsed filter, persisted state bits and
/// run bookkeeping. The originating shared object (if any) is kept alive
/// alongside the handler it produced.
pub struct LoadedHandler {
    pub(super) descriptor: HandlerDescriptor,
    pub(super) filter: Filter,
    handler: Box<dyn Handler>,
    state: u32,
    prepared: bool,
    _library: Option<Library>,
}

impl LoadedHandler {
    fn ready(&self) -> bool {
        self.state & HANDLER_STATE_READY == HANDLER_STATE_READY
    }

    fn is_replication(&self) -> bool {
        self.descriptor.name == REPLICATION_HANDLER
    }
}

impl std::fmt::Debug for LoadedHandler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoadedHandler")
            .field("name", &self.descriptor.name)
            .field("priority", &self.descriptor.priority)
            .field("state", &self.state)
            .finish()
    }
}

/// The ordered set of handlers the dispatcher drives.
///
/// Handlers are kept sorted by ascending priority (ties break by load
/// order); the `replication` handler additionally runs first in every
/// transaction regardless of its priority.
#[derive(Debug)]
pub struct HandlerSet {
    handlers: Vec<LoadedHandler>,
    state_store: HandlerStateStore,
    privileges: PrivilegeGuard,
    init_only: bool,
}

impl HandlerSet {
    pub fn new(
        state_store: HandlerStateStore,
        privileges: PrivilegeGuard,
        init_only: bool,
    ) -> Self {
        Self {
            handlers: Vec::new(),
            state_store,
            privileges,
            init_only,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.descriptor.name.as_str()).collect()
    }

    /// Registers a handler. `fallback_name` (typically the module file's
    /// base name) fills in an empty manifest name.
    pub fn register(
        &mut self,
        handler: Box<dyn Handler>,
        fallback_name: Option<&str>,
        library: Option<Library>,
    ) -> Result<()> {
        let mut descriptor = handler.descriptor();

        if descriptor.name.is_empty() {
            descriptor.name = fallback_name.unwrap_or_default().to_string();
        }
        let load_error = |reason: &str| HandlerError::Load {
            path: descriptor.name.clone().into(),
            reason: reason.to_string(),
        };
        if descriptor.name.is_empty() {
            return Err(load_error("handler has no name").into());
        }
        if descriptor.description.is_empty() {
            return Err(load_error("description is required").into());
        }
        if self.handlers.iter().any(|h| h.descriptor.name == descriptor.name) {
            return Err(HandlerError::DuplicateName(descriptor.name).into());
        }

        let filter = match &descriptor.filter {
            Some(raw) => Filter::parse(raw)?,
            None => Filter::match_all(),
        };
        descriptor.attributes = descriptor
            .attributes
            .iter()
            .map(|a| a.to_ascii_lowercase())
            .collect();

        let state = self.state_store.load(&descriptor.name);
        info!(
            handler = %descriptor.name,
            priority = descriptor.priority,
            state,
            "handler registered"
        );

        self.handlers.push(LoadedHandler {
            descriptor,
            filter,
            handler,
            state,
            prepared: false,
            _library: library,
        });
        // Stable sort: equal priorities keep their load order.
        self.handlers.sort_by(|a, b| {
            a.descriptor
                .priority
                .partial_cmp(&b.descriptor.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(())
    }

    /// Runs `initialize` for every handler that has never completed it;
    /// success sets the READY bit and persists it eagerly.
    pub async fn initialize_all(&mut self) -> Result<()> {
        let Self {
            handlers,
            state_store,
            privileges,
            ..
        } = self;

        for handler in handlers.iter_mut() {
            if handler.ready() {
                continue;
            }
            let name = handler.descriptor.name.clone();
            let result = handler.handler.initialize().await;
            privileges.drop_after_hook();
            match result {
                Ok(()) => {
                    handler.state |= HANDLER_STATE_READY;
                    state_store.store(&name, handler.state)?;
                    info!(handler = %name, "handler initialized");
                }
                Err(e) => {
                    warn!(handler = %name, %e, "initialize failed, handler stays not ready");
                }
            }
        }
        Ok(())
    }

    /// Runs all handlers for a non-delete transaction, in order, applying
    /// the up-to-date short-circuit and filter gating. Successful handlers
    /// are recorded in `new`'s module-present set; failures are logged and
    /// never abort the transaction.
    pub async fn run_update(
        &mut self,
        dn: &Dn,
        new: &mut Entry,
        old: Option<&Entry>,
        command: ChangeCommand,
        changes: &[String],
    ) {
        debug!(%dn, "running handlers");
        let Self {
            handlers,
            privileges,
            init_only,
            ..
        } = self;

        for replication_pass in [true, false] {
            for handler in handlers.iter_mut() {
                if handler.is_replication() != replication_pass {
                    continue;
                }
                update_one(privileges, *init_only, handler, dn, new, old, command, changes).await;
            }
        }
    }

    /// Runs the delete path: only handlers recorded in the entry's
    /// module-present set, handlers with `handle_every_delete`, and
    /// `replication`. Successful handlers are removed from the set.
    pub async fn run_delete(
        &mut self,
        dn: &Dn,
        old: &mut Entry,
        command: ChangeCommand,
    ) {
        debug!(%dn, "running delete handlers");
        let Self {
            handlers,
            privileges,
            init_only,
            ..
        } = self;

        for replication_pass in [true, false] {
            for handler in handlers.iter_mut() {
                if handler.is_replication() != replication_pass {
                    continue;
                }
                let name = handler.descriptor.name.clone();
                if !old.module_present(&name)
                    && !handler.is_replication()
                    && !handler.descriptor.handle_every_delete
                {
                    debug!(handler = %name, "skipped");
                    continue;
                }

                if exec_handle(privileges, *init_only, handler, dn, None, Some(&*old), command).await
                {
                    info!(handler = %name, "successful");
                    old.module_remove(&name);
                } else {
                    warn!(handler = %name, %dn, "handler failed");
                }
            }
        }
    }

    /// Fires `postrun` on every prepared handler; the next `handle` will
    /// see a fresh `prerun`.
    pub async fn postrun_all(&mut self) {
        let Self {
            handlers,
            privileges,
            ..
        } = self;

        for handler in handlers.iter_mut() {
            debug!(
                handler = %handler.descriptor.name,
                prepared = handler.prepared,
                "postrun handler"
            );
            if !handler.prepared {
                continue;
            }
            let result = handler.handler.postrun().await;
            privileges.drop_after_hook();
            if let Err(e) = result {
                warn!(handler = %handler.descriptor.name, %e, "postrun failed");
            }
            handler.prepared = false;
        }
    }

    /// Shutdown: `clean` hooks plus a final eager state write.
    pub async fn clean_all(&mut self) {
        let Self {
            handlers,
            state_store,
            privileges,
            ..
        } = self;

        for handler in handlers.iter_mut() {
            let name = handler.descriptor.name.clone();
            let result = handler.handler.clean().await;
            privileges.drop_after_hook();
            if let Err(e) = result {
                warn!(handler = %name, %e, "clean failed");
            }
            if let Err(e) = state_store.store(&name, handler.state) {
                warn!(handler = %name, %e, "failed writing handler state");
            }
        }
    }

    /// Broadcasts a configuration key/value pair to every handler.
    pub async fn setdata_all(
        &mut self,
        key: &str,
        value: &str,
    ) {
        let shown = if key == "bindpw" { "<HIDDEN>" } else { value };
        info!(key, value = shown, "setting data for all handlers");

        let Self {
            handlers,
            privileges,
            ..
        } = self;

        for handler in handlers.iter_mut() {
            let result = handler.handler.setdata(key, value).await;
            privileges.drop_after_hook();
            if let Err(e) = result {
                warn!(handler = %handler.descriptor.name, %e, "setdata failed");
            }
        }
    }

    /// Drops every handler (persisting state first) so the module
    /// directories can be scanned again.
    pub fn unload_all(&mut self) {
        for handler in &self.handlers {
            if let Err(e) = self.state_store.store(&handler.descriptor.name, handler.state) {
                warn!(handler = %handler.descriptor.name, %e, "failed writing handler state");
            }
        }
        self.handlers.clear();
    }
}

#[allow(clippy::too_many_arguments)]
async fn update_one(
    privileges: &PrivilegeGuard,
    init_only: bool,
    handler: &mut LoadedHandler,
    dn: &Dn,
    new: &mut Entry,
    old: Option<&Entry>,
    command: ChangeCommand,
    changes: &[String],
) {
    let name = handler.descriptor.name.clone();
    trace!(handler = %name, "considered");

    // The replication handler is checked for the changed object in any
    // case, especially with an incomplete cache.
    if !handler.is_replication() && old.map(|o| o.module_present(&name)).unwrap_or(false) {
        let attrs = &handler.descriptor.attributes;
        let uptodate = changes.is_empty()
            || (!attrs.is_empty() && !attrs.iter().any(|a| changes.iter().any(|c| c == a)));
        if uptodate {
            debug!(handler = %name, "up-to-date");
            new.module_add(&name);
            return;
        }
    }

    if !handler.filter.matches(new) {
        trace!(handler = %name, "filter doesn't match");
        return;
    }

    if exec_handle(privileges, init_only, handler, dn, Some(new), old, command).await {
        info!(handler = %name, "successful");
        new.module_add(&name);
    } else {
        warn!(handler = %name, %dn, "handler failed");
    }
}

/// Invokes `handle` with prerun-on-demand, the not-ready check, and the
/// privilege re-drop. Returns whether the hook reported success.
async fn exec_handle(
    privileges: &PrivilegeGuard,
    init_only: bool,
    handler: &mut LoadedHandler,
    dn: &Dn,
    new: Option<&Entry>,
    old: Option<&Entry>,
    command: ChangeCommand,
) -> bool {
    let name = handler.descriptor.name.clone();

    if !handler.ready() {
        if init_only {
            warn!(handler = %name, "not ready (ignore)");
        } else {
            warn!(handler = %name, "not ready");
            return false;
        }
    }

    if !handler.prepared {
        let result = handler.handler.prerun().await;
        privileges.drop_after_hook();
        if let Err(e) = result {
            warn!(handler = %name, %e, "prerun failed");
        }
        handler.prepared = true;
    }

    let command = effective_command(&handler.descriptor, command, old);
    let result = handler.handler.handle(dn, new, old, command).await;
    privileges.drop_after_hook();
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(handler = %name, %dn, %e, "handle hook failed");
            false
        }
    }
}

/// Handlers that do not understand MODRDN see it as the add/modify it
/// decomposes into for them.
fn effective_command(
    descriptor: &HandlerDescriptor,
    command: ChangeCommand,
    old: Option<&Entry>,
) -> ChangeCommand {
    if command == ChangeCommand::ModRdn && !descriptor.modrdn {
        if old.is_some() {
            ChangeCommand::Modify
        } else {
            ChangeCommand::Add
        }
    } else {
        command
    }
}
