use async_trait::async_trait;

use crate::model::ChangeCommand;
use crate::model::Dn;
use crate::model::Entry;

/// What a hook reports back; the runtime turns failures into log lines and
/// module-present bookkeeping, never into pipeline aborts.
pub type HookResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Manifest of a handler module: everything the runtime needs to order,
/// gate, and account for it.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    /// Stable name; doubles as the module-present key and the state file
    /// name. Empty means "use the module file's base name".
    pub name: String,
    pub description: String,
    /// Lower runs earlier; ties break by load order.
    pub priority: f64,
    /// LDAP filter gating which entries the handler sees; `None` matches
    /// everything.
    pub filter: Option<String>,
    /// Attribute names whose changes are relevant; empty means any change
    /// is relevant.
    pub attributes: Vec<String>,
    /// Whether the handler distinguishes the MODRDN command.
    pub modrdn: bool,
    /// Run on every delete, even when the handler never processed the
    /// entry.
    pub handle_every_delete: bool,
}

impl HandlerDescriptor {
    pub fn new(
        name: &str,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            priority: 0.0,
            filter: None,
            attributes: Vec::new(),
            modrdn: false,
            handle_every_delete: false,
        }
    }

    pub fn with_priority(
        mut self,
        priority: f64,
    ) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filter(
        mut self,
        filter: &str,
    ) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    pub fn with_attributes(
        mut self,
        attributes: &[&str],
    ) -> Self {
        self.attributes = attributes.iter().map(|a| a.to_ascii_lowercase()).collect();
        self
    }

    pub fn with_modrdn(mut self) -> Self {
        self.modrdn = true;
        self
    }

    pub fn with_handle_every_delete(mut self) -> Self {
        self.handle_every_delete = true;
        self
    }
}

/// A handler module. `handle` is the only required hook; the lifecycle
/// hooks default to no-ops.
///
/// Modules are loaded from shared objects exporting
/// `handler_create() -> Box<dyn Handler>`, or registered statically by
/// embedders.
#[async_trait]
pub trait Handler: Send {
    fn descriptor(&self) -> HandlerDescriptor;

    /// Projects one change onto local side-effects. `new` is `None` for
    /// deletes, `old` is `None` when the entry was unknown to the cache.
    async fn handle(
        &mut self,
        dn: &Dn,
        new: Option<&Entry>,
        old: Option<&Entry>,
        command: ChangeCommand,
    ) -> HookResult;

    /// Called at most once per process lifetime, after load.
    async fn initialize(&mut self) -> HookResult {
        Ok(())
    }

    /// Called lazily before the first `handle` of a run.
    async fn prerun(&mut self) -> HookResult {
        Ok(())
    }

    /// Called when the pipeline has been idle for the configured interval.
    async fn postrun(&mut self) -> HookResult {
        Ok(())
    }

    /// Called at process shutdown.
    async fn clean(&mut self) -> HookResult {
        Ok(())
    }

    /// Broadcast configuration from the listener.
    async fn setdata(
        &mut self,
        key: &str,
        value: &str,
    ) -> HookResult {
        let _ = (key, value);
        Ok(())
    }
}
