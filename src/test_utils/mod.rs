//! Shared fixtures: recording handlers and cache/dispatcher scaffolding.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::handlers::Handler;
use crate::handlers::HandlerDescriptor;
use crate::handlers::HookResult;
use crate::model::ChangeCommand;
use crate::model::Dn;
use crate::model::Entry;

/// Chronological hook log shared by every recording handler in a test, so
/// cross-handler ordering is observable.
pub type HookLog = Arc<Mutex<Vec<String>>>;

pub fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_lines(log: &HookLog) -> Vec<String> {
    log.lock().expect("hook log poisoned").clone()
}

/// Test double implementing the full hook set; every invocation appends
/// `<hook>:<handler>[:detail]` to the shared log. `fail_handle` makes the
/// next `handle` calls report failure.
pub struct RecordingHandler {
    descriptor: HandlerDescriptor,
    log: HookLog,
    pub fail_handle: Arc<AtomicBool>,
}

impl RecordingHandler {
    pub fn new(
        descriptor: HandlerDescriptor,
        log: HookLog,
    ) -> Self {
        Self {
            descriptor,
            log,
            fail_handle: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn boxed(
        descriptor: HandlerDescriptor,
        log: HookLog,
    ) -> Box<dyn Handler> {
        Box::new(Self::new(descriptor, log))
    }

    fn record(
        &self,
        line: String,
    ) {
        self.log.lock().expect("hook log poisoned").push(line);
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn descriptor(&self) -> HandlerDescriptor {
        self.descriptor.clone()
    }

    async fn handle(
        &mut self,
        dn: &Dn,
        _new: Option<&Entry>,
        _old: Option<&Entry>,
        command: ChangeCommand,
    ) -> HookResult {
        self.record(format!(
            "handle:{}:{}:{}",
            self.descriptor.name,
            dn,
            command.as_char()
        ));
        if self.fail_handle.load(Ordering::SeqCst) {
            return Err("simulated handler failure".into());
        }
        Ok(())
    }

    async fn initialize(&mut self) -> HookResult {
        self.record(format!("initialize:{}", self.descriptor.name));
        Ok(())
    }

    async fn prerun(&mut self) -> HookResult {
        self.record(format!("prerun:{}", self.descriptor.name));
        Ok(())
    }

    async fn postrun(&mut self) -> HookResult {
        self.record(format!("postrun:{}", self.descriptor.name));
        Ok(())
    }

    async fn clean(&mut self) -> HookResult {
        self.record(format!("clean:{}", self.descriptor.name));
        Ok(())
    }

    async fn setdata(
        &mut self,
        key: &str,
        value: &str,
    ) -> HookResult {
        self.record(format!("setdata:{}:{key}={value}", self.descriptor.name));
        Ok(())
    }
}
