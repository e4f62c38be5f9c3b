#![forbid(unsafe_code)]

//! Shared fixtures for Tether's integration tests and benches.
//!
//! - [`init_test_logging`] installs a test-writer `tracing` subscriber once.
//! - [`CallLog`] records lifecycle calls in order.
//! - [`RecordingConsumer`] is a [`Bindable`] built from a closure that logs
//!   every attach and destroy.
//! - [`TrackedContext`] is a [`Teardown`] node that logs its destruction.
//! - [`strategies`] holds `proptest` strategies for flows and values.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Once;

use tether_binder::{Bindable, Binder, Context, Teardown};
use tether_core::{BindError, SharedBinding};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

/// Environment variable holding the test log filter.
pub const LOG_ENV: &str = "TETHER_LOG";

static LOGGING: Once = Once::new();

/// Route `tracing` output to the test writer, filtered by `TETHER_LOG`
/// (default `warn`). Safe to call from every test.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        let layer = tracing_fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_level(true);
        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    });
}

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Ordered record of lifecycle calls. Clones share the same log.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// Number of entries equal to `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.borrow().iter().filter(|e| *e == entry).count()
    }

    /// Index of the first entry equal to `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.borrow().iter().position(|e| e == entry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl fmt::Debug for CallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.borrow().iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// RecordingConsumer
// ---------------------------------------------------------------------------

type AttachFn<C> = Box<dyn Fn(&C, &Binder<C>) -> Result<Vec<SharedBinding>, BindError>>;

/// A consumer that delegates attach to a closure and logs
/// `"<name>: attach"` / `"<name>: destroy"`.
pub struct RecordingConsumer<C: Context> {
    name: String,
    log: CallLog,
    attach: AttachFn<C>,
    attached: Cell<u32>,
    destroyed: Cell<u32>,
}

impl<C: Context> RecordingConsumer<C> {
    pub fn new(
        name: impl Into<String>,
        log: &CallLog,
        attach: impl Fn(&C, &Binder<C>) -> Result<Vec<SharedBinding>, BindError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            log: log.clone(),
            attach: Box::new(attach),
            attached: Cell::new(0),
            destroyed: Cell::new(0),
        })
    }

    /// A consumer that declares no bindings.
    pub fn passive(name: impl Into<String>, log: &CallLog) -> Rc<Self> {
        Self::new(name, log, |_, _| Ok(Vec::new()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn attach_count(&self) -> u32 {
        self.attached.get()
    }

    #[must_use]
    pub fn destroy_count(&self) -> u32 {
        self.destroyed.get()
    }
}

impl<C: Context> Bindable<C> for RecordingConsumer<C> {
    fn on_context_attach(
        &self,
        context: &C,
        binder: &Binder<C>,
    ) -> Result<Vec<SharedBinding>, BindError> {
        self.attached.set(self.attached.get() + 1);
        self.log.record(format!("{}: attach", self.name));
        (self.attach)(context, binder)
    }

    fn on_context_destroy(&self) {
        self.destroyed.set(self.destroyed.get() + 1);
        self.log.record(format!("{}: destroy", self.name));
    }
}

impl<C: Context> fmt::Debug for RecordingConsumer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingConsumer")
            .field("name", &self.name)
            .field("attached", &self.attached.get())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TrackedContext
// ---------------------------------------------------------------------------

/// A context node that logs `"<name>: teardown"` when destroyed.
pub struct TrackedContext {
    name: String,
    log: CallLog,
    children: RefCell<Vec<Rc<dyn Teardown>>>,
    destroyed: Cell<u32>,
}

impl TrackedContext {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            log: log.clone(),
            children: RefCell::new(Vec::new()),
            destroyed: Cell::new(0),
        })
    }

    pub fn add_child(&self, child: Rc<dyn Teardown>) {
        self.children.borrow_mut().push(child);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn destroy_count(&self) -> u32 {
        self.destroyed.get()
    }
}

impl Teardown for TrackedContext {
    fn children(&self) -> Vec<Rc<dyn Teardown>> {
        self.children.borrow().clone()
    }

    fn destroy(&self) {
        self.destroyed.set(self.destroyed.get() + 1);
        self.log.record(format!("{}: teardown", self.name));
    }
}

impl fmt::Debug for TrackedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedContext")
            .field("name", &self.name)
            .field("children", &self.children.borrow().len())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// `proptest` strategies.
pub mod strategies {
    use proptest::prelude::*;
    use tether_core::Flow;

    /// Any flow.
    pub fn flow() -> impl Strategy<Value = Flow> {
        prop_oneof![
            Just(Flow::OneWay),
            Just(Flow::TwoWay),
            Just(Flow::Reverse),
            Just(Flow::Once),
        ]
    }

    /// A short sequence of writes, `true` meaning "write side A".
    pub fn writes() -> impl Strategy<Value = Vec<(bool, i32)>> {
        prop::collection::vec((any::<bool>(), -1_000..1_000_i32), 1..16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_binder::{ContextWrapper, destroy_with_children};

    #[test]
    fn call_log_counts_and_orders() {
        let log = CallLog::new();
        log.record("a");
        log.record("b");
        log.record("a");
        assert_eq!(log.count("a"), 2);
        assert_eq!(log.position("b"), Some(1));
        assert_eq!(log.len(), 3);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn recording_consumer_logs_lifecycle() {
        init_test_logging();
        let log = CallLog::new();
        let consumer = RecordingConsumer::<ContextWrapper<i32>>::passive("vm", &log);
        let binder = Binder::new(ContextWrapper::new(1));
        binder.attach(consumer.clone()).unwrap();
        binder.destroy();
        assert_eq!(log.entries(), vec!["vm: attach", "vm: destroy"]);
        assert_eq!((consumer.attach_count(), consumer.destroy_count()), (1, 1));
    }

    #[test]
    fn tracked_context_tears_down_children_first() {
        let log = CallLog::new();
        let parent = TrackedContext::new("parent", &log);
        parent.add_child(TrackedContext::new("child", &log));
        destroy_with_children(parent.as_ref());
        assert_eq!(log.entries(), vec!["child: teardown", "parent: teardown"]);
    }
}
