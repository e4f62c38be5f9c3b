#![forbid(unsafe_code)]

//! Binder nodes: context-scoped owners of consumers, bindings and children.
//!
//! A [`Binder<C>`] pairs a context value with the consumers attached to it
//! and the child nodes scoped beneath it. Bulk operations walk a node's
//! consumers in attach order and, when cascading, the children afterwards.
//!
//! # State machine
//!
//! ```text
//!            attach / attach_child / bulk ops / context-changed rebuild
//!           ┌───────┐
//!           ▼       │
//!   new ──► Active ─┘ ──── destroy ────► Destroyed (terminal)
//! ```
//!
//! A node whose context offers a context-changed event subscribes to it on
//! creation. When it fires the node rebuilds: it snapshots its consumers,
//! destroys its bindings and children, re-attaches every consumer against
//! the new value and runs itself (bind, invalidate, subscribe) with the
//! configured cascade.
//!
//! # Invariants
//!
//! 1. A consumer appears at most once per node; attaching it again is a no-op.
//! 2. A consumer's bindings are unbound before its `on_context_destroy` runs.
//! 3. Bindings and children are torn down before the node is destroyed and
//!    before a rebuild re-attaches anything.
//! 4. After `destroy`, every operation is a no-op and the node no longer
//!    listens to its context.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Attach fails | consumer returned an error | consumer not recorded, error returned, node unchanged |
//! | Attach fails during rebuild | new context rejected by a consumer | remaining consumers still re-attached, first error returned from the context setter |
//! | Bulk op fails | propagation error in a binding | stops at the failing binding, error returned |
//! | Node dropped | last handle dropped without `destroy` | context listener disconnected, consumers not notified |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::ptr;
use std::rc::{Rc, Weak};

use tether_core::{BindError, Event, HandlerId, HandlerResult, SharedBinding};

use crate::bindable::Bindable;
use crate::config::BinderOptions;
use crate::context::Context;

/// Lifecycle state of a binder node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Active,
    Destroyed,
}

/// Type-erased binder node, used for children and parents.
pub trait BinderNode {
    /// Rebuild the handlers of every binding.
    fn bind(&self, cascade: bool) -> Result<(), BindError>;

    /// Invalidate every binding on the configured side.
    fn invalidate(&self, cascade: bool) -> Result<(), BindError>;

    /// Subscribe every binding.
    fn subscribe(&self, cascade: bool);

    /// Unsubscribe every binding.
    fn unsubscribe(&self, cascade: bool);

    /// Unbind every binding, keeping consumers attached.
    fn unbind(&self, cascade: bool);

    /// `bind`, then `invalidate`, then `subscribe`.
    fn run(&self, cascade: bool) -> Result<(), BindError> {
        self.bind(cascade)?;
        self.invalidate(cascade)?;
        self.subscribe(cascade);
        Ok(())
    }

    /// Stop listening to the context and tear everything down.
    fn destroy(&self);

    /// Unbind every binding, notify every consumer and forget them.
    fn destroy_bindings(&self);

    /// Destroy every child node and forget them.
    fn destroy_children(&self);

    fn state(&self) -> NodeState;

    fn parent(&self) -> Option<Rc<dyn BinderNode>>;

    fn children(&self) -> Vec<Rc<dyn BinderNode>>;

    fn consumer_count(&self) -> usize;

    fn binding_count(&self) -> usize;
}

enum ContextLink {
    Fixed,
    Observable {
        event: Event<()>,
        handler: Cell<Option<HandlerId>>,
    },
}

impl ContextLink {
    fn release(&self) {
        if let Self::Observable { event, handler } = self
            && let Some(id) = handler.take()
        {
            event.disconnect(id);
        }
    }
}

struct Entry<C: Context> {
    consumer: Rc<dyn Bindable<C>>,
    bindings: Vec<SharedBinding>,
}

struct BinderInner<C: Context> {
    context: C,
    parent: Option<Weak<dyn BinderNode>>,
    link: ContextLink,
    entries: RefCell<Vec<Entry<C>>>,
    children: RefCell<Vec<Rc<dyn BinderNode>>>,
    state: Cell<NodeState>,
    options: BinderOptions,
}

impl<C: Context> BinderInner<C> {
    fn is_destroyed(&self) -> bool {
        self.state.get() == NodeState::Destroyed
    }

    fn position<B: ?Sized>(&self, consumer: &Rc<B>) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|entry| ptr::addr_eq(Rc::as_ptr(&entry.consumer), Rc::as_ptr(consumer)))
    }

    fn bindings_of<B: ?Sized>(&self, consumer: &Rc<B>) -> Vec<SharedBinding> {
        self.position(consumer)
            .map(|index| self.entries.borrow()[index].bindings.clone())
            .unwrap_or_default()
    }

    fn all_bindings(&self) -> Vec<SharedBinding> {
        self.entries
            .borrow()
            .iter()
            .flat_map(|entry| entry.bindings.iter().cloned())
            .collect()
    }

    fn child_snapshot(&self) -> Vec<Rc<dyn BinderNode>> {
        self.children.borrow().clone()
    }

    fn try_each(
        &self,
        cascade: bool,
        op: impl Fn(&SharedBinding) -> Result<(), BindError>,
        child_op: impl Fn(&dyn BinderNode) -> Result<(), BindError>,
    ) -> Result<(), BindError> {
        for binding in self.all_bindings() {
            op(&binding)?;
        }
        if cascade {
            for child in self.child_snapshot() {
                child_op(child.as_ref())?;
            }
        }
        Ok(())
    }

    fn each(
        &self,
        cascade: bool,
        op: impl Fn(&SharedBinding),
        child_op: impl Fn(&dyn BinderNode),
    ) {
        for binding in self.all_bindings() {
            op(&binding);
        }
        if cascade {
            for child in self.child_snapshot() {
                child_op(child.as_ref());
            }
        }
    }
}

impl<C: Context> BinderNode for BinderInner<C> {
    fn bind(&self, cascade: bool) -> Result<(), BindError> {
        self.try_each(cascade, |b| b.bind(), |c| c.bind(true))
    }

    fn invalidate(&self, cascade: bool) -> Result<(), BindError> {
        let side = self.options.invalidate_side;
        self.try_each(cascade, |b| b.invalidate(side), |c| c.invalidate(true))
    }

    fn subscribe(&self, cascade: bool) {
        self.each(cascade, |b| b.subscribe(), |c| c.subscribe(true));
    }

    fn unsubscribe(&self, cascade: bool) {
        self.each(cascade, |b| b.unsubscribe(), |c| c.unsubscribe(true));
    }

    fn unbind(&self, cascade: bool) {
        self.each(cascade, |b| b.unbind(), |c| c.unbind(true));
    }

    fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        self.link.release();
        self.destroy_bindings();
        self.destroy_children();
        self.state.set(NodeState::Destroyed);
        tracing::debug!("binder destroyed");
    }

    fn destroy_bindings(&self) {
        let entries = mem::take(&mut *self.entries.borrow_mut());
        for entry in entries {
            for binding in &entry.bindings {
                binding.unbind();
            }
            entry.consumer.on_context_destroy();
        }
    }

    fn destroy_children(&self) {
        for child in self.child_snapshot() {
            child.destroy();
        }
        self.children.borrow_mut().clear();
    }

    fn state(&self) -> NodeState {
        self.state.get()
    }

    fn parent(&self) -> Option<Rc<dyn BinderNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn children(&self) -> Vec<Rc<dyn BinderNode>> {
        self.child_snapshot()
    }

    fn consumer_count(&self) -> usize {
        self.entries.borrow().len()
    }

    fn binding_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.bindings.len())
            .sum()
    }
}

impl<C: Context> Drop for BinderInner<C> {
    fn drop(&mut self) {
        self.link.release();
    }
}

/// A binder node scoped to a context of type `C`. Clones share the node.
pub struct Binder<C: Context> {
    inner: Rc<BinderInner<C>>,
}

impl<C: Context> Clone for Binder<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Context> fmt::Debug for Binder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("state", &self.inner.state.get())
            .field("observable", &matches!(self.inner.link, ContextLink::Observable { .. }))
            .field("consumers", &self.inner.consumer_count())
            .field("bindings", &self.inner.binding_count())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

impl<C: Context> Binder<C> {
    /// Create a root node with default options.
    #[must_use]
    pub fn new(context: C) -> Self {
        Self::with_options(context, BinderOptions::default())
    }

    /// Create a root node.
    #[must_use]
    pub fn with_options(context: C, options: BinderOptions) -> Self {
        Self::create(context, None, options)
    }

    fn create(context: C, parent: Option<Weak<dyn BinderNode>>, options: BinderOptions) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<BinderInner<C>>| {
            let link = match context.context_changed() {
                Some(event) => {
                    let node = weak.clone();
                    let id = event.connect(move |_: &()| match node.upgrade() {
                        Some(inner) => Binder { inner }.rebuild(),
                        None => Ok(()),
                    });
                    ContextLink::Observable {
                        event,
                        handler: Cell::new(Some(id)),
                    }
                }
                None => ContextLink::Fixed,
            };
            BinderInner {
                context,
                parent,
                link,
                entries: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                state: Cell::new(NodeState::Active),
                options,
            }
        });
        Self { inner }
    }

    #[must_use]
    pub fn context(&self) -> &C {
        &self.inner.context
    }

    #[must_use]
    pub fn options(&self) -> BinderOptions {
        self.inner.options
    }

    /// Whether the node rebuilds when its context changes.
    #[must_use]
    pub fn is_observing_context(&self) -> bool {
        matches!(
            &self.inner.link,
            ContextLink::Observable { handler, .. } if handler.get().is_some()
        )
    }

    /// Whether `consumer` is attached to this node.
    #[must_use]
    pub fn is_attached<B: ?Sized>(&self, consumer: &Rc<B>) -> bool {
        self.inner.position(consumer).is_some()
    }

    /// Attach `consumer` and record the bindings it declares.
    ///
    /// Returns `Ok(false)` if the consumer is already attached or the node
    /// is destroyed. The bindings are not run; call [`run`](Self::run).
    pub fn attach(&self, consumer: Rc<dyn Bindable<C>>) -> Result<bool, BindError> {
        if self.inner.is_destroyed() || self.is_attached(&consumer) {
            return Ok(false);
        }
        let bindings = consumer.on_context_attach(&self.inner.context, self)?;
        if self.is_attached(&consumer) {
            for binding in &bindings {
                binding.unbind();
            }
            return Ok(false);
        }
        tracing::debug!(bindings = bindings.len(), "consumer attached");
        self.inner
            .entries
            .borrow_mut()
            .push(Entry { consumer, bindings });
        Ok(true)
    }

    /// Create a child node scoped to `context` and attach `consumer` to it.
    ///
    /// If the attach fails the child is destroyed and not recorded.
    pub fn attach_child<U: Context>(
        &self,
        context: U,
        consumer: Rc<dyn Bindable<U>>,
    ) -> Result<Binder<U>, BindError> {
        let child = self.new_child(context);
        if self.inner.is_destroyed() {
            child.destroy();
            return Ok(child);
        }
        if let Err(err) = child.attach(consumer) {
            child.destroy();
            return Err(err);
        }
        self.push_child(&child);
        Ok(child)
    }

    /// Create an empty child node scoped to `context`.
    pub fn add_child<U: Context>(&self, context: U) -> Binder<U> {
        let child = self.new_child(context);
        if self.inner.is_destroyed() {
            child.destroy();
        } else {
            self.push_child(&child);
        }
        child
    }

    fn new_child<U: Context>(&self, context: U) -> Binder<U> {
        let parent: Rc<dyn BinderNode> = self.inner.clone();
        Binder::create(context, Some(Rc::downgrade(&parent)), self.inner.options)
    }

    fn push_child<U: Context>(&self, child: &Binder<U>) {
        let node: Rc<dyn BinderNode> = child.inner.clone();
        self.inner.children.borrow_mut().push(node);
        tracing::trace!(children = self.inner.children.borrow().len(), "child attached");
    }

    /// Detach one consumer: unbind its bindings, notify it and forget it.
    pub fn detach<B: ?Sized>(&self, consumer: &Rc<B>) -> bool {
        let Some(index) = self.inner.position(consumer) else {
            return false;
        };
        let entry = self.inner.entries.borrow_mut().remove(index);
        for binding in &entry.bindings {
            binding.unbind();
        }
        entry.consumer.on_context_destroy();
        true
    }

    // -----------------------------------------------------------------------
    // Bulk operations
    // -----------------------------------------------------------------------

    pub fn bind(&self, cascade: bool) -> Result<(), BindError> {
        self.inner.bind(cascade)
    }

    pub fn invalidate(&self, cascade: bool) -> Result<(), BindError> {
        self.inner.invalidate(cascade)
    }

    pub fn subscribe(&self, cascade: bool) {
        self.inner.subscribe(cascade);
    }

    pub fn unsubscribe(&self, cascade: bool) {
        self.inner.unsubscribe(cascade);
    }

    pub fn unbind(&self, cascade: bool) {
        self.inner.unbind(cascade);
    }

    /// Bind, invalidate and subscribe.
    pub fn run(&self, cascade: bool) -> Result<(), BindError> {
        self.inner.run(cascade)
    }

    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn destroy_bindings(&self) {
        self.inner.destroy_bindings();
    }

    pub fn destroy_children(&self) {
        self.inner.destroy_children();
    }

    // -----------------------------------------------------------------------
    // Per-consumer operations
    // -----------------------------------------------------------------------

    pub fn bind_consumer<B: ?Sized>(&self, consumer: &Rc<B>) -> Result<(), BindError> {
        self.inner
            .bindings_of(consumer)
            .iter()
            .try_for_each(|binding| binding.bind())
    }

    pub fn invalidate_consumer<B: ?Sized>(&self, consumer: &Rc<B>) -> Result<(), BindError> {
        let side = self.inner.options.invalidate_side;
        self.inner
            .bindings_of(consumer)
            .iter()
            .try_for_each(|binding| binding.invalidate(side))
    }

    pub fn subscribe_consumer<B: ?Sized>(&self, consumer: &Rc<B>) {
        for binding in self.inner.bindings_of(consumer) {
            binding.subscribe();
        }
    }

    pub fn unsubscribe_consumer<B: ?Sized>(&self, consumer: &Rc<B>) {
        for binding in self.inner.bindings_of(consumer) {
            binding.unsubscribe();
        }
    }

    pub fn unbind_consumer<B: ?Sized>(&self, consumer: &Rc<B>) {
        for binding in self.inner.bindings_of(consumer) {
            binding.unbind();
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.inner.state.get()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<dyn BinderNode>> {
        BinderNode::parent(self.inner.as_ref())
    }

    #[must_use]
    pub fn children(&self) -> Vec<Rc<dyn BinderNode>> {
        self.inner.child_snapshot()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.inner.consumer_count()
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.inner.binding_count()
    }

    /// Type-erase this node.
    #[must_use]
    pub fn as_node(&self) -> Rc<dyn BinderNode> {
        self.inner.clone()
    }

    fn rebuild(&self) -> HandlerResult {
        if self.inner.is_destroyed() {
            return Ok(());
        }
        let consumers: Vec<Rc<dyn Bindable<C>>> = self
            .inner
            .entries
            .borrow()
            .iter()
            .map(|entry| Rc::clone(&entry.consumer))
            .collect();
        let span = tracing::debug_span!("binder.rebuild", consumers = consumers.len());
        let _guard = span.enter();

        self.inner.destroy_bindings();
        self.inner.destroy_children();

        let mut first_error = None;
        for consumer in consumers {
            if let Err(err) = self.attach(consumer) {
                tracing::warn!(error = %err, "consumer rejected the new context");
                first_error.get_or_insert(err);
            }
        }
        let ran = self.inner.run(self.inner.options.cascade);
        match first_error {
            Some(err) => Err(err),
            None => ran,
        }
    }
}
