#![forbid(unsafe_code)]

//! Bindings between two sides.
//!
//! A [`Binding<A, B>`] pairs a side A with a side B under a [`Flow`]. It
//! owns the compiled assignments and the subscription handlers and drives
//! the lifecycle:
//!
//! ```text
//! establish ──► bind ──► invalidate / subscribe ──► unsubscribe ──► unbind
//!                 ▲                                                  │
//!                 └────────────────── bind again ────────────────────┘
//! ```
//!
//! # Flows
//!
//! | Flow | Assignments | Observed sides | Echo guard |
//! |------|-------------|----------------|------------|
//! | `OneWay` | B→A | B | none |
//! | `TwoWay` | B→A, A→B | A and B | each handler detaches the *other* side |
//! | `Reverse` | B→A, A→B | A and B | both handlers detach side A |
//! | `Once` | B→A | B, first change only | handler detaches and discards itself |
//!
//! `Reverse` pairs both handlers with side A. When A changes, A→B runs and
//! the resulting B change echoes B→A once, which is harmless because A
//! already holds that value. [`Binding::invalidate`] on a `Reverse` binding
//! runs A→B (for side A only) and then always B→A.
//!
//! # Invariants
//!
//! 1. B→A is compiled for every flow; A→B only for `TwoWay` and `Reverse`.
//! 2. A handler exists only for a side whose flow observes it, and only
//!    between `bind` and `unbind`.
//! 3. A side is connected at most once: `subscribe` is idempotent.
//! 4. An echo guard re-attaches the guarded side only if it was attached,
//!    and does so even when the assignment fails.
//! 5. `unbind` is idempotent, and dropping the last handle unbinds.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing access | flow needs read/write the side lacks | `establish` fails, nothing is created |
//! | Missing adapter | differently typed sides | `establish` fails |
//! | No change source | observed side has none | `establish`/`bind` fails, existing handlers kept |
//! | Assignment failure | getter, adapter or setter error | `BindError::Propagation` from the trigger |
//! | Binding dropped | every handle dropped while subscribed | both handlers are disconnected |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{BindError, BoxError, Direction, HandlerResult};
use crate::event::HandlerId;
use crate::side::{Action, Adapter, Assigner, Handler, Side, identity};

/// Directionality policy of a binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Flow {
    /// B drives A.
    OneWay,
    /// A and B drive each other.
    #[default]
    TwoWay,
    /// A drives B at runtime; B is authoritative when invalidated.
    Reverse,
    /// The first B change after subscription drives A, then nothing.
    Once,
}

impl Flow {
    /// Whether the flow compiles an A→B assignment.
    #[must_use]
    pub const fn assigns_a_to_b(self) -> bool {
        matches!(self, Self::TwoWay | Self::Reverse)
    }

    /// Whether the flow observes side A.
    #[must_use]
    pub const fn observes_a(self) -> bool {
        self.assigns_a_to_b()
    }
}

/// Names one of the two sides of a binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SideId {
    A,
    #[default]
    B,
}

impl SideId {
    /// The opposite side.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Type-erased control surface of a binding.
///
/// Binder nodes and scopes hold heterogeneous bindings through this trait.
pub trait BindingHandle {
    /// (Re)build the subscription handlers for the binding's flow.
    fn bind(&self) -> Result<(), BindError>;

    /// Run the flow's assignment for `side` right now.
    fn invalidate(&self, side: SideId) -> Result<(), BindError>;

    /// Connect the handler of one side, if it has one.
    fn subscribe_side(&self, side: SideId);

    /// Disconnect the handler of one side.
    fn unsubscribe_side(&self, side: SideId);

    /// Disconnect both handlers and discard them.
    fn unbind(&self);

    /// The binding's flow.
    fn flow(&self) -> Flow;

    /// Whether `side` currently has a connected handler.
    fn is_subscribed(&self, side: SideId) -> bool;

    /// Connect both handlers.
    fn subscribe(&self) {
        self.subscribe_side(SideId::A);
        self.subscribe_side(SideId::B);
    }

    /// Disconnect both handlers, keeping them for a later `subscribe`.
    fn unsubscribe(&self) {
        self.unsubscribe_side(SideId::A);
        self.unsubscribe_side(SideId::B);
    }
}

/// Shared, type-erased binding.
pub type SharedBinding = Rc<dyn BindingHandle>;

struct Slot<T> {
    handler: RefCell<Option<Handler<T>>>,
    connection: Cell<Option<HandlerId>>,
}

impl<T: 'static> Slot<T> {
    fn new() -> Self {
        Self {
            handler: RefCell::new(None),
            connection: Cell::new(None),
        }
    }

    fn attach(&self, side: &Side<T>) -> bool {
        if self.connection.get().is_some() {
            return false;
        }
        let id = self
            .handler
            .borrow()
            .as_ref()
            .and_then(|handler| side.attach(handler));
        self.connection.set(id);
        id.is_some()
    }

    fn replace(&self, side: &Side<T>, handler: Option<Handler<T>>) {
        let was_attached = self.detach(side);
        *self.handler.borrow_mut() = handler;
        if was_attached {
            self.attach(side);
        }
    }
}

impl<T> Slot<T> {
    fn detach(&self, side: &Side<T>) -> bool {
        match self.connection.take() {
            Some(id) => side.detach(id),
            None => false,
        }
    }

    fn clear(&self, side: &Side<T>) {
        self.detach(side);
        self.handler.borrow_mut().take();
    }
}

struct BindingInner<A, B> {
    side_a: Side<A>,
    side_b: Side<B>,
    flow: Flow,
    assign_ab: Option<Assigner>,
    assign_ba: Assigner,
    slot_a: Slot<A>,
    slot_b: Slot<B>,
}

impl<A: 'static, B: 'static> BindingInner<A, B> {
    fn attach(&self, side: SideId) -> bool {
        match side {
            SideId::A => self.slot_a.attach(&self.side_a),
            SideId::B => self.slot_b.attach(&self.side_b),
        }
    }

    fn detach(&self, side: SideId) -> bool {
        match side {
            SideId::A => self.slot_a.detach(&self.side_a),
            SideId::B => self.slot_b.detach(&self.side_b),
        }
    }

    fn is_attached(&self, side: SideId) -> bool {
        match side {
            SideId::A => self.slot_a.connection.get().is_some(),
            SideId::B => self.slot_b.connection.get().is_some(),
        }
    }
}

impl<A, B> Drop for BindingInner<A, B> {
    fn drop(&mut self) {
        self.slot_a.clear(&self.side_a);
        self.slot_b.clear(&self.side_b);
    }
}

fn run_assign(assign: &Assigner) -> HandlerResult {
    assign().map_err(|cause| {
        let err = BindError::propagation(cause);
        tracing::warn!(error = %err, "propagation failed");
        err
    })
}

/// Assign while `guard` is detached so the write cannot echo back.
fn guarded<A: 'static, B: 'static>(
    binding: Weak<BindingInner<A, B>>,
    guard: SideId,
    assign: Assigner,
) -> Action {
    Rc::new(move || {
        let Some(inner) = binding.upgrade() else {
            return Ok(());
        };
        let was_attached = inner.detach(guard);
        let result = run_assign(&assign);
        if was_attached {
            inner.attach(guard);
        }
        result
    })
}

fn forward<A: 'static, B: 'static>(binding: Weak<BindingInner<A, B>>, assign: Assigner) -> Action {
    Rc::new(move || {
        if binding.strong_count() == 0 {
            return Ok(());
        }
        run_assign(&assign)
    })
}

fn once<A: 'static, B: 'static>(binding: Weak<BindingInner<A, B>>, assign: Assigner) -> Action {
    Rc::new(move || {
        let Some(inner) = binding.upgrade() else {
            return Ok(());
        };
        inner.slot_b.clear(&inner.side_b);
        tracing::trace!(member = inner.side_b.member(), "once binding spent");
        run_assign(&assign)
    })
}

/// A bound pair of sides plus a propagation flow.
pub struct Binding<A, B> {
    inner: Rc<BindingInner<A, B>>,
}

impl<A, B> Clone for Binding<A, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A, B> fmt::Debug for Binding<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("a", &self.inner.side_a)
            .field("b", &self.inner.side_b)
            .field("flow", &self.inner.flow)
            .field("subscribed_a", &self.inner.slot_a.connection.get().is_some())
            .field("subscribed_b", &self.inner.slot_b.connection.get().is_some())
            .finish()
    }
}

impl<A: 'static, B: 'static> Binding<A, B> {
    /// Start configuring a binding between `side_a` and `side_b`.
    pub fn between(side_a: &Side<A>, side_b: &Side<B>) -> BindingBuilder<A, B> {
        BindingBuilder::new(side_a, side_b)
    }

    #[must_use]
    pub fn side_a(&self) -> &Side<A> {
        &self.inner.side_a
    }

    #[must_use]
    pub fn side_b(&self) -> &Side<B> {
        &self.inner.side_b
    }

    /// Whether handlers are currently built.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.slot_a.handler.borrow().is_some() || self.inner.slot_b.handler.borrow().is_some()
    }

    /// Invalidate side A if `side` is this binding's side A.
    pub fn invalidate_side_a(&self, side: &Side<A>) -> Result<(), BindError> {
        if self.inner.side_a.ptr_eq(side) {
            self.invalidate(SideId::A)
        } else {
            Ok(())
        }
    }

    /// Invalidate side B if `side` is this binding's side B.
    pub fn invalidate_side_b(&self, side: &Side<B>) -> Result<(), BindError> {
        if self.inner.side_b.ptr_eq(side) {
            self.invalidate(SideId::B)
        } else {
            Ok(())
        }
    }

    /// Type-erase into a [`SharedBinding`].
    #[must_use]
    pub fn shared(self) -> SharedBinding {
        Rc::new(self)
    }

    fn build_handlers(&self) -> Result<(Option<Handler<A>>, Option<Handler<B>>), BindError> {
        let inner = &self.inner;
        let weak = Rc::downgrade(inner);
        let assign_ba = Rc::clone(&inner.assign_ba);
        let handlers = match (inner.flow, inner.assign_ab.clone()) {
            (Flow::OneWay, _) => (
                None,
                Some(inner.side_b.make_handler(forward(weak, assign_ba))?),
            ),
            (Flow::TwoWay, Some(assign_ab)) => (
                Some(
                    inner
                        .side_a
                        .make_handler(guarded(weak.clone(), SideId::B, assign_ab))?,
                ),
                Some(
                    inner
                        .side_b
                        .make_handler(guarded(weak, SideId::A, assign_ba))?,
                ),
            ),
            (Flow::Reverse, Some(assign_ab)) => (
                Some(
                    inner
                        .side_a
                        .make_handler(guarded(weak.clone(), SideId::A, assign_ab))?,
                ),
                Some(
                    inner
                        .side_b
                        .make_handler(guarded(weak, SideId::A, assign_ba))?,
                ),
            ),
            (Flow::Once, _) => (None, Some(inner.side_b.make_handler(once(weak, assign_ba))?)),
            (Flow::TwoWay | Flow::Reverse, None) => {
                return Err(BindError::AdapterRequired {
                    direction: Direction::AToB,
                    flow: inner.flow,
                });
            }
        };
        Ok(handlers)
    }
}

impl<A: 'static, B: 'static> BindingHandle for Binding<A, B> {
    fn bind(&self) -> Result<(), BindError> {
        let (handler_a, handler_b) = self.build_handlers()?;
        let inner = &self.inner;
        inner.slot_a.replace(&inner.side_a, handler_a);
        inner.slot_b.replace(&inner.side_b, handler_b);
        tracing::trace!(
            a = inner.side_a.member(),
            b = inner.side_b.member(),
            flow = ?inner.flow,
            "binding handlers built"
        );
        Ok(())
    }

    fn invalidate(&self, side: SideId) -> Result<(), BindError> {
        let inner = &self.inner;
        match (inner.flow, side) {
            (Flow::TwoWay, SideId::A) => match &inner.assign_ab {
                Some(assign_ab) => run_assign(assign_ab),
                None => Ok(()),
            },
            (Flow::TwoWay | Flow::OneWay, SideId::B) => run_assign(&inner.assign_ba),
            (Flow::Reverse, side) => {
                if side == SideId::A
                    && let Some(assign_ab) = &inner.assign_ab
                {
                    run_assign(assign_ab)?;
                }
                run_assign(&inner.assign_ba)
            }
            (Flow::OneWay, SideId::A) | (Flow::Once, _) => Ok(()),
        }
    }

    fn subscribe_side(&self, side: SideId) {
        if self.inner.attach(side) {
            tracing::trace!(side = ?side, flow = ?self.inner.flow, "binding subscribed");
        }
    }

    fn unsubscribe_side(&self, side: SideId) {
        if self.inner.detach(side) {
            tracing::trace!(side = ?side, flow = ?self.inner.flow, "binding unsubscribed");
        }
    }

    fn unbind(&self) {
        let inner = &self.inner;
        inner.slot_a.clear(&inner.side_a);
        inner.slot_b.clear(&inner.side_b);
    }

    fn flow(&self) -> Flow {
        self.inner.flow
    }

    fn is_subscribed(&self, side: SideId) -> bool {
        self.inner.is_attached(side)
    }
}

// ---------------------------------------------------------------------------
// BindingBuilder
// ---------------------------------------------------------------------------

/// Configures and establishes a [`Binding`].
pub struct BindingBuilder<A, B> {
    side_a: Side<A>,
    side_b: Side<B>,
    flow: Flow,
    adapter_ba: Option<Adapter<B, A>>,
    adapter_ab: Option<Adapter<A, B>>,
}

impl<A: 'static, B: 'static> BindingBuilder<A, B> {
    /// Pair two sides under the default flow (`TwoWay`).
    pub fn new(side_a: &Side<A>, side_b: &Side<B>) -> Self {
        Self {
            side_a: side_a.clone(),
            side_b: side_b.clone(),
            flow: Flow::default(),
            adapter_ba: None,
            adapter_ab: None,
        }
    }

    #[must_use]
    pub fn flow(self, flow: Flow) -> Self {
        Self { flow, ..self }
    }

    /// Convert B values before writing them into A.
    #[must_use]
    pub fn adapt_ba(self, adapter: impl Fn(B) -> A + 'static) -> Self {
        Self {
            adapter_ba: Some(Rc::new(move |value| Ok(adapter(value)))),
            ..self
        }
    }

    /// Like [`adapt_ba`](Self::adapt_ba), for a conversion that may fail.
    #[must_use]
    pub fn try_adapt_ba<E: Into<BoxError>>(
        self,
        adapter: impl Fn(B) -> Result<A, E> + 'static,
    ) -> Self {
        Self {
            adapter_ba: Some(Rc::new(move |value| adapter(value).map_err(Into::into))),
            ..self
        }
    }

    /// Convert A values before writing them into B.
    #[must_use]
    pub fn adapt_ab(self, adapter: impl Fn(A) -> B + 'static) -> Self {
        Self {
            adapter_ab: Some(Rc::new(move |value| Ok(adapter(value)))),
            ..self
        }
    }

    /// Like [`adapt_ab`](Self::adapt_ab), for a conversion that may fail.
    #[must_use]
    pub fn try_adapt_ab<E: Into<BoxError>>(
        self,
        adapter: impl Fn(A) -> Result<B, E> + 'static,
    ) -> Self {
        Self {
            adapter_ab: Some(Rc::new(move |value| adapter(value).map_err(Into::into))),
            ..self
        }
    }

    /// Validate the sides, compile the assignments and build the handlers.
    ///
    /// The returned binding is bound but not subscribed.
    pub fn establish(self) -> Result<Binding<A, B>, BindError> {
        let flow = self.flow;
        let adapter_ba = self
            .adapter_ba
            .or_else(identity::<B, A>)
            .ok_or(BindError::AdapterRequired {
                direction: Direction::BToA,
                flow,
            })?;
        let assign_ba = self.side_a.assigner(&self.side_b, adapter_ba)?;

        let assign_ab = if flow.assigns_a_to_b() {
            let adapter_ab = self
                .adapter_ab
                .or_else(identity::<A, B>)
                .ok_or(BindError::AdapterRequired {
                    direction: Direction::AToB,
                    flow,
                })?;
            Some(self.side_b.assigner(&self.side_a, adapter_ab)?)
        } else {
            None
        };

        let binding = Binding {
            inner: Rc::new(BindingInner {
                side_a: self.side_a,
                side_b: self.side_b,
                flow,
                assign_ab,
                assign_ba,
                slot_a: Slot::new(),
                slot_b: Slot::new(),
            }),
        };
        binding.bind()?;
        tracing::debug!(
            a = binding.side_a().member(),
            b = binding.side_b().member(),
            flow = ?flow,
            "binding established"
        );
        Ok(binding)
    }

    /// Establish and type-erase.
    pub fn establish_shared(self) -> Result<SharedBinding, BindError> {
        self.establish().map(Binding::shared)
    }
}

impl<A, B> fmt::Debug for BindingBuilder<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingBuilder")
            .field("a", &self.side_a)
            .field("b", &self.side_b)
            .field("flow", &self.flow)
            .finish()
    }
}

impl<A: 'static> Side<A> {
    /// Pair this side (A) with `other` (B).
    pub fn to<B: 'static>(&self, other: &Side<B>) -> BindingBuilder<A, B> {
        BindingBuilder::new(self, other)
    }
}
