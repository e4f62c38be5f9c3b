#![forbid(unsafe_code)]

//! The consumer contract, and a change cell that implements it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tether_core::{BindError, HandlerResult, Observable, SharedBinding, Side, Subscription};

use crate::binder::Binder;
use crate::context::{Context, ContextValue};
use crate::wrapper::ContextWrapper;

/// An object that declares bindings against a context.
///
/// A binder node calls [`on_context_attach`](Bindable::on_context_attach)
/// once per attachment and owns the returned bindings from then on. It
/// calls [`on_context_destroy`](Bindable::on_context_destroy) once when
/// those bindings have been torn down, either because the node is destroyed
/// or because its context was replaced.
pub trait Bindable<C: Context> {
    /// Build the bindings for `context`.
    ///
    /// `binder` is the node being attached to; use it to register nested
    /// children. The returned bindings are established but not yet
    /// subscribed: the node runs them when it runs.
    fn on_context_attach(
        &self,
        context: &C,
        binder: &Binder<C>,
    ) -> Result<Vec<SharedBinding>, BindError>;

    /// Release consumer-held resources.
    fn on_context_destroy(&self) {}
}

type AttachingFn<T> = Rc<dyn Fn(&T, &Binder<ContextWrapper<T>>) -> HandlerResult>;
type DestroyingFn = Rc<dyn Fn()>;

/// A change cell bound two-way to the value of the context wrapper it is
/// attached to.
///
/// Attaching callbacks run after the binding is established and receive
/// the context's current value and the binder, so they can attach nested
/// children.
pub struct BindableCell<T: ContextValue> {
    value: Observable<T>,
    attaching: RefCell<Vec<AttachingFn<T>>>,
    destroying: RefCell<Vec<DestroyingFn>>,
}

impl<T: ContextValue> BindableCell<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value: Observable::new(value),
            attaching: RefCell::new(Vec::new()),
            destroying: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }

    pub fn set(&self, value: T) -> Result<bool, BindError> {
        self.value.set(value)
    }

    /// The cell's own value.
    #[must_use]
    pub fn value(&self) -> &Observable<T> {
        &self.value
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.value.subscribe(callback)
    }

    /// Run `callback` on every attachment.
    pub fn on_attaching(
        &self,
        callback: impl Fn(&T, &Binder<ContextWrapper<T>>) -> HandlerResult + 'static,
    ) {
        self.attaching.borrow_mut().push(Rc::new(callback));
    }

    /// Run `callback` whenever the attachment is torn down.
    pub fn on_destroying(&self, callback: impl Fn() + 'static) {
        self.destroying.borrow_mut().push(Rc::new(callback));
    }
}

impl<T: ContextValue + Default> Default for BindableCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ContextValue> Bindable<ContextWrapper<T>> for BindableCell<T> {
    fn on_context_attach(
        &self,
        context: &ContextWrapper<T>,
        binder: &Binder<ContextWrapper<T>>,
    ) -> Result<Vec<SharedBinding>, BindError> {
        let binding = Side::observable(&self.value)
            .to(&context.side()?)
            .establish_shared()?;
        let callbacks = self.attaching.borrow().clone();
        let current = context.get();
        for callback in callbacks {
            callback(&current, binder)?;
        }
        Ok(vec![binding])
    }

    fn on_context_destroy(&self) {
        let callbacks = self.destroying.borrow().clone();
        for callback in callbacks {
            callback();
        }
    }
}

impl<T: ContextValue + fmt::Debug> fmt::Debug for BindableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableCell")
            .field("value", &self.value)
            .field("attaching", &self.attaching.borrow().len())
            .field("destroying", &self.destroying.borrow().len())
            .finish()
    }
}
