#![forbid(unsafe_code)]

//! A change cell that is also a binder context.
//!
//! [`ContextWrapper<T>`] holds a context value in an [`Observable<T>`] and
//! adds two things: a payload-less context-changed event that makes binder
//! nodes scoped to it rebuild, and a children derivation used to destroy the
//! contexts implied by a value once it has been replaced.
//!
//! # Set sequence
//!
//! An effective [`set`](ContextWrapper::set) runs, in order:
//!
//! 1. store the value;
//! 2. raise value-changed with `(value, previous)`;
//! 3. raise context-changed;
//! 4. [`destroy_with_children`] every child implied by `previous`.
//!
//! Every step runs even if an earlier one failed; the first failure is
//! returned.
//!
//! # Children
//!
//! | Value | Children |
//! |-------|----------|
//! | unset (`None`, `0`, empty string, ...) | none |
//! | a context (`ByRef<X: Teardown>`) | the value itself |
//! | a collection of contexts | the collection |
//! | anything else | the derivation function's result, or none |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tether_core::{BindError, Event, HandlerResult, Observable, Side, Subscription, ValueChange};

use crate::context::{Context, ContextValue, Teardown, destroy_with_children};

type DeriveFn<T> = Rc<dyn Fn(&T) -> Vec<Rc<dyn Teardown>>>;

/// Observable context value with cascading teardown. Clones share state.
pub struct ContextWrapper<T> {
    cell: Observable<T>,
    context_changed: Event<()>,
    derive: Rc<RefCell<Option<DeriveFn<T>>>>,
}

impl<T> Clone for ContextWrapper<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            context_changed: self.context_changed.clone(),
            derive: Rc::clone(&self.derive),
        }
    }
}

impl<T: ContextValue + Default> Default for ContextWrapper<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ContextValue + fmt::Debug> fmt::Debug for ContextWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextWrapper")
            .field("value", &self.cell)
            .field("derive", &self.derive.borrow().is_some())
            .finish()
    }
}

impl<T: ContextValue> ContextWrapper<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            cell: Observable::new(value),
            context_changed: Event::new(),
            derive: Rc::new(RefCell::new(None)),
        }
    }

    /// Use `derive` for values that do not imply children by themselves.
    #[must_use]
    pub fn with_children(self, derive: impl Fn(&T) -> Vec<Rc<dyn Teardown>> + 'static) -> Self {
        self.set_children(derive);
        self
    }

    /// Replace the children derivation.
    pub fn set_children(&self, derive: impl Fn(&T) -> Vec<Rc<dyn Teardown>> + 'static) {
        *self.derive.borrow_mut() = Some(Rc::new(derive));
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    /// The underlying change cell.
    #[must_use]
    pub fn value(&self) -> &Observable<T> {
        &self.cell
    }

    /// The value member as a binding side.
    ///
    /// Writes go through [`set`](Self::set), so a binding writing into the
    /// wrapper replaces the context like any other caller would.
    pub fn side(&self) -> Result<Side<T>, BindError> {
        let reader = self.cell.clone();
        let writer = self.clone();
        Side::builder("value")
            .getter(move || reader.get())
            .try_setter(move |value| writer.set(value).map(drop))
            .value_changed_via(self.cell.changed())
            .build()
    }

    /// The value-changed event.
    #[must_use]
    pub fn changed(&self) -> &Event<ValueChange<T>> {
        self.cell.changed()
    }

    /// The context-changed event.
    #[must_use]
    pub fn context_changed_event(&self) -> &Event<()> {
        &self.context_changed
    }

    /// Call `callback` with the new value after every effective set.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }

    /// Replace the context value.
    ///
    /// Returns `Ok(false)` and does nothing when `value` equals the current
    /// value.
    pub fn set(&self, value: T) -> Result<bool, BindError> {
        self.replace_with(value, true)
    }

    /// Replace the context value without raising value-changed.
    ///
    /// Context-changed and the teardown of the previous children still run.
    pub fn set_quiet(&self, value: T) -> Result<bool, BindError> {
        self.replace_with(value, false)
    }

    /// Children implied by the current value.
    #[must_use]
    pub fn children(&self) -> Vec<Rc<dyn Teardown>> {
        self.cell.with(|value| self.children_of(value))
    }

    fn replace_with(&self, value: T, raise_value_changed: bool) -> Result<bool, BindError> {
        let Some(previous) = self.cell.replace(value) else {
            return Ok(false);
        };
        tracing::debug!(raise_value_changed, "context value replaced");

        let mut first_error: Option<BindError> = None;
        let mut record = |result: HandlerResult| {
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        };
        if raise_value_changed {
            record(self.cell.notify_change(previous.clone()));
        }
        record(self.context_changed.emit(&()));

        let stale = self.children_of(&previous);
        if !stale.is_empty() {
            tracing::debug!(children = stale.len(), "destroying previous context children");
        }
        for child in stale {
            destroy_with_children(child.as_ref());
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    fn children_of(&self, value: &T) -> Vec<Rc<dyn Teardown>> {
        if value.is_unset() {
            return Vec::new();
        }
        if let Some(children) = value.implied_children() {
            return children;
        }
        let derive = self.derive.borrow().clone();
        derive.map(|derive| derive(value)).unwrap_or_default()
    }
}

impl<T: ContextValue> Context for ContextWrapper<T> {
    fn context_changed(&self) -> Option<Event<()>> {
        Some(self.context_changed.clone())
    }
}

impl<T: ContextValue> Teardown for ContextWrapper<T> {
    fn children(&self) -> Vec<Rc<dyn Teardown>> {
        ContextWrapper::children(self)
    }
}
