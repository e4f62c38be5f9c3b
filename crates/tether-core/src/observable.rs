#![forbid(unsafe_code)]

//! The change cell: a shared value that raises an event when it changes.
//!
//! [`Observable<T>`] is the minimal observable value of the binding engine.
//! It is bindable as an ordinary value (see [`Side::observable`]) and is the
//! storage behind every context wrapper.
//!
//! # Invariants
//!
//! 1. Writing a value equal to the current one is a no-op: no version bump,
//!    no event.
//! 2. The stored value is updated before any handler runs, so handlers
//!    reading the cell see the new value.
//! 3. The version increments exactly once per effective write.
//! 4. Equality is `PartialEq`. Wrap reference types in [`ByRef`] to compare
//!    by identity instead.
//!
//! [`Side::observable`]: crate::side::Side::observable

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::error::{BindError, HandlerResult};
use crate::event::{Event, Subscription};

/// Payload of a value-changed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueChange<T> {
    /// The value now stored.
    pub value: T,
    /// The value stored before the write.
    pub previous: T,
}

struct Inner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    changed: Event<ValueChange<T>>,
}

/// A shared, version-tracked value with change notification.
///
/// Clones share the same storage and event.
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                version: Cell::new(0),
                changed: Event::new(),
            }),
        }
    }

    /// Clone the current value out.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store `value` and raise the change event.
    ///
    /// Returns `Ok(false)` without notifying when `value` equals the current
    /// value. A failing handler's error is returned after the value has been
    /// stored.
    pub fn set(&self, value: T) -> Result<bool, BindError> {
        match self.replace(value) {
            Some(previous) => {
                self.notify_change(previous)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Store `value` without raising the change event.
    ///
    /// The version still advances. Returns whether the value changed.
    pub fn set_silent(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Store `value` and hand back the previous one, without notifying.
    ///
    /// Returns `None` when `value` equals the current value. Pair with
    /// [`notify_change`](Self::notify_change) to split the write from the
    /// notification.
    pub fn replace(&self, value: T) -> Option<T> {
        let previous = {
            let mut slot = self.inner.value.borrow_mut();
            if *slot == value {
                return None;
            }
            std::mem::replace(&mut *slot, value)
        };
        self.inner.version.set(self.inner.version.get() + 1);
        Some(previous)
    }

    /// Raise the change event for the current value against `previous`.
    pub fn notify_change(&self, previous: T) -> HandlerResult {
        let change = ValueChange {
            value: self.get(),
            previous,
        };
        self.inner.changed.emit(&change)
    }

    /// Raise the change event with the current value as both value and
    /// previous value.
    pub fn notify(&self) -> HandlerResult {
        self.notify_change(self.get())
    }

    /// Apply `f` to a copy of the value and store the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<bool, BindError> {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    /// The value-changed event.
    #[must_use]
    pub fn changed(&self) -> &Event<ValueChange<T>> {
        &self.inner.changed
    }

    /// Call `callback` with the new value after every effective write.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner
            .changed
            .subscribe(move |change| callback(&change.value))
    }

    /// Number of connected change handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.changed.handler_count()
    }

    /// Number of effective writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Whether both values are clones of the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade_any(&self) -> Weak<dyn Any> {
        let owner: Rc<dyn Any> = self.inner.clone();
        Rc::downgrade(&owner)
    }
}

// ---------------------------------------------------------------------------
// ByRef<T>: identity equality
// ---------------------------------------------------------------------------

/// A shared reference compared by identity rather than by value.
///
/// Store `ByRef<T>` in an [`Observable`] when replacing one object with an
/// equal but distinct object must still count as a change.
pub struct ByRef<T: ?Sized>(pub Rc<T>);

impl<T> ByRef<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl<T: ?Sized> ByRef<T> {
    /// The shared reference.
    #[must_use]
    pub fn rc(&self) -> &Rc<T> {
        &self.0
    }
}

impl<T: ?Sized> Clone for ByRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for ByRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for ByRef<T> {}

impl<T: ?Sized> Deref for ByRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> From<Rc<T>> for ByRef<T> {
    fn from(rc: Rc<T>) -> Self {
        Self(rc)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ByRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByRef").field(&&*self.0).finish()
    }
}
