#![forbid(unsafe_code)]

//! Core binding engine for Tether.
//!
//! - [`Event`]: single-threaded multicast event with fallible handlers.
//! - [`Observable`]: change cell raising `(value, previous)` on effective writes.
//! - [`Side`]: one end of a binding, described by explicit accessors and
//!   change sources through a [`SideBuilder`].
//! - [`Binding`]: a pair of sides plus a [`Flow`], with the
//!   bind/subscribe/invalidate/unbind lifecycle behind [`BindingHandle`].
//! - [`BindingScope`]: owns bindings and subscriptions for one logical owner.
//!
//! Everything here is `!Send`: bindings are driven synchronously on the
//! thread that owns them.
//!
//! # Example
//!
//! ```
//! use tether_core::{BindingHandle, Observable, Side};
//!
//! let a = Observable::new(0);
//! let b = Observable::new(0);
//! let binding = Side::observable(&a).to(&Side::observable(&b)).establish()?;
//! binding.subscribe();
//!
//! a.set(5)?;
//! assert_eq!(b.get(), 5);
//! b.set(7)?;
//! assert_eq!(a.get(), 7);
//! # Ok::<(), tether_core::BindError>(())
//! ```

pub mod binding;
pub mod error;
pub mod event;
pub mod observable;
pub mod scope;
pub mod side;

pub use binding::{Binding, BindingBuilder, BindingHandle, Flow, SharedBinding, SideId};
pub use error::{Access, BindError, BoxError, Direction, HandlerResult};
pub use event::{Event, HandlerId, Subscription};
pub use observable::{ByRef, Observable, ValueChange};
pub use scope::BindingScope;
pub use side::{
    ChangeSourceKind, NamedEvent, NotifyPropertyChanged, Side, SideBuilder, changed_event_name,
};
