#![forbid(unsafe_code)]

//! Context-scoped binder trees for Tether.
//!
//! A [`Binder`] node owns the bindings that [`Bindable`] consumers declare
//! against its context. When the context is a [`ContextWrapper`] and its
//! value is replaced, the node tears everything down and re-attaches its
//! consumers against the new value.
//!
//! ```
//! use std::rc::Rc;
//! use tether_binder::{BindableCell, Binder, ContextWrapper};
//!
//! let context = ContextWrapper::new(3);
//! let binder = Binder::new(context.clone());
//! let cell = Rc::new(BindableCell::new(0_i32));
//! binder.attach(cell.clone())?;
//! binder.run(true)?;
//! assert_eq!(cell.get(), 3);
//!
//! context.set(4)?;
//! assert_eq!(cell.get(), 4);
//! # Ok::<(), tether_core::BindError>(())
//! ```

pub mod bindable;
pub mod binder;
pub mod config;
pub mod context;
pub mod view_model;
pub mod wrapper;

pub use bindable::{Bindable, BindableCell};
pub use binder::{Binder, BinderNode, NodeState};
#[cfg(feature = "config")]
pub use config::ConfigError;
pub use config::BinderOptions;
pub use context::{Context, ContextValue, Teardown, destroy_with_children};
pub use view_model::ViewModel;
pub use wrapper::ContextWrapper;
