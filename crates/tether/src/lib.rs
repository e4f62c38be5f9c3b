#![forbid(unsafe_code)]

//! Tether: two-way data binding with context-scoped binder trees.
//!
//! This crate re-exports [`tether_core`] (change cells, sides, bindings) and
//! [`tether_binder`] (contexts, consumers, binder nodes). Most code only
//! needs the [`prelude`].
//!
//! ```
//! use tether::prelude::*;
//!
//! let celsius = Observable::new(0.0_f64);
//! let fahrenheit = Observable::new(32.0_f64);
//! let binding = Side::observable(&celsius)
//!     .to(&Side::observable(&fahrenheit))
//!     .adapt_ba(|f| (f - 32.0) * 5.0 / 9.0)
//!     .adapt_ab(|c| c * 9.0 / 5.0 + 32.0)
//!     .establish()?;
//! binding.subscribe();
//!
//! celsius.set(100.0)?;
//! assert_eq!(fahrenheit.get(), 212.0);
//! # Ok::<(), BindError>(())
//! ```

pub use tether_binder as binder;
pub use tether_core as core;

pub use tether_binder::{
    Bindable, BindableCell, Binder, BinderNode, BinderOptions, Context, ContextValue,
    ContextWrapper, NodeState, Teardown, ViewModel, destroy_with_children,
};
#[cfg(feature = "config")]
pub use tether_binder::ConfigError;
pub use tether_core::{
    BindError, Binding, BindingBuilder, BindingHandle, BindingScope, ByRef, Event, Flow,
    NotifyPropertyChanged, Observable, SharedBinding, Side, SideBuilder, SideId, Subscription,
    ValueChange,
};

/// The types and traits most bindings need.
pub mod prelude {
    pub use tether_binder::{
        Bindable, BindableCell, Binder, BinderNode, BinderOptions, Context, ContextValue,
        ContextWrapper, Teardown, ViewModel,
    };
    pub use tether_core::{
        BindError, Binding, BindingHandle, BindingScope, ByRef, Event, Flow,
        NotifyPropertyChanged, Observable, SharedBinding, Side, SideId,
    };
}
