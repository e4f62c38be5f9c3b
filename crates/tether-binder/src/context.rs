#![forbid(unsafe_code)]

//! Context contracts.
//!
//! - [`Context`]: anything a binder node can be scoped to. A context either
//!   offers a payload-less "context changed" event (the node then rebuilds
//!   itself when it fires) or it does not (the node's context is fixed).
//! - [`Teardown`]: objects with nested child contexts that must be destroyed
//!   when their owner goes away. [`destroy_with_children`] walks them
//!   depth-first.
//! - [`ContextValue`]: values storable in a
//!   [`ContextWrapper`](crate::ContextWrapper), and the children they imply.

use std::rc::Rc;

use tether_core::{ByRef, Event};

/// A value a binder node can be scoped to.
pub trait Context: Clone + 'static {
    /// The event raised when the context's value is replaced.
    ///
    /// `None` means the context never changes for the node's lifetime.
    fn context_changed(&self) -> Option<Event<()>> {
        None
    }
}

impl<X: ?Sized + 'static> Context for Rc<X> {}

impl<X: ?Sized + 'static> Context for ByRef<X> {}

/// An object owning child contexts that are destroyed along with it.
pub trait Teardown {
    /// The child contexts, in destruction order.
    fn children(&self) -> Vec<Rc<dyn Teardown>> {
        Vec::new()
    }

    /// Release whatever the object holds.
    fn destroy(&self) {}
}

/// Destroy every child of `context` depth-first, then `context` itself.
pub fn destroy_with_children(context: &dyn Teardown) {
    for child in context.children() {
        destroy_with_children(child.as_ref());
    }
    context.destroy();
}

/// A value storable in a context wrapper.
pub trait ContextValue: Clone + PartialEq + 'static {
    /// The children this value implies by itself.
    ///
    /// `Some` when the value is a context or a collection of contexts.
    /// `None` defers to the wrapper's derivation function.
    fn implied_children(&self) -> Option<Vec<Rc<dyn Teardown>>> {
        None
    }

    /// Whether this is the "no value" state, which implies no children.
    fn is_unset(&self) -> bool {
        false
    }
}

impl<X: Teardown + 'static> ContextValue for ByRef<X> {
    fn implied_children(&self) -> Option<Vec<Rc<dyn Teardown>>> {
        let child: Rc<dyn Teardown> = self.rc().clone();
        Some(vec![child])
    }
}

impl<X: Teardown + 'static> ContextValue for Vec<ByRef<X>> {
    fn implied_children(&self) -> Option<Vec<Rc<dyn Teardown>>> {
        Some(
            self.iter()
                .map(|item| {
                    let child: Rc<dyn Teardown> = item.rc().clone();
                    child
                })
                .collect(),
        )
    }
}

impl<V: ContextValue> ContextValue for Option<V> {
    fn implied_children(&self) -> Option<Vec<Rc<dyn Teardown>>> {
        self.as_ref().and_then(ContextValue::implied_children)
    }

    fn is_unset(&self) -> bool {
        self.is_none()
    }
}

macro_rules! plain_context_values {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ContextValue for $ty {
                fn is_unset(&self) -> bool {
                    *self == <$ty>::default()
                }
            }
        )*
    };
}

plain_context_values!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
);
