#![forbid(unsafe_code)]

//! Lifetime scope for bindings and callback subscriptions.
//!
//! A [`BindingScope`] collects the bindings and subscriptions created for one
//! logical owner (a view model, a screen) and tears them all down together.
//!
//! # Invariants
//!
//! 1. Every binding added to a scope is subscribed while held.
//! 2. `clear()` and drop unbind held bindings, then release subscriptions,
//!    both in reverse registration order.
//! 3. After `clear()` the scope is empty and reusable.

use std::fmt;

use crate::binding::{Binding, BindingBuilder, BindingHandle, SharedBinding, SideId};
use crate::error::BindError;
use crate::event::Subscription;
use crate::observable::Observable;

/// Owns bindings and subscriptions until dropped or cleared.
#[derive(Default)]
pub struct BindingScope {
    bindings: Vec<SharedBinding>,
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Subscribe `binding` and keep it until the scope is cleared.
    pub fn add(&mut self, binding: SharedBinding) -> &mut Self {
        binding.subscribe();
        self.bindings.push(binding);
        self
    }

    /// Establish, subscribe and hold a binding.
    ///
    /// Returns a handle to the binding for invalidation. Setup errors leave
    /// the scope unchanged.
    pub fn establish<A: 'static, B: 'static>(
        &mut self,
        builder: BindingBuilder<A, B>,
    ) -> Result<Binding<A, B>, BindError> {
        let binding = builder.establish()?;
        self.add(binding.clone().shared());
        Ok(binding)
    }

    /// Subscribe to a change cell within this scope.
    pub fn subscribe<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let sub = source.subscribe(callback);
        self.subscriptions.push(sub);
        self
    }

    /// Invalidate `side` on every held binding, stopping at the first error.
    pub fn invalidate(&self, side: SideId) -> Result<(), BindError> {
        self.bindings
            .iter()
            .try_for_each(|binding| binding.invalidate(side))
    }

    /// Number of held bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of held callback subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.subscriptions.is_empty()
    }

    /// Unbind and release everything now.
    pub fn clear(&mut self) {
        while let Some(binding) = self.bindings.pop() {
            binding.unbind();
        }
        while let Some(sub) = self.subscriptions.pop() {
            drop(sub);
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.bindings.len())
            .field("subscription_count", &self.subscriptions.len())
            .finish()
    }
}
