#![forbid(unsafe_code)]

//! Reusable view-model base.
//!
//! Embed a [`ViewModel`] in a type, forward [`NotifyPropertyChanged`] to it,
//! and call [`notify`](ViewModel::notify) from setters. Bindings the view
//! model owns itself (as opposed to the ones it declares for a binder) are
//! registered with [`establish`](ViewModel::establish) and started together
//! by [`init_bindings`](ViewModel::init_bindings).

use std::cell::RefCell;
use std::fmt;

use tether_core::{
    BindError, Binding, BindingBuilder, Event, HandlerResult, NotifyPropertyChanged,
    SharedBinding, SideId,
};

use crate::context::Teardown;

/// Property-changed broadcast plus a list of owned bindings.
#[derive(Default)]
pub struct ViewModel {
    property_changed: Event<str>,
    bindings: RefCell<Vec<SharedBinding>>,
}

impl ViewModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that `member` changed.
    pub fn notify(&self, member: &str) -> HandlerResult {
        self.property_changed.emit(member)
    }

    /// Establish a binding owned by this view model.
    ///
    /// It is started by the next [`init_bindings`](Self::init_bindings).
    pub fn establish<A: 'static, B: 'static>(
        &self,
        builder: BindingBuilder<A, B>,
    ) -> Result<Binding<A, B>, BindError> {
        let binding = builder.establish()?;
        self.add_binding(binding.clone().shared());
        Ok(binding)
    }

    /// Take ownership of an already established binding.
    pub fn add_binding(&self, binding: SharedBinding) {
        self.bindings.borrow_mut().push(binding);
    }

    /// Bind every owned binding, invalidate them from side B, then subscribe.
    pub fn init_bindings(&self) -> Result<(), BindError> {
        let bindings = self.bindings.borrow().clone();
        for binding in &bindings {
            binding.bind()?;
        }
        for binding in &bindings {
            binding.invalidate(SideId::B)?;
        }
        for binding in &bindings {
            binding.subscribe();
        }
        Ok(())
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// Unbind and drop every owned binding.
    pub fn release(&self) {
        let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
        for binding in bindings {
            binding.unbind();
        }
    }
}

impl NotifyPropertyChanged for ViewModel {
    fn property_changed(&self) -> &Event<str> {
        &self.property_changed
    }
}

impl Teardown for ViewModel {
    /// Unbinds the owned bindings; [`init_bindings`](ViewModel::init_bindings)
    /// starts them again.
    fn destroy(&self) {
        let bindings = self.bindings.borrow().clone();
        for binding in bindings {
            binding.unbind();
        }
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("bindings", &self.bindings.borrow().len())
            .field("listeners", &self.property_changed.handler_count())
            .finish()
    }
}
