#![forbid(unsafe_code)]

//! Error taxonomy for binding setup and value propagation.
//!
//! # Failure Modes
//!
//! | Variant | Raised by | When |
//! |---------|-----------|------|
//! | `UnresolvableTarget` | [`SideBuilder::build`] | no accessor, or the owner is gone |
//! | `UnwritableOrUnreadableSide` | [`BindingBuilder::establish`] | flow needs an access the side lacks |
//! | `AdapterRequired` | [`BindingBuilder::establish`] | sides differ in type and no adapter was given |
//! | `UnknownChangeSource` | [`Binding::bind`] | a side that must be observed has no change source |
//! | `Propagation` | `invalidate`, change dispatch | a getter, adapter or setter failed |
//!
//! Setup errors abort the one binding being established. Propagation errors
//! surface from whatever triggered the propagation; nothing is retried or
//! rolled back.
//!
//! [`SideBuilder::build`]: crate::side::SideBuilder::build
//! [`BindingBuilder::establish`]: crate::binding::BindingBuilder::establish
//! [`Binding::bind`]: crate::binding::Binding::bind

use std::fmt;

use crate::binding::Flow;

/// Boxed failure raised by user-supplied getters, setters and adapters.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result of an event handler or a propagation step.
pub type HandlerResult = Result<(), BindError>;

/// The access a flow demanded from a side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("readable"),
            Self::Write => f.write_str("writable"),
        }
    }
}

/// Direction of an assignment between the two sides of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Values flow from side A into side B.
    AToB,
    /// Values flow from side B into side A.
    BToA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AToB => f.write_str("A to B"),
            Self::BToA => f.write_str("B to A"),
        }
    }
}

/// Errors from establishing bindings and propagating values.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The owner of a member could not be resolved.
    #[error("cannot resolve the object that owns `{member}`")]
    UnresolvableTarget { member: String },

    /// A flow needs read or write access that the side does not offer.
    #[error("side `{member}` is not {access}")]
    UnwritableOrUnreadableSide { member: String, access: Access },

    /// Differently typed sides were bound without the needed adapter.
    #[error("an adapter from {direction} is required for a {flow:?} binding")]
    AdapterRequired { direction: Direction, flow: Flow },

    /// A side that must be observed offers no change notification.
    #[error("cannot determine a change source for `{member}`")]
    UnknownChangeSource { member: String },

    /// A live propagation failed.
    #[error("value propagation failed: {cause}")]
    Propagation {
        #[source]
        cause: BoxError,
    },
}

impl BindError {
    /// Wrap a failure raised during propagation.
    ///
    /// A `Propagation` error coming back from a downstream binding is
    /// returned as is, so the chain always ends at the original failure.
    #[must_use]
    pub fn propagation(cause: BoxError) -> Self {
        match cause.downcast::<BindError>() {
            Ok(err) => match *err {
                err @ Self::Propagation { .. } => err,
                other => Self::Propagation {
                    cause: Box::new(other),
                },
            },
            Err(cause) => Self::Propagation { cause },
        }
    }

    /// Whether this error happened while establishing a binding.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        !matches!(self, Self::Propagation { .. })
    }

    pub(crate) fn unreadable(member: &str) -> Self {
        Self::UnwritableOrUnreadableSide {
            member: member.to_owned(),
            access: Access::Read,
        }
    }

    pub(crate) fn unwritable(member: &str) -> Self {
        Self::UnwritableOrUnreadableSide {
            member: member.to_owned(),
            access: Access::Write,
        }
    }
}
