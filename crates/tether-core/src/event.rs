#![forbid(unsafe_code)]

//! Single-threaded multicast events.
//!
//! An [`Event<A>`] holds an ordered list of handlers that receive `&A` when
//! the event is emitted. It is the one notification primitive every change
//! source in Tether is built on: the value-changed event of an
//! [`Observable`](crate::Observable), the property-changed broadcast of a
//! view model (`Event<str>`), a conventionally named `<member>_changed`
//! event of any payload shape, and the payload-less context-changed event
//! of a binder context (`Event<()>`).
//!
//! # Invariants
//!
//! 1. Handlers run in connection order.
//! 2. A handler disconnected while an emission is in progress does not run
//!    later in that emission.
//! 3. A handler connected while an emission is in progress first runs on the
//!    next emission.
//! 4. The first handler failure stops the emission and is returned from
//!    [`Event::emit`].
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Handler error | handler returned `Err` | remaining handlers skipped, error returned |
//! | Stale id | `disconnect` with an id already removed | returns `false` |
//! | Event dropped | last clone dropped while a `Subscription` lives | dropping the subscription is a no-op |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::HandlerResult;

/// Identifies one connected handler of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Shared handler closure stored by an [`Event`].
pub type HandlerFn<A> = Rc<dyn Fn(&A) -> HandlerResult>;

struct Registry<A: ?Sized> {
    next_id: u64,
    handlers: Vec<(HandlerId, HandlerFn<A>)>,
}

impl<A: ?Sized> Registry<A> {
    fn contains(&self, id: HandlerId) -> bool {
        self.handlers.iter().any(|(handler_id, _)| *handler_id == id)
    }
}

/// A multicast event. Clones share the same handler list.
pub struct Event<A: ?Sized> {
    registry: Rc<RefCell<Registry<A>>>,
}

impl<A: ?Sized> Clone for Event<A> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<A: ?Sized + 'static> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("handlers", &self.registry.borrow().handlers.len())
            .finish()
    }
}

impl<A: ?Sized> Event<A> {
    /// Remove a handler. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: HandlerId) -> bool {
        // The removed handler is dropped after the registry borrow ends.
        let removed = {
            let mut registry = self.registry.borrow_mut();
            let index = registry
                .handlers
                .iter()
                .position(|(handler_id, _)| *handler_id == id);
            index.map(|index| registry.handlers.remove(index))
        };
        removed.is_some()
    }

    /// Whether `id` is currently connected.
    #[must_use]
    pub fn is_connected(&self, id: HandlerId) -> bool {
        self.registry.borrow().contains(id)
    }

    /// Number of connected handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.borrow().handlers.len()
    }
}

impl<A: ?Sized + 'static> Event<A> {
    /// Create an event with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Connect a fallible handler. Keep the returned id to disconnect it.
    pub fn connect(&self, handler: impl Fn(&A) -> HandlerResult + 'static) -> HandlerId {
        self.connect_rc(Rc::new(handler))
    }

    /// Connect an already shared handler.
    ///
    /// Connecting the same `Rc` twice registers it twice.
    pub fn connect_rc(&self, handler: HandlerFn<A>) -> HandlerId {
        let mut registry = self.registry.borrow_mut();
        let id = HandlerId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.push((id, handler));
        id
    }

    /// Run every connected handler with `args`.
    ///
    /// The handler list is snapshotted first, so handlers may connect and
    /// disconnect freely, including on this same event.
    pub fn emit(&self, args: &A) -> HandlerResult {
        let snapshot = self.registry.borrow().handlers.clone();
        for (id, handler) in snapshot {
            if !self.is_connected(id) {
                continue;
            }
            handler(args)?;
        }
        Ok(())
    }

    /// Connect an infallible callback for as long as the returned guard lives.
    pub fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let id = self.connect(move |args| {
            callback(args);
            Ok(())
        });
        let registry: Weak<RefCell<Registry<A>>> = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                Event { registry }.disconnect(id);
            }
        })
    }

    /// Whether both values are clones of the same event.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.registry, &other.registry)
    }
}

/// RAII guard that disconnects a callback on drop.
#[must_use = "dropping a Subscription disconnects its callback"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Disconnect now instead of at drop.
    pub fn cancel(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Keep the callback connected for the lifetime of the event.
    pub fn forget(mut self) {
        self.release = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindError;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn(&i32) -> HandlerResult + 'static) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        (hits, move |_: &i32| {
            h.set(h.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn emit_reaches_every_handler_in_order() {
        let event = Event::<i32>::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let o = Rc::clone(&order);
            event.connect(move |v| {
                o.borrow_mut().push((tag, *v));
                Ok(())
            });
        }
        event.emit(&7).unwrap();
        assert_eq!(*order.borrow(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn disconnect_removes_handler() {
        let event = Event::<i32>::new();
        let (hits, handler) = counter();
        let id = event.connect(handler);
        assert!(event.disconnect(id));
        assert!(!event.disconnect(id));
        event.emit(&1).unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn handler_disconnected_mid_emit_is_skipped() {
        let event = Event::<i32>::new();
        let (hits, handler) = counter();
        let victim = Rc::new(Cell::new(None));
        let v = Rc::clone(&victim);
        let e = event.clone();
        event.connect(move |_| {
            if let Some(id) = v.get() {
                e.disconnect(id);
            }
            Ok(())
        });
        victim.set(Some(event.connect(handler)));

        event.emit(&1).unwrap();
        assert_eq!(hits.get(), 0);
        assert_eq!(event.handler_count(), 1);
    }

    #[test]
    fn handler_connected_mid_emit_waits_for_next_emit() {
        let event = Event::<i32>::new();
        let hits = Rc::new(Cell::new(0));
        let e = event.clone();
        let h = Rc::clone(&hits);
        let armed = Cell::new(false);
        event.connect(move |_| {
            if !armed.replace(true) {
                let h = Rc::clone(&h);
                e.connect(move |_| {
                    h.set(h.get() + 1);
                    Ok(())
                });
            }
            Ok(())
        });

        event.emit(&1).unwrap();
        assert_eq!(hits.get(), 0);
        event.emit(&2).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn first_error_stops_emission() {
        let event = Event::<i32>::new();
        event.connect(|_| Err(BindError::propagation("nope".into())));
        let (hits, handler) = counter();
        event.connect(handler);

        let err = event.emit(&1).unwrap_err();
        assert!(matches!(err, BindError::Propagation { .. }));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn subscription_guard_disconnects_on_drop() {
        let event = Event::<str>::new();
        let seen = Rc::new(RefCell::new(Vec::<String>::new()));
        {
            let s = Rc::clone(&seen);
            let _sub = event.subscribe(move |name| s.borrow_mut().push(name.to_owned()));
            event.emit("first").unwrap();
        }
        event.emit("second").unwrap();
        assert_eq!(*seen.borrow(), vec!["first".to_owned()]);
        assert_eq!(event.handler_count(), 0);
    }

    #[test]
    fn handler_owning_a_guard_releases_it_on_disconnect() {
        let event = Event::<()>::new();
        let inner = event.subscribe(|_| {});
        let id = event.connect(move |_| {
            let _keep = &inner;
            Ok(())
        });
        assert_eq!(event.handler_count(), 2);

        assert!(event.disconnect(id));
        assert_eq!(event.handler_count(), 0);
    }

    #[test]
    fn forgotten_subscription_stays_connected() {
        let event = Event::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        event.subscribe(move |_| h.set(h.get() + 1)).forget();
        event.emit(&()).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscription_outliving_event_is_harmless() {
        let event = Event::<i32>::new();
        let sub = event.subscribe(|_| {});
        drop(event);
        drop(sub);
    }

    #[test]
    fn clones_share_handlers() {
        let event = Event::<i32>::new();
        let other = event.clone();
        let (hits, handler) = counter();
        other.connect(handler);
        event.emit(&3).unwrap();
        assert_eq!(hits.get(), 1);
        assert!(event.ptr_eq(&other));
        assert!(!event.ptr_eq(&Event::new()));
    }
}
