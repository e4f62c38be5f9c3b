#![forbid(unsafe_code)]

//! Binding sides: resolved, readable/writable, optionally observable
//! property locations.
//!
//! A [`Side<T>`] is one end of a binding. It is described explicitly by the
//! caller through a [`SideBuilder`]: a getter, a setter, an optional owner,
//! and the change notifications the owner offers for the member. The
//! builder resolves all of this once; the side is immutable afterwards.
//!
//! # Change-source precedence
//!
//! A side may be offered several notification mechanisms. [`SideBuilder::build`]
//! keeps exactly one, in this order:
//!
//! 1. a property-changed broadcast (`Event<str>`), filtered by member name;
//! 2. a value-changed event of a change cell (`Event<ValueChange<T>>`);
//! 3. an event named `<member>_changed`, of any payload shape.
//!
//! Events offered under any other name are ignored. A side without a change
//! source is valid; it just cannot drive a propagation.
//!
//! # Invariants
//!
//! 1. A side is readable iff it has a getter and writable iff it has a
//!    setter. At least one of the two is present.
//! 2. A side used as an assignment target is writable; a side used as an
//!    assignment source is readable. Violations are setup errors.
//! 3. A handler built by [`Side::make_handler`] always matches the shape of
//!    the side's change source, so attaching it cannot fail.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{BindError, BoxError, HandlerResult};
use crate::event::{Event, HandlerId};
use crate::observable::{Observable, ValueChange};

type Getter<T> = Rc<dyn Fn() -> Result<T, BoxError>>;
type Setter<T> = Rc<dyn Fn(T) -> Result<(), BoxError>>;

/// Converts a value read from one side into the type of the other side.
pub(crate) type Adapter<U, T> = Rc<dyn Fn(U) -> Result<T, BoxError>>;

/// One compiled assignment from a source side into a target side.
pub(crate) type Assigner = Rc<dyn Fn() -> Result<(), BoxError>>;

/// Propagation action invoked when a change source fires.
pub(crate) type Action = Rc<dyn Fn() -> HandlerResult>;

/// Objects that broadcast "member changed" with the member's name.
pub trait NotifyPropertyChanged {
    /// The property-changed event.
    fn property_changed(&self) -> &Event<str>;
}

/// Name of the conventional change event for `member`.
#[must_use]
pub fn changed_event_name(member: &str) -> String {
    format!("{member}_changed")
}

/// Which notification mechanism a side resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeSourceKind {
    /// No change notification; the side can only be written or read on demand.
    None,
    /// Generic property-changed broadcast filtered by member name.
    PropertyChanged,
    /// Value-changed event of a change cell.
    ValueChanged,
    /// Conventionally named `<member>_changed` event.
    Named,
}

/// A `<member>_changed` event with its payload type erased.
#[derive(Clone)]
pub struct NamedEvent {
    name: String,
    connect: Rc<dyn Fn(Action) -> HandlerId>,
    disconnect: Rc<dyn Fn(HandlerId) -> bool>,
}

impl NamedEvent {
    /// Erase `event` so that any payload triggers the propagation action.
    pub fn new<P: ?Sized + 'static>(name: impl Into<String>, event: &Event<P>) -> Self {
        let connect_to = event.clone();
        let disconnect_from = event.clone();
        Self {
            name: name.into(),
            connect: Rc::new(move |action: Action| connect_to.connect(move |_: &P| action())),
            disconnect: Rc::new(move |id| disconnect_from.disconnect(id)),
        }
    }

    /// The event's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NamedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedEvent").field("name", &self.name).finish()
    }
}

enum ChangeSource<T> {
    None,
    PropertyChanged(Event<str>),
    ValueChanged(Event<ValueChange<T>>),
    Named(NamedEvent),
}

impl<T> ChangeSource<T> {
    fn kind(&self) -> ChangeSourceKind {
        match self {
            Self::None => ChangeSourceKind::None,
            Self::PropertyChanged(_) => ChangeSourceKind::PropertyChanged,
            Self::ValueChanged(_) => ChangeSourceKind::ValueChanged,
            Self::Named(_) => ChangeSourceKind::Named,
        }
    }
}

/// A subscription handler shaped for one kind of change source.
pub(crate) enum Handler<T> {
    PropertyChanged(Rc<dyn Fn(&str) -> HandlerResult>),
    ValueChanged(Rc<dyn Fn(&ValueChange<T>) -> HandlerResult>),
    Any(Action),
}

struct SideInner<T> {
    member: String,
    target: Option<Weak<dyn Any>>,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
    source: ChangeSource<T>,
}

/// One end of a binding. Clones share the same resolved side.
pub struct Side<T> {
    inner: Rc<SideInner<T>>,
}

impl<T> Clone for Side<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Side<T> {
    /// Disconnect a handler previously returned by [`attach`](Self::attach).
    pub(crate) fn detach(&self, id: HandlerId) -> bool {
        match &self.inner.source {
            ChangeSource::None => false,
            ChangeSource::PropertyChanged(event) => event.disconnect(id),
            ChangeSource::ValueChanged(event) => event.disconnect(id),
            ChangeSource::Named(named) => (named.disconnect)(id),
        }
    }
}

impl<T> fmt::Debug for Side<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Side")
            .field("member", &self.inner.member)
            .field("readable", &self.inner.getter.is_some())
            .field("writable", &self.inner.setter.is_some())
            .field("source", &self.inner.source.kind())
            .finish()
    }
}

impl<T: 'static> Side<T> {
    /// Start describing a side for `member`.
    pub fn builder(member: impl Into<String>) -> SideBuilder<T> {
        SideBuilder::new(member)
    }

    /// Describe `member` of an owner that broadcasts property changes.
    ///
    /// The owner is held weakly; reading through a dropped owner fails with
    /// a propagation error.
    pub fn property<O: NotifyPropertyChanged + 'static>(
        owner: &Rc<O>,
        member: impl Into<String>,
        get: impl Fn(&O) -> T + 'static,
    ) -> SideBuilder<T> {
        let member = member.into();
        let weak = Rc::downgrade(owner);
        let name = member.clone();
        SideBuilder::new(member)
            .owner(owner)
            .notify_via(owner.property_changed())
            .try_getter(move || {
                weak.upgrade()
                    .map(|owner| get(owner.as_ref()))
                    .ok_or_else(|| BindError::UnresolvableTarget { member: name.clone() })
            })
    }

    /// The member name this side was built for.
    #[must_use]
    pub fn member(&self) -> &str {
        &self.inner.member
    }

    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.inner.getter.is_some()
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// The change source this side resolved to.
    #[must_use]
    pub fn change_source(&self) -> ChangeSourceKind {
        self.inner.source.kind()
    }

    /// Whether the owner declared at build time is still alive.
    ///
    /// Sides built without an owner report `true`.
    #[must_use]
    pub fn has_live_target(&self) -> bool {
        self.inner
            .target
            .as_ref()
            .is_none_or(|target| target.strong_count() > 0)
    }

    /// Read the current value.
    pub fn read(&self) -> Result<T, BindError> {
        let getter = self
            .inner
            .getter
            .as_ref()
            .ok_or_else(|| BindError::unreadable(&self.inner.member))?;
        getter().map_err(BindError::propagation)
    }

    /// Write a value.
    pub fn write(&self, value: T) -> Result<(), BindError> {
        let setter = self
            .inner
            .setter
            .as_ref()
            .ok_or_else(|| BindError::unwritable(&self.inner.member))?;
        setter(value).map_err(BindError::propagation)
    }

    /// Whether both values are clones of the same side.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Compile an assignment from `from` into this side through `adapter`.
    pub(crate) fn assigner<U: 'static>(
        &self,
        from: &Side<U>,
        adapter: Adapter<U, T>,
    ) -> Result<Assigner, BindError> {
        let setter = self
            .inner
            .setter
            .clone()
            .ok_or_else(|| BindError::unwritable(&self.inner.member))?;
        let getter = from
            .inner
            .getter
            .clone()
            .ok_or_else(|| BindError::unreadable(&from.inner.member))?;
        Ok(Rc::new(move || setter(adapter(getter()?)?)))
    }

    /// Wrap `action` in a handler matching this side's change source.
    pub(crate) fn make_handler(&self, action: Action) -> Result<Handler<T>, BindError> {
        let handler = match &self.inner.source {
            ChangeSource::None => {
                return Err(BindError::UnknownChangeSource {
                    member: self.inner.member.clone(),
                });
            }
            ChangeSource::PropertyChanged(_) => {
                let member = self.inner.member.clone();
                Handler::PropertyChanged(Rc::new(move |name: &str| {
                    if name == member { action() } else { Ok(()) }
                }))
            }
            ChangeSource::ValueChanged(_) => {
                Handler::ValueChanged(Rc::new(move |_: &ValueChange<T>| action()))
            }
            ChangeSource::Named(_) => Handler::Any(action),
        };
        Ok(handler)
    }

    /// Connect `handler` to the change source.
    pub(crate) fn attach(&self, handler: &Handler<T>) -> Option<HandlerId> {
        match (&self.inner.source, handler) {
            (ChangeSource::PropertyChanged(event), Handler::PropertyChanged(h)) => {
                Some(event.connect_rc(Rc::clone(h)))
            }
            (ChangeSource::ValueChanged(event), Handler::ValueChanged(h)) => {
                Some(event.connect_rc(Rc::clone(h)))
            }
            (ChangeSource::Named(named), Handler::Any(h)) => Some((named.connect)(Rc::clone(h))),
            _ => None,
        }
    }
}

impl<T: Clone + PartialEq + 'static> Side<T> {
    /// The value member of a change cell, observed through its value-changed
    /// event.
    #[must_use]
    pub fn observable(cell: &Observable<T>) -> Self {
        let reader = cell.clone();
        let writer = cell.clone();
        Self {
            inner: Rc::new(SideInner {
                member: "value".to_owned(),
                target: Some(cell.downgrade_any()),
                getter: Some(Rc::new(move || Ok(reader.get()))),
                setter: Some(Rc::new(move |value| {
                    writer.set(value).map(drop).map_err(BoxError::from)
                })),
                source: ChangeSource::ValueChanged(cell.changed().clone()),
            }),
        }
    }
}

/// Identity adapter, available only when `U` and `T` are the same type.
pub(crate) fn identity<U: 'static, T: 'static>() -> Option<Adapter<U, T>> {
    if TypeId::of::<U>() != TypeId::of::<T>() {
        return None;
    }
    Some(Rc::new(|value: U| {
        let boxed: Box<dyn Any> = Box::new(value);
        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| BoxError::from("identity adapter applied across types"))
    }))
}

// ---------------------------------------------------------------------------
// SideBuilder
// ---------------------------------------------------------------------------

enum TargetRef {
    Unspecified,
    Resolved(Weak<dyn Any>),
    Missing,
}

/// Describes a [`Side`] before it is resolved.
pub struct SideBuilder<T> {
    member: String,
    target: TargetRef,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
    property_changed: Option<Event<str>>,
    value_changed: Option<Event<ValueChange<T>>>,
    named: Vec<NamedEvent>,
}

impl<T: 'static> SideBuilder<T> {
    /// Start describing `member`.
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            target: TargetRef::Unspecified,
            getter: None,
            setter: None,
            property_changed: None,
            value_changed: None,
            named: Vec::new(),
        }
    }

    /// Record the object the member belongs to. Held weakly.
    #[must_use]
    pub fn owner<O: 'static>(mut self, owner: &Rc<O>) -> Self {
        let owner: Rc<dyn Any> = Rc::clone(owner) as Rc<dyn Any>;
        self.target = TargetRef::Resolved(Rc::downgrade(&owner));
        self
    }

    /// Record the result of walking an access chain to the owner.
    ///
    /// `None` means the chain did not end in an object, and
    /// [`build`](Self::build) fails with `UnresolvableTarget`.
    #[must_use]
    pub fn owner_opt<O: 'static>(self, owner: Option<&Rc<O>>) -> Self {
        match owner {
            Some(owner) => self.owner(owner),
            None => Self {
                target: TargetRef::Missing,
                ..self
            },
        }
    }

    /// Make the side readable.
    #[must_use]
    pub fn getter(self, get: impl Fn() -> T + 'static) -> Self {
        Self {
            getter: Some(Rc::new(move || Ok(get()))),
            ..self
        }
    }

    /// Make the side readable through a getter that may fail.
    #[must_use]
    pub fn try_getter<E: Into<BoxError>>(
        self,
        get: impl Fn() -> Result<T, E> + 'static,
    ) -> Self {
        Self {
            getter: Some(Rc::new(move || get().map_err(Into::into))),
            ..self
        }
    }

    /// Make the side writable.
    #[must_use]
    pub fn setter(self, set: impl Fn(T) + 'static) -> Self {
        Self {
            setter: Some(Rc::new(move |value| {
                set(value);
                Ok(())
            })),
            ..self
        }
    }

    /// Make the side writable through a setter that may fail.
    #[must_use]
    pub fn try_setter<E: Into<BoxError>>(
        self,
        set: impl Fn(T) -> Result<(), E> + 'static,
    ) -> Self {
        Self {
            setter: Some(Rc::new(move |value| set(value).map_err(Into::into))),
            ..self
        }
    }

    /// Offer a property-changed broadcast as change source.
    #[must_use]
    pub fn notify_via(self, event: &Event<str>) -> Self {
        Self {
            property_changed: Some(event.clone()),
            ..self
        }
    }

    /// Offer a change cell's value-changed event as change source.
    #[must_use]
    pub fn value_changed_via(self, event: &Event<ValueChange<T>>) -> Self {
        Self {
            value_changed: Some(event.clone()),
            ..self
        }
    }

    /// Offer a named event of any payload as change source.
    ///
    /// Only an event named `<member>_changed` is used.
    #[must_use]
    pub fn event<P: ?Sized + 'static>(mut self, name: impl Into<String>, event: &Event<P>) -> Self {
        self.named.push(NamedEvent::new(name, event));
        self
    }

    /// Resolve the side.
    pub fn build(self) -> Result<Side<T>, BindError> {
        let target = match self.target {
            TargetRef::Unspecified => None,
            TargetRef::Resolved(weak) if weak.strong_count() > 0 => Some(weak),
            TargetRef::Resolved(_) | TargetRef::Missing => {
                return Err(BindError::UnresolvableTarget {
                    member: self.member,
                });
            }
        };
        if self.getter.is_none() && self.setter.is_none() {
            return Err(BindError::UnresolvableTarget {
                member: self.member,
            });
        }

        let conventional = changed_event_name(&self.member);
        let source = if let Some(event) = self.property_changed {
            ChangeSource::PropertyChanged(event)
        } else if let Some(event) = self.value_changed {
            ChangeSource::ValueChanged(event)
        } else if let Some(named) = self.named.into_iter().find(|n| n.name == conventional) {
            ChangeSource::Named(named)
        } else {
            ChangeSource::None
        };
        tracing::trace!(
            member = %self.member,
            source = ?source.kind(),
            readable = self.getter.is_some(),
            writable = self.setter.is_some(),
            "side resolved"
        );

        Ok(Side {
            inner: Rc::new(SideInner {
                member: self.member,
                target,
                getter: self.getter,
                setter: self.setter,
                source,
            }),
        })
    }
}

impl<T> fmt::Debug for SideBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideBuilder")
            .field("member", &self.member)
            .field("named", &self.named)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct Person {
        name: RefCell<String>,
        changed: Event<str>,
    }

    impl NotifyPropertyChanged for Person {
        fn property_changed(&self) -> &Event<str> {
            &self.changed
        }
    }

    fn person(name: &str) -> Rc<Person> {
        Rc::new(Person {
            name: RefCell::new(name.to_owned()),
            changed: Event::new(),
        })
    }

    fn fire_count(side: &Side<String>) -> (Rc<Cell<u32>>, Handler<String>) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let handler = side
            .make_handler(Rc::new(move || {
                h.set(h.get() + 1);
                Ok(())
            }))
            .unwrap();
        (hits, handler)
    }

    #[test]
    fn side_without_accessors_is_unresolvable() {
        let err = Side::<i32>::builder("ghost").build().unwrap_err();
        assert!(matches!(err, BindError::UnresolvableTarget { member } if member == "ghost"));
    }

    #[test]
    fn missing_owner_is_unresolvable() {
        let err = Side::<i32>::builder("age")
            .owner_opt::<Person>(None)
            .getter(|| 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, BindError::UnresolvableTarget { .. }));
    }

    #[test]
    fn dropped_owner_is_unresolvable() {
        let p = person("x");
        let builder = Side::<i32>::builder("age").owner(&p).getter(|| 1);
        drop(p);
        assert!(matches!(
            builder.build(),
            Err(BindError::UnresolvableTarget { .. })
        ));
    }

    #[test]
    fn capabilities_follow_accessors() {
        let read_only = Side::builder("r").getter(|| 1).build().unwrap();
        assert!(read_only.is_readable());
        assert!(!read_only.is_writable());
        assert!(matches!(
            read_only.write(2),
            Err(BindError::UnwritableOrUnreadableSide { .. })
        ));

        let store = Rc::new(Cell::new(0));
        let s = Rc::clone(&store);
        let write_only = Side::builder("w").setter(move |v| s.set(v)).build().unwrap();
        assert!(write_only.is_writable());
        assert!(!write_only.is_readable());
        write_only.write(5).unwrap();
        assert_eq!(store.get(), 5);
        assert!(write_only.read().is_err());
        assert_eq!(write_only.change_source(), ChangeSourceKind::None);
    }

    #[test]
    fn property_changed_wins_over_other_sources() {
        let cell = Observable::new(String::new());
        let named = Event::<()>::new();
        let p = person("ann");
        let side = Side::property(&p, "name", |p: &Person| p.name.borrow().clone())
            .value_changed_via(cell.changed())
            .event("name_changed", &named)
            .build()
            .unwrap();
        assert_eq!(side.change_source(), ChangeSourceKind::PropertyChanged);
        assert_eq!(side.read().unwrap(), "ann");
    }

    #[test]
    fn property_handler_filters_by_member() {
        let p = person("ann");
        let side = Side::property(&p, "name", |p: &Person| p.name.borrow().clone())
            .build()
            .unwrap();
        let (hits, handler) = fire_count(&side);
        let id = side.attach(&handler).unwrap();

        p.changed.emit("age").unwrap();
        assert_eq!(hits.get(), 0);
        p.changed.emit("name").unwrap();
        assert_eq!(hits.get(), 1);

        assert!(side.detach(id));
        p.changed.emit("name").unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn value_changed_beats_named_event() {
        let cell = Observable::new(String::new());
        let named = Event::<()>::new();
        let c = cell.clone();
        let side = Side::builder("value")
            .getter(move || c.get())
            .event("value_changed", &named)
            .value_changed_via(cell.changed())
            .build()
            .unwrap();
        assert_eq!(side.change_source(), ChangeSourceKind::ValueChanged);
    }

    #[test]
    fn named_event_follows_convention() {
        let wrong = Event::<u8>::new();
        let right = Event::<(u32, String)>::new();
        let side = Side::builder("title")
            .getter(String::new)
            .event("on_title", &wrong)
            .event("title_changed", &right)
            .build()
            .unwrap();
        assert_eq!(side.change_source(), ChangeSourceKind::Named);

        let (hits, handler) = fire_count(&side);
        side.attach(&handler).unwrap();
        wrong.emit(&1).unwrap();
        assert_eq!(hits.get(), 0);
        right.emit(&(3, "any payload".into())).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unmatched_named_event_leaves_no_source() {
        let other = Event::<()>::new();
        let side = Side::<String>::builder("title")
            .getter(String::new)
            .event("subtitle_changed", &other)
            .build()
            .unwrap();
        assert_eq!(side.change_source(), ChangeSourceKind::None);
        assert!(matches!(
            side.make_handler(Rc::new(|| Ok(()))),
            Err(BindError::UnknownChangeSource { member }) if member == "title"
        ));
    }

    #[test]
    fn observable_side_reads_writes_and_observes() {
        let cell = Observable::new(String::from("a"));
        let side = Side::observable(&cell);
        assert_eq!(side.member(), "value");
        assert_eq!(side.change_source(), ChangeSourceKind::ValueChanged);
        assert!(side.has_live_target());

        let (hits, handler) = fire_count(&side);
        side.attach(&handler).unwrap();
        side.write("b".into()).unwrap();
        assert_eq!(cell.get(), "b");
        assert_eq!(side.read().unwrap(), "b");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn property_side_fails_after_owner_drop() {
        let p = person("ann");
        let side = Side::property(&p, "name", |p: &Person| p.name.borrow().clone())
            .build()
            .unwrap();
        drop(p);
        assert!(!side.has_live_target());
        assert!(matches!(side.read(), Err(BindError::Propagation { .. })));
    }

    #[test]
    fn assigner_requires_capabilities() {
        let read_only = Side::builder("r").getter(|| 1).build().unwrap();
        let other = Side::builder("o").getter(|| 2).build().unwrap();
        let adapter = identity::<i32, i32>().unwrap();
        assert!(matches!(
            read_only.assigner(&other, adapter),
            Err(BindError::UnwritableOrUnreadableSide { member, access: crate::error::Access::Write }) if member == "r"
        ));
    }

    #[test]
    fn identity_only_for_same_type() {
        assert!(identity::<i32, i32>().is_some());
        assert!(identity::<i32, i64>().is_none());
        let id = identity::<String, String>().unwrap();
        assert_eq!(id("x".into()).unwrap(), "x");
    }
}
