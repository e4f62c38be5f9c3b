#![forbid(unsafe_code)]

//! Propagation properties of bindings between change cells.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use tether::prelude::*;
use tether_harness::{init_test_logging, strategies};

fn cells(a: i32, b: i32) -> (Observable<i32>, Observable<i32>) {
    (Observable::new(a), Observable::new(b))
}

fn bind(a: &Observable<i32>, b: &Observable<i32>, flow: Flow) -> Binding<i32, i32> {
    let binding = Side::observable(a)
        .to(&Side::observable(b))
        .flow(flow)
        .establish()
        .unwrap();
    binding.subscribe();
    binding
}

fn counter(cell: &Observable<i32>) -> (Rc<Cell<u32>>, tether::Subscription) {
    let fired = Rc::new(Cell::new(0));
    let f = Rc::clone(&fired);
    let sub = cell.subscribe(move |_| f.set(f.get() + 1));
    (fired, sub)
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn two_way_between_numeric_cells() {
    init_test_logging();
    let (a, b) = cells(0, 0);
    let binding = Side::observable(&a)
        .to(&Side::observable(&b))
        .establish()
        .unwrap();
    let (a_fired, _sa) = counter(&a);
    let (b_fired, _sb) = counter(&b);

    a.set_silent(5);
    binding.invalidate(SideId::A).unwrap();
    assert_eq!(b.get(), 5);

    binding.subscribe();
    b.set(7).unwrap();
    assert_eq!(a.get(), 7);
    assert_eq!(b.get(), 7);
    // One write into B by invalidate, one by the caller; one write into A.
    assert_eq!(b_fired.get(), 2);
    assert_eq!(a_fired.get(), 1, "no third propagation back into A");
}

#[test]
fn writing_a_with_b_observed_does_not_loop() {
    init_test_logging();
    let (a, b) = cells(0, 0);
    let binding = Side::observable(&a)
        .to(&Side::observable(&b))
        .adapt_ab(|v| v + 100)
        .adapt_ba(|v| v - 100)
        .establish()
        .unwrap();
    binding.subscribe();
    let (a_fired, _sa) = counter(&a);
    let (b_fired, _sb) = counter(&b);

    a.set(1).unwrap();
    assert_eq!((a.get(), b.get()), (1, 101));
    assert_eq!((a_fired.get(), b_fired.get()), (1, 1));
}

#[test]
fn once_applies_the_first_change_only() {
    init_test_logging();
    let (a, b) = cells(0, 0);
    let binding = bind(&a, &b, Flow::Once);
    binding.invalidate(SideId::B).unwrap();

    b.set(1).unwrap();
    assert_eq!(a.get(), 1);
    for value in 2..6 {
        b.set(value).unwrap();
        assert_eq!(a.get(), 1);
    }
}

#[test]
fn mixed_value_types_need_adapters() {
    let count = Observable::new(3_u32);
    let label = Observable::new(String::new());
    let err = Side::observable(&count)
        .to(&Side::observable(&label))
        .establish()
        .unwrap_err();
    assert!(matches!(err, BindError::AdapterRequired { .. }));
    assert!(err.is_setup());

    let binding = Side::observable(&count)
        .to(&Side::observable(&label))
        .flow(Flow::OneWay)
        .adapt_ba(|s: String| s.len() as u32)
        .establish()
        .unwrap();
    binding.subscribe();
    label.set("four".into()).unwrap();
    assert_eq!(count.get(), 4);
}

#[test]
fn scope_owns_bindings_until_dropped() {
    let (a, b) = cells(0, 0);
    {
        let mut scope = BindingScope::new();
        scope
            .establish(Side::observable(&a).to(&Side::observable(&b)))
            .unwrap();
        b.set(2).unwrap();
        assert_eq!(a.get(), 2);
    }
    b.set(3).unwrap();
    assert_eq!(a.get(), 2);
    assert_eq!(b.subscriber_count(), 0);
}

#[test]
fn dropped_bindings_leave_no_handlers_behind() {
    let (a, b) = cells(0, 0);
    for flow in [Flow::OneWay, Flow::TwoWay, Flow::Reverse, Flow::Once] {
        for _ in 0..10 {
            let _binding = bind(&a, &b, flow);
        }
    }
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 0);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn two_way_applies_the_configured_adapter(writes in strategies::writes()) {
        let a = Observable::new(0_i32);
        let b = Observable::new(0_i64);
        let binding = Side::observable(&a)
            .to(&Side::observable(&b))
            .adapt_ab(|v: i32| i64::from(v) * 3)
            .adapt_ba(|v: i64| (v / 3) as i32)
            .establish()
            .unwrap();
        binding.subscribe();

        for (write_a, value) in writes {
            if write_a {
                if a.set(value).unwrap() {
                    prop_assert_eq!(b.get(), i64::from(value) * 3);
                }
            } else if b.set(i64::from(value)).unwrap() {
                prop_assert_eq!(a.get(), value / 3);
                prop_assert_eq!(b.get(), i64::from(value));
            }
        }
    }

    #[test]
    fn one_way_only_carries_b_into_a(writes in strategies::writes()) {
        let (a, b) = cells(0, 0);
        let _binding = bind(&a, &b, Flow::OneWay);

        for (write_a, value) in writes {
            let before_b = b.get();
            if write_a {
                a.set(value).unwrap();
                prop_assert_eq!(b.get(), before_b);
            } else if b.set(value).unwrap() {
                prop_assert_eq!(a.get(), value);
            }
        }
    }

    #[test]
    fn once_never_moves_a_after_the_first_trigger(writes in strategies::writes()) {
        let (a, b) = cells(0, 0);
        let binding = bind(&a, &b, Flow::Once);
        binding.invalidate(SideId::B).unwrap();

        let mut first: Option<i32> = None;
        for (_, value) in writes {
            if b.set(value).unwrap() && first.is_none() {
                first = Some(value);
            }
            prop_assert_eq!(a.get(), first.unwrap_or(0));
        }
    }

    #[test]
    fn every_flow_settles_without_runaway_writes(
        flow in strategies::flow(),
        writes in strategies::writes(),
    ) {
        let (a, b) = cells(0, 0);
        let _binding = bind(&a, &b, flow);
        let (a_fired, _sa) = counter(&a);
        let (b_fired, _sb) = counter(&b);

        let total = writes.len() as u32;
        for (write_a, value) in writes {
            let cell = if write_a { &a } else { &b };
            cell.set(value).unwrap();
        }
        // Each write causes at most one write on each side.
        prop_assert!(a_fired.get() <= total);
        prop_assert!(b_fired.get() <= total);
    }
}
