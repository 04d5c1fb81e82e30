mod common;

use reconciler::{Component, Lanes, Node, SetState, host};
use scheduler::{ManualClock, PriorityLevel};
use std::cell::RefCell;
use std::rc::Rc;

type SetterSlot = Rc<RefCell<Option<SetState<i64>>>>;

/// Leaf that costs 2ms of clock time per render.
fn slow(clock: &ManualClock) -> Component {
    let clock = clock.clone();
    Component::new("Slow", move |_scope, props| {
        clock.advance_ms(2);
        let label = props.value::<&'static str>().copied().unwrap_or_default();
        Ok(host("span").attr("id", label).build())
    })
}

/// A counter followed by five slow leaves.
fn app(clock: &ManualClock, slot: &SetterSlot) -> Component {
    let slow = slow(clock);
    let slot = Rc::clone(slot);
    Component::new("App", move |scope, _props| {
        let (count, set) = scope.use_state(|| 0i64)?;
        *slot.borrow_mut() = Some(set);
        let mut children = vec![Node::text(count.to_string())];
        for label in ["a", "b", "c", "d", "e"] {
            children.push(slow.element().key(label).value(label).build());
        }
        Ok(host("div").children(children).build())
    })
}

fn setter(slot: &SetterSlot) -> SetState<i64> {
    slot.borrow().clone().unwrap()
}

#[test]
fn resumed_render_matches_an_uninterrupted_one() {
    let slot = SetterSlot::default();

    let (mut reference, clock, container) = common::engine();
    let root = reference.mount(container);
    reference.render(root, app(&clock, &slot).element().build()).unwrap();
    reference.run_microtasks().unwrap();
    let expected = reference.host().snapshot(container);
    assert_eq!(expected, "#root(div(\"0\",span#a,span#b,span#c,span#d,span#e))");

    let (mut engine, clock, container) = common::engine();
    let root = engine.mount(container);
    let tree = app(&clock, &slot).element().build();
    engine
        .run_with_priority(PriorityLevel::Normal, |engine| engine.render(root, tree))
        .unwrap();
    assert_eq!(engine.pending_lanes(root).unwrap(), Lanes::DEFAULT);

    // One slice is not enough for 10ms of rendering.
    assert!(engine.run_macrotask().unwrap());
    assert!(engine.is_rendering());
    assert_eq!(engine.commit_count(), 0);
    assert_eq!(engine.host().snapshot(container), "#root");

    engine.run_until_idle().unwrap();
    assert!(!engine.is_rendering());
    assert_eq!(engine.commit_count(), 1);
    assert_eq!(engine.last_commit().unwrap().lane, Lanes::DEFAULT);
    assert_eq!(engine.host().snapshot(container), expected);
}

#[test]
fn sync_update_preempts_a_suspended_render() {
    let slot = SetterSlot::default();
    let (mut engine, clock, container) = common::engine();
    let root = engine.mount(container);
    engine.render(root, app(&clock, &slot).element().build()).unwrap();
    engine.run_microtasks().unwrap();
    assert_eq!(engine.commit_count(), 1);

    let set = setter(&slot);
    engine.run_with_priority(PriorityLevel::Normal, |_| set.set(1));
    assert!(engine.run_macrotask().unwrap());
    assert!(engine.is_rendering(), "the default-lane render should have yielded");

    // Outside any priority scope updates are synchronous.
    set.update(|count| count + 10);
    engine.run_microtasks().unwrap();
    let stats = engine.last_commit().unwrap();
    assert_eq!(stats.lane, Lanes::SYNC);
    assert_eq!(engine.commit_count(), 2);
    // The skipped default update is not visible yet; the half-built tree never was.
    assert_eq!(
        engine.host().snapshot(container),
        "#root(div(\"10\",span#a,span#b,span#c,span#d,span#e))"
    );
    assert_eq!(engine.pending_lanes(root).unwrap(), Lanes::DEFAULT);

    // Replaying in order: set(1), then +10.
    engine.run_until_idle().unwrap();
    assert_eq!(engine.commit_count(), 3);
    assert_eq!(engine.last_commit().unwrap().lane, Lanes::DEFAULT);
    assert_eq!(
        engine.host().snapshot(container),
        "#root(div(\"11\",span#a,span#b,span#c,span#d,span#e))"
    );
    assert!(engine.pending_lanes(root).unwrap().is_empty());
}

#[test]
fn same_lane_update_restarts_the_suspended_render() {
    let slot = SetterSlot::default();
    let (mut engine, clock, container) = common::engine();
    let root = engine.mount(container);
    engine.render(root, app(&clock, &slot).element().build()).unwrap();
    engine.run_microtasks().unwrap();

    let set = setter(&slot);
    engine.run_with_priority(PriorityLevel::Normal, |_| set.set(1));
    engine.run_macrotask().unwrap();
    assert!(engine.is_rendering());

    engine.run_with_priority(PriorityLevel::Normal, |_| set.update(|count| count + 5));
    engine.run_until_idle().unwrap();
    assert_eq!(engine.commit_count(), 2, "both updates land in one commit");
    assert_eq!(
        engine.host().snapshot(container),
        "#root(div(\"6\",span#a,span#b,span#c,span#d,span#e))"
    );
}

#[test]
fn continuous_input_gets_its_own_lane() {
    let (mut engine, _clock, container) = common::engine();
    let root = engine.mount(container);
    engine
        .run_with_priority(PriorityLevel::UserBlocking, |engine| {
            engine.render(root, host("p").child("moved").build())
        })
        .unwrap();
    assert_eq!(engine.pending_lanes(root).unwrap(), Lanes::INPUT_CONTINUOUS);

    engine.run_microtasks().unwrap();
    assert_eq!(engine.commit_count(), 0, "only the sync lane is flushed from microtasks");

    engine.run_until_idle().unwrap();
    assert_eq!(engine.last_commit().unwrap().lane, Lanes::INPUT_CONTINUOUS);
    assert_eq!(engine.host().snapshot(container), "#root(p(\"moved\"))");
}
