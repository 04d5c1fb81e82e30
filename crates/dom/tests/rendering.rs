use dom::{DOM, DOMSubscriber, DOMUpdate, NodeKey};
use reconciler::{Component, Engine, EngineConfig, Node, RootId, SetState, host};
use scheduler::ManualClock;
use std::cell::RefCell;
use std::rc::Rc;

fn engine() -> (Engine<DOM>, RootId, NodeKey) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = Engine::with_clock(DOM::new(), Rc::new(ManualClock::new()), EngineConfig::default());
    let container = engine.host_mut().create_container("main").unwrap();
    engine.host_mut().take_batches();
    let root = engine.mount(container);
    (engine, root, container)
}

fn list(keys: &[&str]) -> Node {
    host("ul")
        .children(keys.iter().map(|key| host("li").key(*key).child(*key).build()))
        .build()
}

#[test]
fn counter_updates_in_one_turn_commit_one_batch() {
    let slot: Rc<RefCell<Option<SetState<i64>>>> = Rc::default();
    let setter_slot = Rc::clone(&slot);
    let counter = Component::new("Counter", move |scope, _props| {
        let (count, set) = scope.use_state(|| 0i64)?;
        *setter_slot.borrow_mut() = Some(set);
        Ok(host("div")
            .children([
                host("h1").child("Count").build(),
                host("span").attr("class", "count").child(count.to_string()).build(),
            ])
            .build())
    });
    let (mut engine, root, container) = engine();
    engine.render(root, counter.element().build()).unwrap();
    engine.run_microtasks().unwrap();
    let mount = engine.host_mut().take_batches();
    assert_eq!(mount.len(), 1);
    assert!(matches!(
        &mount[0][0],
        DOMUpdate::InsertElement { parent, tag, pos: 0, .. } if *parent == container && tag == "div"
    ));

    let set = slot.borrow().clone().unwrap();
    set.update(|count| count + 1);
    set.update(|count| count + 1);
    engine.run_microtasks().unwrap();
    let batches = engine.host_mut().take_batches();
    assert_eq!(batches.len(), 1);
    assert!(
        matches!(&batches[0][..], [DOMUpdate::UpdateText { text, .. }] if text == "2"),
        "unexpected batch {batches:?}"
    );
}

#[test]
fn same_key_with_a_new_type_is_replaced_without_carrying_attributes() {
    let (mut engine, root, container) = engine();
    engine
        .render(root, host("div").key("x").attr("class", "old").build())
        .unwrap();
    engine.run_microtasks().unwrap();
    let old = engine.host().children(container)[0];
    engine.host_mut().take_batches();

    engine.render(root, host("span").key("x").build()).unwrap();
    engine.run_microtasks().unwrap();
    let new = engine.host().children(container)[0];
    assert_eq!(
        engine.host_mut().take_batches(),
        [vec![
            DOMUpdate::RemoveNode { node: old },
            DOMUpdate::InsertElement {
                parent: container,
                node: new,
                tag: "span".into(),
                pos: 0,
            },
        ]]
    );
}

#[test]
fn reordering_keyed_children_moves_existing_nodes() {
    let (mut engine, root, container) = engine();
    engine.render(root, list(&["a", "b", "c"])).unwrap();
    engine.run_microtasks().unwrap();
    engine.host_mut().take_batches();
    let dom = engine.host();
    let ul = dom.children(container)[0];
    let items = dom.children(ul);

    engine.render(root, list(&["c", "b", "a"])).unwrap();
    engine.run_microtasks().unwrap();
    assert_eq!(
        engine.host_mut().take_batches(),
        [vec![
            DOMUpdate::MoveNode {
                parent: ul,
                node: items[1],
                pos: 2,
            },
            DOMUpdate::MoveNode {
                parent: ul,
                node: items[0],
                pos: 2,
            },
        ]]
    );
    assert_eq!(engine.host().children(ul), [items[2], items[1], items[0]]);
}

#[test]
fn duplicate_keys_do_not_leave_stale_nodes() {
    let (mut engine, root, container) = engine();
    let tree = || {
        host("ul")
            .children([
                host("li").key("a").child("1").build(),
                host("li").key("a").child("2").build(),
            ])
            .build()
    };
    engine.render(root, tree()).unwrap();
    engine.run_microtasks().unwrap();
    engine.render(root, tree()).unwrap();
    engine.run_microtasks().unwrap();

    let ul = engine.host().children(container)[0];
    let items = engine.host().children(ul);
    assert_eq!(items.len(), 2, "{:?}", engine.host());
    let texts: Vec<_> = items
        .iter()
        .map(|item| engine.host().subtree_json(engine.host().children(*item)[0])["text"].clone())
        .collect();
    assert_eq!(texts, ["1", "2"]);
}

#[test]
fn replaying_batches_mirrors_the_document() {
    let (mut engine, root, _container) = engine();
    let mut mirror = DOM::new();
    // The container batch was taken by the helper; rebuild it on the mirror.
    mirror
        .apply_update(DOMUpdate::InsertElement {
            parent: NodeKey::ROOT,
            node: engine.host().children(NodeKey::ROOT)[0],
            tag: "main".into(),
            pos: 0,
        })
        .unwrap();
    let mut replay = |engine: &mut Engine<DOM>| {
        for batch in engine.host_mut().take_batches() {
            for update in batch {
                mirror.apply_update(update).unwrap();
            }
        }
        assert_eq!(mirror.to_json_value(), engine.host().to_json_value());
    };

    let renders = [
        host("section")
            .attr("id", "s")
            .attr("class", "wide")
            .children([list(&["a", "b", "c", "d"]), Node::text("tail")])
            .build(),
        host("section")
            .attr("id", "s")
            .children([list(&["d", "a", "e", "c"]), Node::text("tail!")])
            .build(),
        host("section").attr("title", "t").child(list(&["e"])).build(),
        Node::Empty,
    ];
    for tree in renders {
        engine.render(root, tree).unwrap();
        engine.run_microtasks().unwrap();
        replay(&mut engine);
    }
    assert_eq!(mirror.len(), 2, "only the document and the container remain");
}
