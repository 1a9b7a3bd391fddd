//! End-to-end tests over the public API.
//!
//! Tests cover:
//! - Building trees and evaluating them tick by tick
//! - Reference resolution, validation and relinking
//! - The task lifecycle against mock and simulated execution
//! - Observers, the node model and the catalog

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use tradecanvas::adapters::simulated_order_adapter::SimulatedOrderAdapter;
use tradecanvas::domain::builder::CanvasNodeBuilder;
use tradecanvas::domain::canvas_type::CanvasType;
use tradecanvas::domain::catalog::{builtin_entries, load_directory, CatalogEntry};
use tradecanvas::domain::function::FunctionOp;
use tradecanvas::domain::identity;
use tradecanvas::domain::model::{CanvasNodeModel, Coordinate, Snapshot};
use tradecanvas::domain::node::{CanvasNode, Slot};
use tradecanvas::domain::node_ref::NodeRef;
use tradecanvas::domain::observer::CanvasObserver;
use tradecanvas::domain::order::OrderStatus;
use tradecanvas::domain::order_tasks::{order_task, OrderPreset};
use tradecanvas::domain::reference::{find_referent, referent_string, relink};
use tradecanvas::domain::task::{Task, TaskEnvironment, TaskState};
use tradecanvas::domain::validator::validate;
use tradecanvas::domain::value::Value;

mod evaluation {
    use super::*;

    #[test]
    fn chain_yields_each_element_in_turn() {
        let root = CanvasNode::chain(vec![integer(123), integer(456)]);
        assert_eq!(
            tick_values(&root, 2),
            [Some(Value::Integer(123)), Some(Value::Integer(456))]
        );
    }

    #[test]
    fn forward_and_backward_references_repeat_the_referent() {
        let forward = CanvasNode::chain(vec![CanvasNode::reference("i1", CanvasType::Integer), integer(456)]);
        assert_eq!(
            tick_values(&forward, 2),
            [Some(Value::Integer(456)), Some(Value::Integer(456))]
        );

        let backward = CanvasNode::chain(vec![integer(123), CanvasNode::reference("i0", CanvasType::Integer)]);
        assert_eq!(
            tick_values(&backward, 2),
            [Some(Value::Integer(123)), Some(Value::Integer(123))]
        );
    }

    #[test]
    fn builder_edit_changes_evaluation() {
        let base = CanvasNode::chain(vec![integer(1), integer(2)]);
        let mut builder = CanvasNodeBuilder::new(&base);
        builder.replace(&path("i1"), &integer(7)).unwrap();
        let edited = builder.make();
        assert_eq!(tick_values(&edited, 2), [Some(Value::Integer(1)), Some(Value::Integer(7))]);
        assert_eq!(tick_values(&base, 2)[1], Some(Value::Integer(2)));
    }

    #[test]
    fn static_holds_a_rounded_price() {
        let price = CanvasNode::function(
            FunctionOp::Floor,
            vec![CanvasNode::constant(Value::Money(45.678)), integer(1)],
        )
        .unwrap();
        let held = CanvasNode::static_value(price);
        assert_eq!(held.canvas_type(), &CanvasType::Money);
        assert_eq!(
            tick_values(&held, 2),
            [Some(Value::Money(45.6)), Some(Value::Money(45.6))]
        );
    }

    #[test]
    fn filter_drops_values_while_closed() {
        let open = CanvasNode::chain(vec![
            CanvasNode::constant(Value::Boolean(true)),
            CanvasNode::constant(Value::Boolean(false)),
            CanvasNode::constant(Value::Boolean(true)),
        ]);
        let source = CanvasNode::chain(vec![integer(1), integer(2), integer(3)]);
        let filtered = CanvasNode::filter(open, source);
        assert!(validate(&filtered).is_empty());
        assert_eq!(
            tick_values(&filtered, 3),
            [Some(Value::Integer(1)), Some(Value::Integer(1)), Some(Value::Integer(3))]
        );
    }

    #[test]
    fn function_combines_constants() {
        let sum = CanvasNode::function(FunctionOp::Addition, vec![integer(40), integer(2)]).unwrap();
        assert_eq!(tick_values(&sum, 1), [Some(Value::Integer(42))]);
    }
}

mod references {
    use super::*;

    fn messages(root: &CanvasNode) -> Vec<String> {
        validate(root).iter().map(ToString::to_string).collect()
    }

    #[test]
    fn missing_referent_is_reported_with_its_path() {
        let root = CanvasNode::chain(vec![integer(1), CanvasNode::reference("missing", CanvasType::Integer)]);
        assert_eq!(messages(&root), ["i1: Reference \"missing\" not found."]);
    }

    #[test]
    fn self_reference_and_cycles_are_invalid() {
        let lone = CanvasNode::chain(vec![CanvasNode::reference("i0", CanvasType::Integer)]);
        assert_eq!(messages(&lone), ["i0: Reference refers to itself."]);

        let pair = CanvasNode::chain(vec![
            CanvasNode::reference("i1", CanvasType::Integer),
            CanvasNode::reference("i0", CanvasType::Integer),
        ]);
        assert_eq!(
            messages(&pair),
            ["i0: Reference is cyclic.", "i1: Reference is cyclic."]
        );
    }

    #[test]
    fn task_cycle_through_a_spawned_task_is_invalid() {
        let root = CanvasNode::aggregate(vec![
            CanvasNode::reference("i1", CanvasType::Task),
            CanvasNode::spawn(integer(1), CanvasNode::reference("<i0", CanvasType::Task)),
        ]);
        assert_eq!(
            messages(&root),
            ["i0: Reference is cyclic.", "i1/task: Reference is cyclic."]
        );
    }

    fn sizes(copy: CanvasNode) -> CanvasNode {
        CanvasNode::custom(
            "Sizes",
            CanvasType::Integer,
            vec![
                (Slot::new("quantity", CanvasType::Integer), integer(100)),
                (Slot::new("copy", CanvasType::Integer), copy),
            ],
        )
    }

    #[test]
    fn relink_repairs_a_reference_moved_deeper() {
        let original = sizes(CanvasNode::reference("quantity", CanvasType::Integer));
        let moved = sizes(CanvasNode::chain(vec![CanvasNode::reference("quantity", CanvasType::Integer)]));
        assert!(!validate(&moved).is_empty());

        let before = NodeRef::resolve(&original, &path("copy")).unwrap();
        let after = NodeRef::resolve(&moved, &path("copy/i0")).unwrap();
        let relinked = relink(&before, &after);
        assert!(validate(&relinked).is_empty());
        let reference = NodeRef::resolve(&relinked, &path("copy/i0")).unwrap();
        assert_eq!(referent_string(reference.node()), Some("<quantity"));
        assert_eq!(find_referent(&reference).unwrap().path(), path("quantity"));
        assert_eq!(tick_values(&relinked, 1), [Some(Value::Integer(100))]);
    }

    #[test]
    fn relink_keeps_the_original_referent_over_a_nearer_namesake() {
        let original = sizes(CanvasNode::reference("quantity", CanvasType::Integer));
        let moved = sizes(CanvasNode::spawn(
            CanvasNode::reference("quantity", CanvasType::Integer),
            CanvasNode::single_order_task(),
        ));
        let stale = NodeRef::resolve(&moved, &path("copy/trigger")).unwrap();
        assert_eq!(find_referent(&stale).unwrap().path(), path("copy/task/quantity"));

        let before = NodeRef::resolve(&original, &path("copy")).unwrap();
        let relinked = relink(&before, &stale);
        let reference = NodeRef::resolve(&relinked, &path("copy/trigger")).unwrap();
        assert_eq!(referent_string(reference.node()), Some("<quantity"));
        assert_eq!(find_referent(&reference).unwrap().path(), path("quantity"));
    }

    #[test]
    fn nested_reference_reaches_inside_a_custom_slot() {
        let root = CanvasNode::custom(
            "Pair",
            CanvasType::Integer,
            vec![
                (
                    Slot::new("sum", CanvasType::Integer),
                    CanvasNode::function(FunctionOp::Addition, vec![integer(40), integer(2)]).unwrap(),
                ),
                (
                    Slot::new("left", CanvasType::Integer),
                    CanvasNode::reference("sum/left", CanvasType::Integer),
                ),
            ],
        );
        assert!(validate(&root).is_empty());
        assert_eq!(tick_values(&root, 1), [Some(Value::Integer(40))]);
    }
}

mod task_lifecycle {
    use super::*;

    fn simulated_task(node: &CanvasNode, adapter: Rc<SimulatedOrderAdapter>) -> Task {
        Task::new(
            node,
            TaskEnvironment {
                execution: adapter,
                account: "DESK7".to_string(),
                market_data: None,
            },
        )
    }

    #[test]
    fn filled_order_completes() {
        let port = Rc::new(MockExecutionPort::new());
        let (task, states) = make_task(&order_task(&make_fields(100)).unwrap(), port.clone());
        assert_eq!(task.run(10), TaskState::Complete);
        assert_eq!(
            *states.borrow(),
            [TaskState::Initializing, TaskState::Active, TaskState::Complete]
        );
        assert_eq!(port.submitted.borrow()[0], make_fields(100));
    }

    #[test]
    fn rejected_order_fails() {
        let port = Rc::new(MockExecutionPort::with_status(OrderStatus::Rejected));
        let (task, _) = make_task(&order_task(&make_fields(100)).unwrap(), port);
        assert_eq!(task.run(10), TaskState::Failed);
        assert_eq!(task.value(), Some(Value::TaskState(TaskState::Failed)));
    }

    #[test]
    fn submit_error_fails_with_message() {
        let port = Rc::new(MockExecutionPort::new().with_submit_error("exchange down"));
        let (task, _) = make_task(&order_task(&make_fields(100)).unwrap(), port);
        assert_eq!(task.run(10), TaskState::Failed);
        let last = task.publisher().last().unwrap();
        assert!(last.message.unwrap().contains("exchange down"));
    }

    #[test]
    fn cancel_while_active_cancels_order() {
        let port = Rc::new(MockExecutionPort::with_status(OrderStatus::New));
        let (task, states) = make_task(&order_task(&make_fields(100)).unwrap(), port.clone());
        task.execute();
        task.commit();
        assert_eq!(task.state(), TaskState::Active);
        task.cancel();
        assert_eq!(task.run(10), TaskState::Canceled);
        assert_eq!(*port.canceled.borrow(), [1]);
        assert_eq!(states.borrow().last(), Some(&TaskState::Canceled));
    }

    #[test]
    fn value_tree_completes_with_last_value() {
        let port = Rc::new(MockExecutionPort::new());
        let (task, _) = make_task(&CanvasNode::chain(vec![integer(5), integer(6)]), port);
        assert_eq!(task.run(10), TaskState::Complete);
        assert_eq!(task.value(), Some(Value::Integer(6)));
    }

    #[test]
    fn simulated_execution_fills_after_delay() {
        let adapter = Rc::new(SimulatedOrderAdapter::new(3, None));
        let task = simulated_task(&order_task(&make_fields(100)).unwrap(), adapter.clone());
        task.execute();
        task.commit();
        task.commit();
        assert_eq!(task.state(), TaskState::Active);
        assert_eq!(task.run(10), TaskState::Complete);
        assert_eq!(adapter.submitted()[0].0, "DESK7");
    }

    #[test]
    fn simulated_rejection_fails_task() {
        let adapter = Rc::new(SimulatedOrderAdapter::new(1, Some(50)));
        let task = simulated_task(&order_task(&make_fields(100)).unwrap(), adapter);
        assert_eq!(task.run(10), TaskState::Failed);
    }

    #[test]
    fn aggregate_of_presets_completes() {
        let preset = OrderPreset::LimitBid.node().unwrap();
        let mut builder = CanvasNodeBuilder::new(&preset);
        builder
            .replace(&path("quantity"), &integer(10))
            .unwrap();
        let order = builder.make();
        let root = CanvasNode::aggregate(vec![order.clone(), order]);
        let port = Rc::new(MockExecutionPort::new());
        let (task, _) = make_task(&root, port.clone());
        assert_eq!(task.run(10), TaskState::Complete);
        assert_eq!(port.submitted.borrow().len(), 2);
    }
}

mod observers {
    use super::*;

    #[test]
    fn observer_scales_task_values() {
        let port = Rc::new(MockExecutionPort::new());
        let (task, _) = make_task(&CanvasNode::chain(vec![integer(3), integer(4)]), port);
        let doubled = CanvasNode::function(
            FunctionOp::Multiplication,
            vec![CanvasNode::reference("<target", CanvasType::Integer), integer(2)],
        )
        .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut observer = CanvasObserver::new(task.clone(), doubled, move |v: &Value| {
            sink.borrow_mut().push(v.clone());
        });
        assert!(observer.is_valid());
        task.execute();
        assert!(observer.poll());
        task.run(10);
        assert_eq!(*seen.borrow(), [Value::Integer(6), Value::Integer(8)]);
    }

    #[test]
    fn observer_reads_an_order_field() {
        let port = Rc::new(MockExecutionPort::new());
        let (task, _) = make_task(&order_task(&make_fields(10)).unwrap(), port);
        let doubled = CanvasNode::function(
            FunctionOp::Multiplication,
            vec![CanvasNode::reference("<target/quantity", CanvasType::Integer), integer(2)],
        )
        .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut observer = CanvasObserver::new(task.clone(), doubled, move |v: &Value| {
            sink.borrow_mut().push(v.clone());
        });
        assert!(observer.is_valid());
        assert_eq!(observer.dependencies().len(), 1);
        assert_eq!(observer.dependencies()[0].task_path, path("quantity"));
        task.execute();
        assert!(observer.poll());
        task.run(3);
        assert_eq!(seen.borrow().first(), Some(&Value::Integer(20)));
        assert_eq!(observer.value(), Some(Value::Integer(20)));
    }

    #[test]
    fn observer_before_execute_waits() {
        let port = Rc::new(MockExecutionPort::new());
        let (task, _) = make_task(&CanvasNode::chain(vec![integer(1)]), port);
        let mut observer = CanvasObserver::new(
            task.clone(),
            CanvasNode::reference("<target", CanvasType::Integer),
            |_: &Value| {},
        );
        assert!(!observer.poll());
        assert!(!observer.is_translated());
    }
}

mod model {
    use super::*;

    #[test]
    fn identities_follow_nodes_and_strip_cleanly() {
        let mut model = CanvasNodeModel::new();
        let at = Coordinate::new(1, 4);
        let tree = CanvasNode::chain(vec![integer(1), integer(2), integer(3)]);
        let stamped = model.add_root(at, &tree).clone();
        let third = identity::find_identity(stamped.child(2).unwrap()).unwrap();
        assert_eq!(model.find_identity(&third), Some((at, path("i2"))));
        assert_eq!(model.strip_identity(&stamped), tree);
    }

    #[test]
    fn snapshot_survives_json() {
        let mut model = CanvasNodeModel::new();
        model.add_root(Coordinate::new(0, 0), &CanvasNode::chain(vec![integer(1)]));
        model.add_root(Coordinate::new(0, 1), &OrderPreset::Market.node().unwrap());
        let snapshot = model.save_snapshot();
        let text = serde_json::to_string(&snapshot).unwrap();
        let restored: Snapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, snapshot);

        let mut other = CanvasNodeModel::with_model_id(model.model_id());
        other.restore(&restored);
        assert_eq!(other.roots().count(), 2);
    }
}

mod catalog {
    use super::*;

    #[test]
    fn saved_entries_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tree = CanvasNode::chain(vec![integer(1), integer(2)]);
        let entry = CatalogEntry::new("Counter", "icons/counter.svg", "Counts to two", &tree);
        entry.save(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_directory(dir.path()).unwrap();
        assert_eq!(loaded, vec![entry.clone()]);
        assert_eq!(identity::find_entry_uid(&loaded[0].node), Some(entry.uid));
    }

    #[test]
    fn builtin_presets_are_valid_programs() {
        let entries = builtin_entries();
        let limit = entries.iter().find(|e| e.name == "Limit Order").unwrap();
        assert!(validate(&limit.node).is_empty());
        assert_eq!(limit.node.canvas_type(), &CanvasType::Task);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn chain_of_constants_yields_every_value(values in prop::collection::vec(-1_000i64..1_000, 1..8)) {
            let root = CanvasNode::chain(values.iter().copied().map(integer).collect());
            let seen = tick_values(&root, values.len() as u64);
            let expected: Vec<Option<Value>> = values.iter().map(|v| Some(Value::Integer(*v))).collect();
            prop_assert_eq!(seen, expected);
        }

        #[test]
        fn builder_without_edits_is_identity(values in prop::collection::vec(any::<i64>(), 1..6)) {
            let root = CanvasNode::chain(values.into_iter().map(integer).collect());
            prop_assert_eq!(CanvasNodeBuilder::new(&root).make(), root);
        }

        #[test]
        fn clone_equals_original(values in prop::collection::vec(any::<i64>(), 1..6), hidden in any::<bool>()) {
            let root = CanvasNode::chain(values.into_iter().map(integer).collect()).set_visible(!hidden);
            let copy = root.clone();
            prop_assert_eq!(&copy, &root);
            prop_assert_eq!(copy.text(), root.text());
            prop_assert_eq!(copy.is_visible(), !hidden);
        }
    }
}
