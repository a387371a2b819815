//! Incremental matching across fire cycles: only changes are evaluated,
//! and inserts, updates and deletes keep activations consistent.

use ember_tests::prelude::*;
use pretty_assertions::assert_eq;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn key_join(knowledge: &Knowledge, calls: &CallCounter, log: &FireLog) {
    let log = log.clone();
    knowledge
        .add_rule(
            RuleBuilder::new("match keys")
                .fact("$a", "A")
                .fact("$b", "B")
                .condition_with("$a.key == $b.key", &["$a.key", "$b.key"], 1.0, calls.equals())
                .execute(move |ctx| {
                    let a = ctx.get::<A>("$a")?.key;
                    let b = ctx.get::<B>("$b")?.key;
                    log.push(format!("{}={}", a, b));
                    Ok(())
                }),
        )
        .unwrap();
}

// ========== TEST: committed_combinations_not_reevaluated ==========
#[test]
fn test_committed_combinations_not_reevaluated() {
    // GIVEN A(1), A(2) and B(3) committed in a first fire
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    let log = FireLog::new();
    key_join(&knowledge, &calls, &log);
    let mut session = knowledge.new_session().unwrap();
    session.insert_all([A { key: 1 }, A { key: 2 }]).unwrap();
    session.insert(B { key: 3 }).unwrap();
    let first = session.fire().unwrap();
    assert_eq!(calls.count(), 2);
    assert_eq!(first.activations_fired, 0);

    // WHEN B(1) arrives
    session.insert(B { key: 1 }).unwrap();
    let second = session.fire().unwrap();

    // THEN only the new B is joined against the committed A facts
    assert_eq!(calls.count(), 4);
    assert_eq!(second.activations_fired, 1);
    assert_eq!(log.entries(), vec!["1=1".to_string()]);
}

// ========== TEST: fact_joining_known_key_skips_evaluation ==========
#[test]
fn test_fact_joining_known_key_skips_evaluation() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    let log = FireLog::new();
    key_join(&knowledge, &calls, &log);
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    session.insert(B { key: 1 }).unwrap();
    session.fire().unwrap();
    assert_eq!(calls.count(), 1);

    // A second B with the same key lands in the committed row.
    session.insert(B { key: 1 }).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(calls.count(), 1);
    assert_eq!(stats.activations_fired, 1);
    assert_eq!(log.len(), 2);
}

// ========== TEST: retract_and_reinsert ==========
#[test]
fn test_retract_and_reinsert() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    let log = FireLog::new();
    key_join(&knowledge, &calls, &log);
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    let b = session.insert(B { key: 1 }).unwrap().unwrap();
    session.fire().unwrap();

    // WHEN the only B is retracted
    assert!(session.delete(b).unwrap());
    let after_delete = session.fire().unwrap();

    // THEN nothing fires and the fact is gone
    assert_eq!(after_delete.activations_fired, 0);
    assert!(session.get_fact(b).is_none());
    assert_eq!(session.fact_count(), 1);
    assert!(!session.delete(b).unwrap());

    // WHEN a new B with the same key arrives, it is joined again
    session.insert(B { key: 1 }).unwrap();
    let after_insert = session.fire().unwrap();
    assert_eq!(after_insert.activations_fired, 1);
    assert_eq!(calls.count(), 2);
}

// ========== TEST: delete_then_insert_same_key_in_one_cycle ==========
#[test]
fn test_delete_then_insert_same_key_in_one_cycle() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    let log = FireLog::new();
    key_join(&knowledge, &calls, &log);
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    let b = session.insert(B { key: 1 }).unwrap().unwrap();
    session.fire().unwrap();

    // The row for key 1 empties and regains a fact before the cycle runs.
    session.delete(b).unwrap();
    session.insert(B { key: 1 }).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(stats.activations_fired, 1);
    assert_eq!(calls.count(), 1);

    // The revived row stays joinable.
    session.insert(A { key: 1 }).unwrap();
    let again = session.fire().unwrap();
    assert_eq!(again.activations_fired, 1);
}

// ========== TEST: update_moves_fact_in_and_out_of_matches ==========
#[test]
fn test_update_moves_fact_in_and_out_of_matches() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(large_orders("large", 100)).unwrap();
    let mut session = knowledge.new_session().unwrap();
    let handle = session.insert(Order::new(1, 50)).unwrap().unwrap();

    let mut fired = Vec::new();
    fired.push(session.fire().unwrap().activations_fired);
    for amount in [150, 20, 300] {
        assert!(session.update(handle, Order::new(1, amount)).unwrap());
        fired.push(session.fire().unwrap().activations_fired);
    }

    assert_eq!(fired, vec![0, 1, 0, 1]);
    assert_eq!(session.get_fact_as::<Order>(handle).unwrap().amount, 300);
    assert_eq!(session.fact_count(), 1);
}

// ========== TEST: update_changes_join_key ==========
#[test]
fn test_update_changes_join_key() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    let log = FireLog::new();
    key_join(&knowledge, &calls, &log);
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 2 }).unwrap();
    let b = session.insert(B { key: 1 }).unwrap().unwrap();
    assert_eq!(session.fire().unwrap().activations_fired, 0);

    session.update(b, B { key: 2 }).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(stats.activations_fired, 1);
    assert_eq!(log.entries(), vec!["2=2".to_string()]);
}

// ========== TEST: update_of_unknown_handle_or_wrong_type ==========
#[test]
fn test_update_of_unknown_handle_or_wrong_type() {
    let knowledge = knowledge().unwrap();
    let mut session = knowledge.new_session().unwrap();
    let handle = session.insert(Order::new(1, 10)).unwrap().unwrap();
    session.delete(handle).unwrap();
    assert!(!session.update(handle, Order::new(1, 20)).unwrap());

    let live = session.insert(Order::new(2, 10)).unwrap().unwrap();
    let err = session.update(live, A { key: 1 }).unwrap_err();
    assert!(matches!(err, SessionError::Memory(_)));
}

// ========== TEST: same_object_inserted_twice ==========
#[test]
fn test_same_object_inserted_twice() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(large_orders("large", 100)).unwrap();
    let mut session = knowledge.new_session().unwrap();
    let order = Arc::new(Order::new(1, 150));

    let first = session.insert_object(FactObject::from_arc(order.clone())).unwrap();
    let second = session.insert_object(FactObject::from_arc(order)).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(first, second);
    assert_eq!(session.fact_count(), 1);
    assert_eq!(stats.activations_fired, 1);
}

// ========== TEST: every_fact_matched_once ==========
#[test]
fn test_every_fact_matched_once() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(RuleBuilder::new("all orders").fact("$o", "Order")).unwrap();
    let mut session = knowledge.new_session().unwrap();

    let handles = session.insert_all((0..25).map(|i| Order::new(i, i * 10))).unwrap();
    let first = session.fire().unwrap();
    let second = session.fire().unwrap();

    assert_eq!(handles.len(), 25);
    assert_eq!(first.activations_fired, 25);
    assert_eq!(second, FireStats {
        fixpoint_reached: true,
        ..FireStats::default()
    });
    assert_eq!(session.facts_of("Order").unwrap().len(), 25);
}

// ==================== Property ====================

#[derive(Debug, Clone)]
struct Batch {
    inserts: Vec<(bool, i64)>,
    deletes: Vec<usize>,
}

fn batch() -> impl Strategy<Value = Batch> {
    (
        prop::collection::vec((any::<bool>(), 0i64..3), 0..4),
        prop::collection::vec(0usize..8, 0..3),
    )
        .prop_map(|(inserts, deletes)| Batch { inserts, deletes })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Facts are never updated, so each matching (A, B) pair must fire
    // exactly once: in the first cycle where both are in memory.
    #[test]
    fn prop_each_matching_pair_fires_once(batches in prop::collection::vec(batch(), 1..6)) {
        let knowledge = knowledge().unwrap();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        knowledge
            .add_rule(
                RuleBuilder::new("match keys")
                    .fact("$a", "A")
                    .fact("$b", "B")
                    .condition("$a.key == $b.key", &["$a.key", "$b.key"], |v| v[0] == v[1])
                    .execute(move |ctx| {
                        sink.lock().push((ctx.handle("$a")?, ctx.handle("$b")?));
                        Ok(())
                    }),
            )
            .unwrap();
        let mut session = knowledge.new_session().unwrap();

        let mut alive: Vec<(FactHandle, bool, i64)> = Vec::new();
        let mut expected = BTreeSet::new();
        for batch in batches {
            for (is_a, key) in batch.inserts {
                let handle = if is_a {
                    session.insert(A { key }).unwrap()
                } else {
                    session.insert(B { key }).unwrap()
                };
                alive.push((handle.unwrap(), is_a, key));
            }
            for index in batch.deletes {
                if !alive.is_empty() {
                    let (handle, _, _) = alive.remove(index % alive.len());
                    session.delete(handle).unwrap();
                }
            }
            session.fire().unwrap();

            for (a, _, a_key) in alive.iter().filter(|f| f.1) {
                for (b, _, b_key) in alive.iter().filter(|f| !f.1) {
                    if a_key == b_key {
                        expected.insert((*a, *b));
                    }
                }
            }
        }

        let fired = fired.lock().clone();
        let distinct: BTreeSet<_> = fired.iter().copied().collect();
        prop_assert_eq!(fired.len(), distinct.len());
        prop_assert_eq!(distinct, expected);
    }
}
