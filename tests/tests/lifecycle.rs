//! Session lifecycle: hot deploy, stateless runs, errors, events and
//! closing.

use ember_tests::prelude::*;
use pretty_assertions::assert_eq;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

fn key_join(calls: &CallCounter) -> RuleBuilder {
    RuleBuilder::new("match keys")
        .fact("$a", "A")
        .fact("$b", "B")
        .condition_with("$a.key == $b.key", &["$a.key", "$b.key"], 1.0, calls.equals())
}

// ========== TEST: hot_deployed_alpha_rule_sees_committed_facts ==========
#[test]
fn test_hot_deployed_alpha_rule_sees_committed_facts() {
    let knowledge = knowledge().unwrap();
    let mut session = knowledge.new_session().unwrap();
    session
        .insert_all([Order::new(1, 50), Order::new(2, 150), Order::new(3, 200)])
        .unwrap();
    assert_eq!(session.fire().unwrap().activations_fired, 0);

    session.add_rule(large_orders("large", 100)).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(stats.activations_fired, 2);
    assert_eq!(session.fire().unwrap().cycles, 0);
    assert_eq!(session.rules().count(), 1);
    assert_eq!(knowledge.rule_count(), 0);
}

// ========== TEST: hot_deployed_join_evaluates_once ==========
#[test]
fn test_hot_deployed_join_evaluates_once() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    session.insert_all([B { key: 1 }, B { key: 2 }]).unwrap();
    session.fire().unwrap();

    // WHEN the join is deployed against committed facts
    session.add_rule(key_join(&calls)).unwrap();
    assert_eq!(calls.count(), 2);
    let stats = session.fire().unwrap();

    // THEN the existing match fires without evaluating again
    assert_eq!(stats.activations_fired, 1);
    assert_eq!(calls.count(), 2);

    // And later facts are joined incrementally.
    session.insert(A { key: 2 }).unwrap();
    assert_eq!(session.fire().unwrap().activations_fired, 1);
    assert_eq!(calls.count(), 4);
}

// ========== TEST: hot_deploy_rejects_duplicate_names ==========
#[test]
fn test_hot_deploy_rejects_duplicate_names() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(large_orders("large", 100)).unwrap();
    let mut session = knowledge.new_session().unwrap();

    let err = session.add_rule(large_orders("large", 10)).unwrap_err();

    assert!(matches!(err, SessionError::Rule(RuleError::DuplicateRule { .. })));
    assert_eq!(session.rules().count(), 1);
}

// ========== TEST: stateless_session_visits_remaining_facts ==========
#[test]
fn test_stateless_session_visits_remaining_facts() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(large_orders("large", 100)).unwrap();
    let mut session = knowledge.new_stateless_session().unwrap();
    session
        .insert_all([Order::new(1, 50), Order::new(2, 150), Order::new(3, 200)])
        .unwrap();

    let mut visited = Vec::new();
    let stats = session
        .fire_with(|_, object| visited.push(object.downcast_ref::<Order>().map(|o| o.id)))
        .unwrap();

    assert_eq!(stats.activations_fired, 2);
    assert_eq!(visited, vec![Some(1), Some(2), Some(3)]);
}

// ========== TEST: failing_alpha_condition_is_wrapped ==========
#[test]
fn test_failing_alpha_condition_is_wrapped() {
    let knowledge = knowledge().unwrap();
    knowledge
        .add_rule(
            RuleBuilder::new("fragile")
                .fact("$o", "Order")
                .condition_with(
                    "$o.amount > limit",
                    &["$o.amount"],
                    1.0,
                    Predicate::fallible(|_| Err("limit unavailable".into())),
                ),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(Order::new(1, 10)).unwrap();

    let err = session.fire().unwrap_err();

    match err {
        SessionError::Evaluation(EvaluationError::Condition { source_text, args, cause }) => {
            assert_eq!(source_text, "$o.amount > limit");
            assert_eq!(args, vec![Value::Int(10)]);
            assert_eq!(cause.to_string(), "limit unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ========== TEST: failing_join_condition_is_wrapped ==========
#[test]
fn test_failing_join_condition_is_wrapped() {
    let knowledge = knowledge().unwrap();
    knowledge
        .add_rule(
            RuleBuilder::new("fragile join")
                .fact("$a", "A")
                .fact("$b", "B")
                .condition_with(
                    "$a.key ~ $b.key",
                    &["$a.key", "$b.key"],
                    1.0,
                    Predicate::fallible(|_| Err("no comparator".into())),
                ),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    session.insert(B { key: 2 }).unwrap();

    let err = session.fire().unwrap_err();

    assert!(matches!(
        err,
        SessionError::Evaluation(EvaluationError::Condition { ref source_text, .. })
            if source_text == "$a.key ~ $b.key"
    ));
}

// ========== TEST: failed_evaluation_is_retried_on_next_fire ==========
#[test]
fn test_failed_evaluation_is_retried_on_next_fire() {
    // GIVEN a join that fails on its first test, declared ahead of a
    // healthy join over the same facts
    let knowledge = knowledge().unwrap();
    let failed = Arc::new(AtomicBool::new(false));
    let flag = failed.clone();
    knowledge
        .add_rule(
            RuleBuilder::new("fragile")
                .fact("$a", "A")
                .fact("$b", "B")
                .condition_with(
                    "$a.key ~ $b.key",
                    &["$a.key", "$b.key"],
                    1.0,
                    Predicate::fallible(move |v| {
                        if flag.swap(true, Ordering::SeqCst) {
                            Ok(v[0] == v[1])
                        } else {
                            Err("comparator warming up".into())
                        }
                    }),
                ),
        )
        .unwrap();
    let pairs = Arc::new(AtomicUsize::new(0));
    let counter = pairs.clone();
    knowledge
        .add_rule(
            RuleBuilder::new("pairs")
                .fact("$a", "A")
                .fact("$b", "B")
                .condition("$a.key == $b.key", &["$a.key", "$b.key"], |v| v[0] == v[1])
                .execute(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    session.insert(B { key: 1 }).unwrap();
    assert!(session.fire().is_err());
    assert!(failed.load(Ordering::SeqCst));

    // WHEN another matching fact arrives and the session fires again
    session.insert(B { key: 1 }).unwrap();
    let stats = session.fire().unwrap();

    // THEN the facts of the failed cycle are matched as well
    assert_eq!(pairs.load(Ordering::SeqCst), 2);
    assert_eq!(stats.activations_fired, 4);
    assert_eq!(session.fire().unwrap().cycles, 0);
}

// ========== TEST: failed_evaluation_alone_is_retried ==========
#[test]
fn test_failed_evaluation_alone_is_retried() {
    let knowledge = knowledge().unwrap();
    let failed = Arc::new(AtomicBool::new(false));
    let flag = failed.clone();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    knowledge
        .add_rule(
            RuleBuilder::new("flaky")
                .fact("$o", "Order")
                .condition_with(
                    "$o.amount > 100",
                    &["$o.amount"],
                    1.0,
                    Predicate::fallible(move |v| {
                        if flag.swap(true, Ordering::SeqCst) {
                            Ok(v[0].gt(&Value::Int(100)))
                        } else {
                            Err("not ready".into())
                        }
                    }),
                )
                .execute(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(Order::new(1, 150)).unwrap();
    assert!(session.fire().is_err());

    // Nothing new is pending, but the failed cycle still is.
    let stats = session.fire().unwrap();

    assert_eq!(stats.cycles, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

// ========== TEST: failing_action_is_wrapped ==========
#[test]
fn test_failing_action_is_wrapped() {
    let knowledge = knowledge().unwrap();
    knowledge
        .add_rule(large_orders("explode", 100).execute(|_| Err("boom".into())))
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    let handle = session.insert(Order::new(1, 150)).unwrap().unwrap();

    let err = session.fire().unwrap_err();

    match err {
        SessionError::Evaluation(EvaluationError::Action { rule, facts, cause }) => {
            assert_eq!(rule, "explode");
            assert_eq!(facts, vec![handle]);
            assert_eq!(cause.to_string(), "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
    // The failed cycle was committed; nothing is left to do.
    assert_eq!(session.fire().unwrap().cycles, 0);
}

// ========== TEST: lifecycle_events_reach_template_subscribers ==========
#[test]
fn test_lifecycle_events_reach_template_subscribers() {
    let knowledge = knowledge().unwrap();
    knowledge
        .add_rule(large_orders("note", 100).execute(|ctx| {
            ctx.insert(Note { text: "seen".to_string() })?;
            Ok(())
        }))
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::SessionCreated,
        EventKind::RuleDeployed,
        EventKind::CycleCompleted,
        EventKind::SessionFired,
        EventKind::SessionClosed,
    ] {
        let seen = seen.clone();
        knowledge
            .events()
            .subscribe(kind, Dispatch::Sync, move |event| seen.lock().push(event.kind()));
    }

    let mut session = knowledge.new_session().unwrap();
    session.insert(Order::new(1, 150)).unwrap();
    let stats = session.fire().unwrap();
    session.close();

    let kinds = seen.lock().clone();
    let count = |kind| kinds.iter().filter(|k| **k == kind).count();
    assert_eq!(stats.cycles, 2);
    assert_eq!(count(EventKind::SessionCreated), 1);
    assert_eq!(count(EventKind::RuleDeployed), 1);
    assert_eq!(count(EventKind::CycleCompleted), 2);
    assert_eq!(count(EventKind::SessionFired), 1);
    assert_eq!(kinds.last(), Some(&EventKind::SessionClosed));
}

// ========== TEST: evaluation_events_report_condition_tests ==========
#[test]
fn test_evaluation_events_report_condition_tests() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    knowledge.add_rule(key_join(&calls)).unwrap();
    let mut session = knowledge.new_session().unwrap();
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    session.events().subscribe(EventKind::Evaluation, Dispatch::Sync, move |event| {
        if let Event::Evaluation { rule, condition, result, .. } = event {
            sink.lock().push((rule.clone(), condition.clone(), *result));
        }
    });

    session.insert(A { key: 1 }).unwrap();
    session.insert_all([B { key: 1 }, B { key: 2 }]).unwrap();
    session.fire().unwrap();

    let mut results = results.lock().clone();
    results.sort();
    let condition = "$a.key == $b.key".to_string();
    assert_eq!(
        results,
        vec![
            ("match keys".to_string(), condition.clone(), false),
            ("match keys".to_string(), condition, true),
        ]
    );
}

// ========== TEST: async_subscriber_receives_events ==========
#[test]
fn test_async_subscriber_receives_events() {
    let knowledge = knowledge().unwrap();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    knowledge
        .events()
        .subscribe(EventKind::SessionFired, Dispatch::Async, move |event| {
            if let Event::SessionFired { stats, .. } = event {
                let _ = tx.lock().send(*stats);
            }
        });

    let mut session = knowledge.new_session().unwrap();
    session.insert(Order::new(1, 10)).unwrap();
    let stats = session.fire().unwrap();

    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, stats);
}

// ========== TEST: fire_async_returns_the_session ==========
#[test]
fn test_fire_async_returns_the_session() {
    let knowledge = knowledge().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    knowledge
        .add_rule(large_orders("large", 100).execute(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session
        .insert_all([Order::new(1, 50), Order::new(2, 150), Order::new(3, 200)])
        .unwrap();

    let (session, result) = session.fire_async().join().unwrap();

    assert_eq!(result.unwrap().activations_fired, 2);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(session.fact_count(), 3);
}

// ========== TEST: closed_session_rejects_operations ==========
#[test]
fn test_closed_session_rejects_operations() {
    let knowledge = knowledge().unwrap();
    let mut session = knowledge.new_session().unwrap();
    let handle = session.insert(Order::new(1, 10)).unwrap().unwrap();
    let id = session.id();

    session.close();

    assert!(session.is_closed());
    assert!(matches!(
        session.insert(Order::new(2, 10)),
        Err(SessionError::SessionClosed { id: closed }) if closed == id
    ));
    assert!(matches!(session.delete(handle), Err(SessionError::SessionClosed { .. })));
    assert!(matches!(session.fire(), Err(SessionError::SessionClosed { .. })));
    // Queries still read the last state.
    assert_eq!(session.fact_count(), 1);
}

// ========== TEST: sessions_get_distinct_ids ==========
#[test]
fn test_sessions_get_distinct_ids() {
    let knowledge = knowledge().unwrap();
    let first = knowledge.new_session().unwrap();
    let second = knowledge.new_session().unwrap();

    assert_ne!(first.id(), second.id());
}

// ========== TEST: session_replaces_alpha_condition ==========
#[test]
fn test_session_replaces_alpha_condition() {
    // GIVEN a rule for orders above 100
    let knowledge = knowledge().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    knowledge
        .add_rule(large_orders("large", 100).execute(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(Order::new(1, 150)).unwrap();
    session.fire().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // WHEN the session raises the threshold to 1000
    session
        .replace_condition(
            "large",
            "$o.amount > 100",
            Predicate::new(|v| v[0].gt(&Value::Int(1000))),
        )
        .unwrap();
    session.insert_all([Order::new(2, 500), Order::new(3, 2000)]).unwrap();
    session.fire().unwrap();

    // THEN only the order above the new threshold fires
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    // And sessions from the template keep the old threshold.
    let mut fresh = knowledge.new_session().unwrap();
    fresh.insert(Order::new(4, 500)).unwrap();
    fresh.fire().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 3);
}

// ========== TEST: session_replaces_join_condition ==========
#[test]
fn test_session_replaces_join_condition() {
    let knowledge = knowledge().unwrap();
    let calls = CallCounter::new();
    knowledge.add_rule(key_join(&calls)).unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(A { key: 1 }).unwrap();
    session.insert(B { key: 1 }).unwrap();
    assert_eq!(session.fire().unwrap().activations_fired, 1);

    session
        .replace_condition(
            "match keys",
            "$a.key == $b.key",
            Predicate::new(|v| v[1] == Value::Int(3)),
        )
        .unwrap();
    session.insert_all([B { key: 2 }, B { key: 3 }]).unwrap();
    let stats = session.fire().unwrap();

    // Only A(1) x B(3) passes the new test; the counting one is gone.
    assert_eq!(stats.activations_fired, 1);
    assert_eq!(calls.count(), 1);
}

// ========== TEST: replace_condition_rejects_unknown_names ==========
#[test]
fn test_replace_condition_rejects_unknown_names() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(large_orders("large", 100)).unwrap();
    let mut session = knowledge.new_session().unwrap();

    let rule = session
        .replace_condition("small", "$o.amount > 100", Predicate::new(|_| true))
        .unwrap_err();
    let condition = session
        .replace_condition("large", "$o.amount < 100", Predicate::new(|_| true))
        .unwrap_err();

    assert!(matches!(rule, SessionError::Rule(RuleError::UnknownRule { .. })));
    assert!(matches!(condition, SessionError::Rule(RuleError::UnknownCondition { .. })));
}
