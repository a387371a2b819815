//! Agenda ordering, the fire loop and activation managers.

use ember_tests::prelude::*;
use pretty_assertions::assert_eq;

fn logging(name: &str, salience: i32, log: &FireLog) -> RuleBuilder {
    let log = log.clone();
    let entry = name.to_string();
    large_orders(name, 100).salience(salience).execute(move |_| {
        log.push(entry.clone());
        Ok(())
    })
}

fn count_up() -> RuleBuilder {
    RuleBuilder::new("count up").fact("$c", "Counter").execute(|ctx| {
        let n = ctx.get::<Counter>("$c")?.n;
        ctx.insert(Counter { n: n + 1 })?;
        Ok(())
    })
}

// ========== TEST: higher_salience_fires_first ==========
#[test]
fn test_higher_salience_fires_first() {
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    knowledge.add_rule(logging("low", 5, &log)).unwrap();
    knowledge.add_rule(logging("high", 10, &log)).unwrap();
    let mut session = knowledge.new_session().unwrap();

    session.insert(Order::new(1, 150)).unwrap();
    session.fire().unwrap();

    assert_eq!(log.entries(), vec!["high".to_string(), "low".to_string()]);
}

// ========== TEST: equal_salience_keeps_declaration_order ==========
#[test]
fn test_equal_salience_keeps_declaration_order() {
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    knowledge.add_rule(logging("first", 0, &log)).unwrap();
    knowledge.add_rule(logging("second", 0, &log)).unwrap();
    knowledge.add_rule(logging("third", 0, &log)).unwrap();
    let mut session = knowledge.new_session().unwrap();

    session.insert(Order::new(1, 150)).unwrap();
    session.fire().unwrap();

    assert_eq!(
        log.entries(),
        vec!["first".to_string(), "second".to_string(), "third".to_string()]
    );
}

// ========== TEST: actions_drive_further_cycles ==========
#[test]
fn test_actions_drive_further_cycles() {
    // GIVEN a rule that records a note for every large order
    let knowledge = knowledge().unwrap();
    knowledge
        .add_rule(large_orders("note large orders", 100).execute(|ctx| {
            let id = ctx.get::<Order>("$o")?.id;
            ctx.insert(Note { text: format!("order {}", id) })?;
            Ok(())
        }))
        .unwrap();
    let mut session = knowledge.new_session().unwrap();

    // WHEN one large order is fired
    session.insert(Order::new(7, 500)).unwrap();
    let stats = session.fire().unwrap();

    // THEN the note is committed by a second cycle, then the loop stops
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.activations_fired, 1);
    assert!(stats.fixpoint_reached);
    let notes = session.facts_of("Note").unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].1.downcast_ref::<Note>().unwrap().text, "order 7");
}

// ========== TEST: fire_without_changes_runs_no_cycle ==========
#[test]
fn test_fire_without_changes_runs_no_cycle() {
    let knowledge = knowledge().unwrap();
    let mut session = knowledge.new_session().unwrap();

    let stats = session.fire().unwrap();

    assert_eq!(stats, FireStats {
        fixpoint_reached: true,
        ..FireStats::default()
    });
}

// ========== TEST: cycle_limit_stops_runaway_rules ==========
#[test]
fn test_cycle_limit_stops_runaway_rules() {
    let knowledge = knowledge_with(Configuration::minimal().with_max_cycles(5)).unwrap();
    knowledge.add_rule(count_up()).unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(Counter { n: 0 }).unwrap();

    let err = session.fire().unwrap_err();

    assert!(matches!(err, SessionError::CycleLimitExceeded { limit: 5 }));
    // Five cycles committed, the sixth counter is still pending.
    assert_eq!(session.fact_count(), 6);
}

// ========== TEST: fire_until_stops_early ==========
#[test]
fn test_fire_until_stops_early() {
    let knowledge = knowledge().unwrap();
    knowledge.add_rule(count_up()).unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert(Counter { n: 0 }).unwrap();

    let stats = session.fire_until(|s| s.cycles < 3).unwrap();

    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.activations_fired, 3);
    assert!(!stats.fixpoint_reached);
    assert_eq!(session.fact_count(), 4);

    // The next call picks up where the last one stopped.
    let more = session.fire_until(|s| s.cycles < 1).unwrap();
    assert_eq!(more.cycles, 1);
    assert_eq!(session.fact_count(), 5);
}

// ========== TEST: activation_manager_blocks_rules ==========
#[test]
fn test_activation_manager_blocks_rules() {
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    knowledge.add_rule(logging("allowed", 0, &log)).unwrap();
    knowledge.add_rule(logging("blocked", 0, &log)).unwrap();
    let mut session = knowledge.new_session().unwrap();
    let manager = BlockingManager::blocking(&["blocked"]);
    session.set_activation_manager(manager.clone());

    session.insert_all([Order::new(1, 150), Order::new(2, 250)]).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(stats.activations_fired, 2);
    assert_eq!(stats.activations_skipped, 2);
    assert_eq!(log.entries(), vec!["allowed".to_string(), "allowed".to_string()]);
    assert_eq!(*manager.fired.lock(), vec![("allowed".to_string(), 2)]);
    assert_eq!(
        *manager.agendas.lock(),
        vec![(1, vec!["allowed".to_string(), "blocked".to_string()])]
    );
}

fn consume_then_audit(log: &FireLog) -> [RuleBuilder; 2] {
    let consumed = log.clone();
    let audited = log.clone();
    [
        large_orders("consume", 100).salience(10).execute(move |ctx| {
            ctx.delete("$o")?;
            consumed.push("consume");
            Ok(())
        }),
        large_orders("audit", 0).execute(move |_| {
            audited.push("audit");
            Ok(())
        }),
    ]
}

// ========== TEST: default_mode_skips_deleted_facts ==========
#[test]
fn test_default_mode_skips_deleted_facts() {
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    for rule in consume_then_audit(&log) {
        knowledge.add_rule(rule).unwrap();
    }
    let mut session = knowledge.new_session().unwrap();

    session.insert(Order::new(1, 150)).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(log.entries(), vec!["consume".to_string()]);
    assert_eq!(stats.activations_fired, 1);
    assert_eq!(stats.activations_skipped, 1);
    assert_eq!(session.fact_count(), 0);
}

// ========== TEST: continuous_mode_fires_everything ==========
#[test]
fn test_continuous_mode_fires_everything() {
    let config = Configuration::minimal().with_agenda_mode(AgendaMode::Continuous);
    let knowledge = knowledge_with(config).unwrap();
    let log = FireLog::new();
    for rule in consume_then_audit(&log) {
        knowledge.add_rule(rule).unwrap();
    }
    let mut session = knowledge.new_session().unwrap();

    session.insert(Order::new(1, 150)).unwrap();
    let stats = session.fire().unwrap();

    assert_eq!(log.entries(), vec!["consume".to_string(), "audit".to_string()]);
    assert_eq!(stats.activations_fired, 2);
    assert_eq!(stats.activations_skipped, 0);
}

fn discount_then_audit(log: &FireLog) -> [RuleBuilder; 2] {
    let discounted = log.clone();
    let audited = log.clone();
    [
        large_orders("discount", 100).salience(10).execute(move |ctx| {
            let id = ctx.get::<Order>("$o")?.id;
            ctx.update("$o", Order::new(id, 50))?;
            discounted.push("discount");
            Ok(())
        }),
        large_orders("audit", 100).salience(5).execute(move |ctx| {
            let amount = ctx.get::<Order>("$o")?.amount;
            audited.push(format!("audit {}", amount));
            Ok(())
        }),
    ]
}

// ========== TEST: default_mode_stops_after_rule_changes_facts ==========
#[test]
fn test_default_mode_stops_after_rule_changes_facts() {
    // GIVEN a rule that discounts large orders ahead of one auditing them
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    for rule in discount_then_audit(&log) {
        knowledge.add_rule(rule).unwrap();
    }
    let mut session = knowledge.new_session().unwrap();

    // WHEN a large order is fired
    session.insert(Order::new(1, 150)).unwrap();
    let stats = session.fire().unwrap();

    // THEN the audit is dropped with the rest of the agenda, and the next
    // cycle no longer matches the discounted order
    assert_eq!(log.entries(), vec!["discount".to_string()]);
    assert_eq!(stats.activations_fired, 1);
    assert_eq!(stats.activations_skipped, 1);
    assert_eq!(stats.cycles, 2);
}

// ========== TEST: session_agenda_mode_can_be_switched ==========
#[test]
fn test_session_agenda_mode_can_be_switched() {
    // GIVEN a template in default mode
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    for rule in discount_then_audit(&log) {
        knowledge.add_rule(rule).unwrap();
    }
    let mut session = knowledge.new_session().unwrap();

    // WHEN one session switches to continuous mode
    session.set_agenda_mode(AgendaMode::Continuous);
    session.insert(Order::new(1, 150)).unwrap();
    session.fire().unwrap();

    // THEN the audit runs in the same cycle and reads the updated order
    assert_eq!(
        log.entries(),
        vec!["discount".to_string(), "audit 50".to_string()]
    );
    assert_eq!(knowledge.config().agenda_mode, AgendaMode::Default);
}

// ========== TEST: session_created_with_mode_fires_everything ==========
#[test]
fn test_session_created_with_mode_fires_everything() {
    let knowledge = knowledge().unwrap();
    let log = FireLog::new();
    for rule in consume_then_audit(&log) {
        knowledge.add_rule(rule).unwrap();
    }
    let mut continuous = knowledge.new_session_with_mode(AgendaMode::Continuous).unwrap();
    let mut default = knowledge.new_session().unwrap();

    continuous.insert(Order::new(1, 150)).unwrap();
    continuous.fire().unwrap();
    default.insert(Order::new(1, 150)).unwrap();
    default.fire().unwrap();

    assert_eq!(
        log.entries(),
        vec!["consume".to_string(), "audit".to_string(), "consume".to_string()]
    );
}
