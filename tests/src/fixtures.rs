//! Domain types used across scenarios.

use ember_core::{Configuration, Value};
use ember_registry::ValueType;
use ember_rule::RuleBuilder;
use ember_session::{Knowledge, SessionResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub amount: i64,
}

impl Order {
    pub fn new(id: i64, amount: i64) -> Self {
        Self { id, amount }
    }
}

/// Left side of key joins.
#[derive(Debug, Clone)]
pub struct A {
    pub key: i64,
}

/// Right side of key joins.
#[derive(Debug, Clone)]
pub struct B {
    pub key: i64,
}

/// Matched by no rule; inserted by actions to produce one more cycle.
#[derive(Debug, Clone)]
pub struct Note {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Counter {
    pub n: i64,
}

#[derive(Debug)]
pub struct Customer {
    pub tier: String,
}

#[derive(Debug)]
pub struct Purchase {
    pub customer: Arc<Customer>,
    pub total: i64,
}

/// A template declaring every fixture type, with `Configuration::minimal()`.
pub fn knowledge() -> SessionResult<Knowledge> {
    knowledge_with(Configuration::minimal())
}

pub fn knowledge_with(config: Configuration) -> SessionResult<Knowledge> {
    let knowledge = Knowledge::new(config);
    knowledge
        .declare_with(|r| {
            r.builder::<Order>("Order")
                .field("id", ValueType::Int, |o: &Order| o.id)
                .field("amount", ValueType::Int, |o: &Order| o.amount)
                .done()?;
            r.builder::<A>("A").field("key", ValueType::Int, |a: &A| a.key).done()?;
            r.builder::<B>("B").field("key", ValueType::Int, |b: &B| b.key).done()?;
            r.builder::<Note>("Note")
                .field("text", ValueType::String, |n: &Note| n.text.clone())
                .done()?;
            r.builder::<Counter>("Counter")
                .field("n", ValueType::Int, |c: &Counter| c.n)
                .done()?;
            r.builder::<Customer>("Customer")
                .field("tier", ValueType::String, |c: &Customer| c.tier.clone())
                .done()?;
            r.builder::<Purchase>("Purchase")
                .reference("customer", |p: &Purchase| p.customer.clone())
                .field("total", ValueType::Int, |p: &Purchase| p.total)
                .done()
        })?;
    Ok(knowledge)
}

/// `$o: Order, $o.amount > threshold`.
pub fn large_orders(name: &str, threshold: i64) -> RuleBuilder {
    RuleBuilder::new(name)
        .fact("$o", "Order")
        .condition(format!("$o.amount > {}", threshold), &["$o.amount"], move |v| {
            v[0].gt(&Value::Int(threshold))
        })
}
