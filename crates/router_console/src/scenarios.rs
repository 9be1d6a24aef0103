//! Dispatch scenarios run against a live router.
//!
//! Each scenario builds its own router from the shared configuration, drives it
//! through one reentrancy case and checks the observed invocation counts.

use message_router::{Message, MessageRouter, RouterConfig, RouterStats};
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;

const KEY_A: i32 = 1;
const KEY_B: i32 = 2;

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    pub stats: RouterStats,
}

type ScenarioFn = fn(&MessageRouter) -> anyhow::Result<String>;

/// Every scenario, in the order they are run.
pub const SCENARIOS: &[(&str, ScenarioFn)] = &[
    ("self_unsubscribe", self_unsubscribe),
    ("consume", consume),
    ("cyclic_publish", cyclic_publish),
    ("subscribe_while_dispatching", subscribe_while_dispatching),
    ("subscribe_all", subscribe_all),
    ("subscribe_once", subscribe_once),
    ("error_aggregation", error_aggregation),
];

pub fn scenario_names() -> impl Iterator<Item = &'static str> {
    SCENARIOS.iter().map(|(name, _)| *name)
}

/// Runs the scenarios whose name matches `filter`, or all of them.
pub fn run(config: &RouterConfig, filter: Option<&str>) -> Vec<ScenarioReport> {
    SCENARIOS
        .iter()
        .filter(|(name, _)| filter.map_or(true, |wanted| wanted == *name))
        .map(|&(name, scenario)| {
            let router = MessageRouter::with_config(config.clone());
            let outcome = scenario(&router);
            let stats = router.stats();
            match outcome {
                Ok(detail) => ScenarioReport {
                    name,
                    passed: true,
                    detail,
                    stats,
                },
                Err(error) => ScenarioReport {
                    name,
                    passed: false,
                    detail: format!("{error:#}"),
                    stats,
                },
            }
        })
        .collect()
}

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn expect(label: &str, actual: u32, expected: u32) -> anyhow::Result<()> {
    anyhow::ensure!(
        actual == expected,
        "{label}: expected {expected} invocations, saw {actual}"
    );
    Ok(())
}

fn self_unsubscribe(router: &MessageRouter) -> anyhow::Result<String> {
    let first = counter();
    let second = counter();

    let calls = first.clone();
    router.subscribe(KEY_A, move |_, unsubscribe| {
        calls.set(calls.get() + 1);
        unsubscribe.unsubscribe();
        Ok(())
    });
    let calls = second.clone();
    router.subscribe_fn(KEY_A, move |_| {
        calls.set(calls.get() + 1);
        Ok(())
    });

    let message = Message::void();
    router.publish(KEY_A, &message)?;
    router.publish(KEY_A, &message)?;

    expect("self-unsubscribing subscriber", first.get(), 1)?;
    expect("durable subscriber", second.get(), 2)?;
    Ok(format!("h1={} h2={}", first.get(), second.get()))
}

fn consume(router: &MessageRouter) -> anyhow::Result<String> {
    let tail = counter();

    let weak = router.downgrade();
    router.subscribe_fn(KEY_A, move |message| {
        if let Some(router) = weak.upgrade() {
            router.consume(message);
        }
        Ok(())
    });
    let calls = tail.clone();
    router.subscribe_fn(KEY_A, move |_| {
        calls.set(calls.get() + 1);
        Ok(())
    });

    router.publish(KEY_A, &Message::void())?;
    expect("subscriber after consume", tail.get(), 0)?;
    Ok("second subscriber skipped".to_string())
}

fn cyclic_publish(router: &MessageRouter) -> anyhow::Result<String> {
    let called = counter();

    let weak = router.downgrade();
    let calls = called.clone();
    router.subscribe_fn(KEY_A, move |message| {
        calls.set(calls.get() + 1);
        if let Some(router) = weak.upgrade() {
            router.publish(KEY_A, message)?;
        }
        Ok(())
    });

    router.publish(KEY_A, &Message::void())?;
    expect("self-publishing subscriber", called.get(), 1)?;
    Ok("nested publish discarded".to_string())
}

fn subscribe_while_dispatching(router: &MessageRouter) -> anyhow::Result<String> {
    let late = counter();

    let weak = router.downgrade();
    let calls = late.clone();
    let added = Cell::new(false);
    router.subscribe_fn(KEY_A, move |_| {
        if added.replace(true) {
            return Ok(());
        }
        if let Some(router) = weak.upgrade() {
            let calls = calls.clone();
            router.subscribe_fn(KEY_A, move |_| {
                calls.set(calls.get() + 1);
                Ok(())
            });
        }
        Ok(())
    });

    router.publish(KEY_A, &Message::void())?;
    expect("late subscriber during its own pass", late.get(), 0)?;
    router.publish(KEY_A, &Message::void())?;
    expect("late subscriber on next publish", late.get(), 1)?;
    Ok("late subscriber joined on the next pass".to_string())
}

fn subscribe_all(router: &MessageRouter) -> anyhow::Result<String> {
    let called = counter();

    let calls = called.clone();
    router.subscribe_all_fn(move |_| {
        calls.set(calls.get() + 1);
        Ok(())
    });

    router.publish(KEY_A, &Message::void())?;
    router.publish(KEY_B, &Message::void())?;
    expect("wildcard subscriber", called.get(), 2)?;
    Ok("wildcard saw both keys".to_string())
}

fn subscribe_once(router: &MessageRouter) -> anyhow::Result<String> {
    let called = counter();

    let calls = called.clone();
    router.subscribe_once_fn(KEY_A, move |_| {
        calls.set(calls.get() + 1);
        Ok(())
    });

    for _ in 0..3 {
        router.publish(KEY_A, &Message::void())?;
    }
    expect("once subscriber", called.get(), 1)?;
    Ok("delivered once".to_string())
}

fn error_aggregation(router: &MessageRouter) -> anyhow::Result<String> {
    let last = counter();

    router.subscribe_fn(KEY_A, |_| anyhow::bail!("first failure"));
    router.subscribe_fn(KEY_A, |_| anyhow::bail!("second failure"));
    let calls = last.clone();
    router.subscribe_fn(KEY_A, move |_| {
        calls.set(calls.get() + 1);
        Ok(())
    });

    let failures = match router.publish(KEY_A, &Message::void()) {
        Ok(()) => anyhow::bail!("publish succeeded despite failing subscribers"),
        Err(error) => error.failure_count(),
    };
    anyhow::ensure!(failures == 2, "expected 2 aggregated failures, got {failures}");
    expect("subscriber after failures", last.get(), 1)?;
    Ok(format!("{failures} failures aggregated"))
}
