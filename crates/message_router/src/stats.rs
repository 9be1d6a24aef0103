/// Statistics tracking for the message router
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Router statistics for monitoring dispatch behaviour
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Total number of `publish` calls, including discarded ones
    pub messages_published: u64,
    /// Number of dispatch passes run across all groups, wildcard included
    pub dispatch_passes: u64,
    /// Number of subscriber callbacks invoked
    pub subscriber_invocations: u64,
    /// Number of subscriber callbacks that returned an error or panicked
    pub subscriber_failures: u64,
    /// Nested publishes discarded by the cyclic guard
    pub cyclic_publishes_discarded: u64,
    /// Nested publishes delivered to wildcard subscribers after the running
    /// wildcard pass ended
    pub wildcard_deliveries_deferred: u64,
    /// Passes stopped early by `consume`
    pub passes_aborted: u64,
    /// Subscriptions created since the router was built
    pub total_subscriptions: u64,
}

/// Interior-mutable counters shared by the router and its groups.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    messages_published: Cell<u64>,
    dispatch_passes: Cell<u64>,
    subscriber_invocations: Cell<u64>,
    subscriber_failures: Cell<u64>,
    cyclic_publishes_discarded: Cell<u64>,
    wildcard_deliveries_deferred: Cell<u64>,
    passes_aborted: Cell<u64>,
    total_subscriptions: Cell<u64>,
}

fn bump(counter: &Cell<u64>, by: u64) {
    counter.set(counter.get().saturating_add(by));
}

impl StatsRecorder {
    pub(crate) fn published(&self) {
        bump(&self.messages_published, 1);
    }

    pub(crate) fn pass(&self, invocations: u64, failures: u64, aborted: bool) {
        bump(&self.dispatch_passes, 1);
        bump(&self.subscriber_invocations, invocations);
        bump(&self.subscriber_failures, failures);
        if aborted {
            bump(&self.passes_aborted, 1);
        }
    }

    pub(crate) fn cyclic_discard(&self, count: u64) {
        bump(&self.cyclic_publishes_discarded, count);
    }

    pub(crate) fn wildcard_deferred(&self) {
        bump(&self.wildcard_deliveries_deferred, 1);
    }

    pub(crate) fn subscribed(&self) {
        bump(&self.total_subscriptions, 1);
    }

    pub(crate) fn snapshot(&self) -> RouterStats {
        RouterStats {
            messages_published: self.messages_published.get(),
            dispatch_passes: self.dispatch_passes.get(),
            subscriber_invocations: self.subscriber_invocations.get(),
            subscriber_failures: self.subscriber_failures.get(),
            cyclic_publishes_discarded: self.cyclic_publishes_discarded.get(),
            wildcard_deliveries_deferred: self.wildcard_deliveries_deferred.get(),
            passes_aborted: self.passes_aborted.get(),
            total_subscriptions: self.total_subscriptions.get(),
        }
    }
}
