//! Per-key subscriber group and its reentrancy-safe dispatch pass.
//!
//! A group is either idle or dispatching exactly one message. While it is
//! dispatching, the entry list is only ever appended to: removals requested by
//! subscribers are queued and applied once the pass has visited every entry it
//! started with. The pass length is captured up front, so entries added by a
//! subscriber mid-pass first run on the next publish.

use crate::config::RouterConfig;
use crate::error::DispatchError;
use crate::message::{DispatchToken, Message};
use crate::stats::StatsRecorder;
use crate::subscriber::{Callback, SubscriberEntry, SubscriptionId, Unsubscribe};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{debug, trace};

/// The message currently being dispatched by a group.
#[derive(Debug)]
struct InFlight {
    message: Message,
    token: DispatchToken,
    aborted: bool,
}

#[derive(Debug, Default)]
enum DispatchState {
    #[default]
    Idle,
    Dispatching(InFlight),
}

/// Ordered subscribers of one key, or of the wildcard.
pub(crate) struct SubscriberGroup {
    label: String,
    entries: RefCell<Vec<Rc<SubscriberEntry>>>,
    state: RefCell<DispatchState>,
    pending_removals: RefCell<Vec<SubscriptionId>>,
    next_id: Cell<u64>,
    config: RouterConfig,
    stats: Rc<StatsRecorder>,
}

/// Records a pass and returns the group to idle when the pass ends, including
/// by unwinding.
struct PassGuard<'a> {
    group: &'a SubscriberGroup,
    invoked: u64,
    failed: u64,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        // An unwinding pass was left by the subscriber it last invoked.
        if std::thread::panicking() {
            self.failed += 1;
        }
        let aborted = self.group.is_aborted();
        self.group.stats.pass(self.invoked, self.failed, aborted);
        self.group.finish_pass();
    }
}

impl SubscriberGroup {
    pub(crate) fn new(label: String, config: RouterConfig, stats: Rc<StatsRecorder>) -> Self {
        Self {
            label,
            entries: RefCell::new(Vec::new()),
            state: RefCell::new(DispatchState::Idle),
            pending_removals: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            config,
            stats,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Appends a subscriber and returns the capability that removes it.
    pub(crate) fn add(self: &Rc<Self>, callback: Callback, once: bool) -> Unsubscribe {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let unsubscribe = Unsubscribe::new(self, id);
        let entry = SubscriberEntry::new(callback, once, unsubscribe.clone());
        self.entries.borrow_mut().push(Rc::new(entry));
        self.stats.subscribed();

        debug!("📝 Subscribed {:?} to {} (once: {})", id, self.label, once);
        unsubscribe
    }

    /// Removes an entry now, or after the current pass if one is running.
    pub(crate) fn remove(&self, id: SubscriptionId) {
        if self.is_dispatching() {
            self.pending_removals.borrow_mut().push(id);
            trace!("Deferred removal of {:?} from {}", id, self.label);
        } else {
            self.entries.borrow_mut().retain(|entry| entry.id != id);
        }
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.borrow().iter().any(|entry| entry.id == id)
            && !self.pending_removals.borrow().contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        matches!(*self.state.borrow(), DispatchState::Dispatching(_))
    }

    /// Token of the running pass if it is dispatching exactly `message`.
    pub(crate) fn token_for(&self, message: &Message) -> Option<DispatchToken> {
        match &*self.state.borrow() {
            DispatchState::Dispatching(in_flight) if in_flight.message.ptr_eq(message) => {
                Some(in_flight.token)
            }
            _ => None,
        }
    }

    /// Stops the pass identified by `token` after the entry currently running.
    /// Returns false when idle or when `token` belongs to a finished pass.
    pub(crate) fn abort(&self, token: DispatchToken) -> bool {
        match &mut *self.state.borrow_mut() {
            DispatchState::Dispatching(in_flight) if in_flight.token == token => {
                in_flight.aborted = true;
                true
            }
            _ => false,
        }
    }

    fn is_aborted(&self) -> bool {
        matches!(
            &*self.state.borrow(),
            DispatchState::Dispatching(InFlight { aborted: true, .. })
        )
    }

    /// Runs one dispatch pass over the entries present when it starts.
    ///
    /// Must not be called while this group is already dispatching; the router
    /// discards such nested publishes before they get here.
    pub(crate) fn publish(&self, message: &Message) -> Result<(), DispatchError> {
        debug_assert!(!self.is_dispatching(), "nested dispatch of {}", self.label);

        let token = DispatchToken::next();
        *self.state.borrow_mut() = DispatchState::Dispatching(InFlight {
            message: message.clone(),
            token,
            aborted: false,
        });
        let mut guard = PassGuard {
            group: self,
            invoked: 0,
            failed: 0,
        };

        let pass_len = self.entries.borrow().len();
        trace!("Dispatch {} on {} to {} subscribers", token, self.label, pass_len);

        let mut failures = Vec::new();
        for index in 0..pass_len {
            let entry = self.entries.borrow().get(index).cloned();
            let Some(entry) = entry else { break };

            guard.invoked += 1;
            match self.invoke(&entry, message) {
                Ok(()) => {
                    if entry.once {
                        entry.unsubscribe();
                    }
                }
                Err(error) => {
                    debug!("Subscriber {:?} on {} failed: {}", entry.id, self.label, error);
                    if entry.once && self.config.unsubscribe_failed_once {
                        entry.unsubscribe();
                    }
                    guard.failed += 1;
                    failures.push(error);
                }
            }

            if self.is_aborted() {
                break;
            }
        }

        if self.is_aborted() {
            debug!(
                "Dispatch {} on {} consumed after {} subscribers",
                token, self.label, guard.invoked
            );
        }
        drop(guard);

        DispatchError::from_failures(failures)
    }

    fn invoke(&self, entry: &SubscriberEntry, message: &Message) -> anyhow::Result<()> {
        if !self.config.catch_panics {
            return entry.invoke(message);
        }

        match catch_unwind(AssertUnwindSafe(|| entry.invoke(message))) {
            Ok(result) => result,
            Err(panic_info) => Err(panic_to_error(panic_info)),
        }
    }

    /// Applies deferred removals and returns to idle.
    fn finish_pass(&self) {
        let removals = std::mem::take(&mut *self.pending_removals.borrow_mut());
        if !removals.is_empty() {
            self.entries
                .borrow_mut()
                .retain(|entry| !removals.contains(&entry.id));
        }
        *self.state.borrow_mut() = DispatchState::Idle;
    }
}

/// Converts a panic payload into a subscriber error.
fn panic_to_error(panic_info: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
        format!("Subscriber panicked: {}", s)
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        format!("Subscriber panicked: {}", s)
    } else {
        "Subscriber panicked with unknown payload".to_string()
    };
    anyhow::anyhow!(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Rc<SubscriberGroup> {
        group_with(RouterConfig::default())
    }

    fn group_with(config: RouterConfig) -> Rc<SubscriberGroup> {
        Rc::new(SubscriberGroup::new(
            "test".to_string(),
            config,
            Rc::new(StatsRecorder::default()),
        ))
    }

    fn callback<F>(f: F) -> Callback
    where
        F: Fn(&Message, &Unsubscribe) -> anyhow::Result<()> + 'static,
    {
        Box::new(f)
    }

    fn counter_callback(counter: &Rc<Cell<u32>>) -> Callback {
        let counter = counter.clone();
        callback(move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn idle_unsubscribe_removes_immediately() {
        let group = group();
        let calls = Rc::new(Cell::new(0));
        let unsub = group.add(counter_callback(&calls), false);
        assert_eq!(group.len(), 1);

        unsub.unsubscribe();
        unsub.unsubscribe();
        assert_eq!(group.len(), 0);
        assert!(!unsub.is_subscribed());

        group.publish(&Message::new(())).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn removal_during_pass_is_deferred() {
        let group = group();
        let seen_len = Rc::new(Cell::new(0));
        let later = Rc::new(Cell::new(0));

        let group_ref = Rc::downgrade(&group);
        let seen = seen_len.clone();
        group.add(
            callback(move |_, unsub| {
                unsub.unsubscribe();
                unsub.unsubscribe();
                seen.set(group_ref.upgrade().map(|g| g.len()).unwrap_or(0));
                Ok(())
            }),
            false,
        );
        group.add(counter_callback(&later), false);

        group.publish(&Message::new(())).unwrap();
        assert_eq!(seen_len.get(), 2);
        assert_eq!(later.get(), 1);
        assert_eq!(group.len(), 1);
        assert!(!group.is_dispatching());
    }

    #[test]
    fn entries_added_mid_pass_wait_for_next_pass() {
        let group = group();
        let added_calls = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&group);
        let added = added_calls.clone();
        let once_added = Cell::new(false);
        group.add(
            callback(move |_, _| {
                if !once_added.replace(true) {
                    if let Some(group) = weak.upgrade() {
                        group.add(counter_callback(&added), false);
                    }
                }
                Ok(())
            }),
            false,
        );

        group.publish(&Message::new(())).unwrap();
        assert_eq!(added_calls.get(), 0);
        group.publish(&Message::new(())).unwrap();
        assert_eq!(added_calls.get(), 1);
    }

    #[test]
    fn abort_stops_remaining_entries() {
        let group = group();
        let after = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&group);
        group.add(
            callback(move |message, _| {
                let group = weak.upgrade().expect("group alive");
                let token = group.token_for(message).expect("dispatching this message");
                assert!(group.abort(token));
                Ok(())
            }),
            false,
        );
        group.add(counter_callback(&after), false);

        group.publish(&Message::new(())).unwrap();
        assert_eq!(after.get(), 0);
        assert_eq!(group.len(), 2);
        assert!(!group.is_dispatching());
    }

    #[test]
    fn abort_is_ignored_when_idle_or_stale() {
        let group = group();
        let message = Message::new(());
        assert!(group.token_for(&message).is_none());
        assert!(!group.abort(DispatchToken::next()));
    }

    #[test]
    fn failing_once_subscriber_stays_by_default() {
        let group = group();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        group.add(
            callback(move |_, _| {
                counter.set(counter.get() + 1);
                anyhow::bail!("nope")
            }),
            true,
        );

        assert!(group.publish(&Message::new(())).is_err());
        assert!(group.publish(&Message::new(())).is_err());
        assert_eq!(calls.get(), 2);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn failing_once_subscriber_removed_when_configured() {
        let group = group_with(RouterConfig {
            unsubscribe_failed_once: true,
            ..RouterConfig::default()
        });
        group.add(callback(|_, _| anyhow::bail!("nope")), true);

        assert!(group.publish(&Message::new(())).is_err());
        assert_eq!(group.len(), 0);
        assert!(group.publish(&Message::new(())).is_ok());
    }

    #[test]
    fn panics_are_collected_as_errors() {
        let group = group();
        let after = Rc::new(Cell::new(0));
        group.add(callback(|_, _| panic!("kaboom")), false);
        group.add(counter_callback(&after), false);

        let err = group.publish(&Message::new(())).unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        assert_eq!(after.get(), 1);
        assert!(!group.is_dispatching());
    }

    #[test]
    fn uncaught_panic_still_returns_group_to_idle() {
        let group = group_with(RouterConfig {
            catch_panics: false,
            ..RouterConfig::default()
        });
        group.add(
            callback(|_, unsub| {
                unsub.unsubscribe();
                panic!("escapes")
            }),
            false,
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| group.publish(&Message::new(()))));
        assert!(outcome.is_err());
        assert!(!group.is_dispatching());
        assert_eq!(group.len(), 0);
    }

    #[test]
    fn uncaught_panic_pass_is_still_counted() {
        let stats = Rc::new(StatsRecorder::default());
        let group = Rc::new(SubscriberGroup::new(
            "test".to_string(),
            RouterConfig {
                catch_panics: false,
                ..RouterConfig::default()
            },
            stats.clone(),
        ));
        let calls = Rc::new(Cell::new(0));
        group.add(counter_callback(&calls), false);
        group.add(callback(|_, _| panic!("escapes")), false);
        group.add(counter_callback(&calls), false);

        let outcome = catch_unwind(AssertUnwindSafe(|| group.publish(&Message::new(()))));
        assert!(outcome.is_err());
        assert_eq!(calls.get(), 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dispatch_passes, 1);
        assert_eq!(snapshot.subscriber_invocations, 2);
        assert_eq!(snapshot.subscriber_failures, 1);
    }
}
