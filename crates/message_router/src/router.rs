//! Message router: registration, publish and consume.

use crate::config::RouterConfig;
use crate::error::DispatchError;
use crate::group::SubscriberGroup;
use crate::key::{GroupKey, MessageKey};
use crate::message::Message;
use crate::stats::{RouterStats, StatsRecorder};
use crate::subscriber::{Callback, Unsubscribe};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

struct RouterInner<K: MessageKey> {
    /// Wildcard group, dispatched before any key group.
    all: Rc<SubscriberGroup>,
    /// Key groups, created on first reference and kept for the router's lifetime.
    groups: RefCell<HashMap<K, Rc<SubscriberGroup>>>,
    /// Messages published while the wildcard pass was running, delivered to
    /// wildcard subscribers once it ends.
    deferred: RefCell<VecDeque<Message>>,
    config: RouterConfig,
    stats: Rc<StatsRecorder>,
}

/// Synchronous, single-threaded publish/subscribe router.
///
/// Cloning a router yields another handle to the same subscriber groups, which
/// is how a subscriber re-enters the router to publish, subscribe or consume
/// from inside its own callback. A callback that captures its own router should
/// capture a [`WeakMessageRouter`] instead, otherwise the router keeps itself
/// alive.
///
/// ```rust
/// use message_router::{Message, MessageRouter};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let router: MessageRouter<u32> = MessageRouter::new();
/// let seen = Rc::new(Cell::new(0));
///
/// let counter = seen.clone();
/// let unsubscribe = router.subscribe_fn(1, move |message| {
///     assert_eq!(message.downcast_ref::<&str>(), Some(&"hello"));
///     counter.set(counter.get() + 1);
///     Ok(())
/// });
///
/// router.publish(1, &Message::new("hello")).unwrap();
/// unsubscribe.unsubscribe();
/// router.publish(1, &Message::new("hello")).unwrap();
/// assert_eq!(seen.get(), 1);
/// ```
pub struct MessageRouter<K: MessageKey = i32> {
    inner: Rc<RouterInner<K>>,
}

/// Non-owning handle to a [`MessageRouter`].
pub struct WeakMessageRouter<K: MessageKey = i32> {
    inner: Weak<RouterInner<K>>,
}

impl<K: MessageKey> MessageRouter<K> {
    /// Creates an empty router with the default [`RouterConfig`].
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Creates an empty router.
    ///
    /// # Arguments
    ///
    /// * `config` - Behaviour switches shared by every group of this router
    ///
    /// # Returns
    ///
    /// A router with only its wildcard group; key groups are created on first
    /// reference.
    ///
    /// ```rust
    /// use message_router::{MessageRouter, RouterConfig};
    ///
    /// let router: MessageRouter = MessageRouter::with_config(RouterConfig {
    ///     unsubscribe_failed_once: true,
    ///     ..RouterConfig::default()
    /// });
    /// assert!(router.config().unsubscribe_failed_once);
    /// assert!(router.registered_keys().is_empty());
    /// ```
    pub fn with_config(config: RouterConfig) -> Self {
        let stats = Rc::new(StatsRecorder::default());
        let all = Rc::new(SubscriberGroup::new(
            "*".to_string(),
            config.clone(),
            stats.clone(),
        ));

        Self {
            inner: Rc::new(RouterInner {
                all,
                groups: RefCell::new(HashMap::new()),
                deferred: RefCell::new(VecDeque::new()),
                config,
                stats,
            }),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakMessageRouter<K> {
        WeakMessageRouter {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Subscribes to `key`. The callback receives its own unsubscribe
    /// capability, which is also returned.
    pub fn subscribe<F>(&self, key: K, subscriber: F) -> Unsubscribe
    where
        F: Fn(&Message, &Unsubscribe) -> anyhow::Result<()> + 'static,
    {
        self.group(key).add(Box::new(subscriber), false)
    }

    /// Subscribes to `key` with a message-only callback and returns the
    /// capability that removes it.
    pub fn subscribe_fn<F>(&self, key: K, subscriber: F) -> Unsubscribe
    where
        F: Fn(&Message) -> anyhow::Result<()> + 'static,
    {
        self.group(key).add(message_only(subscriber), false)
    }

    /// Subscribes to `key` for the first delivery only.
    pub fn subscribe_once<F>(&self, key: K, subscriber: F) -> Unsubscribe
    where
        F: Fn(&Message, &Unsubscribe) -> anyhow::Result<()> + 'static,
    {
        self.group(key).add(Box::new(subscriber), true)
    }

    /// Subscribes to `key` with a message-only callback for the first
    /// successful delivery only. The returned capability cancels it earlier.
    pub fn subscribe_once_fn<F>(&self, key: K, subscriber: F) -> Unsubscribe
    where
        F: Fn(&Message) -> anyhow::Result<()> + 'static,
    {
        self.group(key).add(message_only(subscriber), true)
    }

    /// Subscribes to every message published on this router, whatever its key.
    pub fn subscribe_all<F>(&self, subscriber: F) -> Unsubscribe
    where
        F: Fn(&Message, &Unsubscribe) -> anyhow::Result<()> + 'static,
    {
        self.inner.all.add(Box::new(subscriber), false)
    }

    /// Message-only form of [`subscribe_all`](Self::subscribe_all).
    pub fn subscribe_all_fn<F>(&self, subscriber: F) -> Unsubscribe
    where
        F: Fn(&Message) -> anyhow::Result<()> + 'static,
    {
        self.inner.all.add(message_only(subscriber), false)
    }

    /// Publishes `message` under `key`.
    ///
    /// Wildcard subscribers run first, then the subscribers of `key`, each in
    /// subscription order. A publish nested inside a pass of the same key
    /// group is discarded. A publish nested inside the wildcard pass reaches
    /// wildcard subscribers after that pass ends, unless it republishes the
    /// very message the wildcard pass is dispatching, which is discarded.
    ///
    /// Subscriber failures are returned once their pass completes: one
    /// failure as-is, several as an aggregate. A failure in the wildcard pass,
    /// or in a wildcard delivery deferred into it, is returned before the key
    /// group runs.
    pub fn publish(&self, key: K, message: &Message) -> Result<(), DispatchError> {
        self.inner.stats.published();

        let all = Rc::clone(&self.inner.all);
        if all.is_dispatching() {
            if all.token_for(message).is_some() {
                self.discard_cyclic(GroupKey::All, all.label(), message);
            } else {
                self.defer_wildcard(message);
            }
        } else {
            self.dispatch_wildcard(&all, message)?;
        }

        let group = self.group(key);
        if group.is_dispatching() {
            self.discard_cyclic(GroupKey::Key(key), group.label(), message);
            return Ok(());
        }

        group.publish(message)
    }

    /// Publishes a message carrying no payload.
    pub fn publish_void(&self, key: K) -> Result<(), DispatchError> {
        self.publish(key, &Message::void())
    }

    /// Stops every key group currently dispatching `message` (by identity)
    /// from invoking its remaining subscribers. The wildcard group is never
    /// stopped. Returns the number of passes aborted; zero when nothing matched.
    pub fn consume(&self, message: &Message) -> usize {
        let groups: Vec<Rc<SubscriberGroup>> =
            self.inner.groups.borrow().values().cloned().collect();

        let mut aborted = 0;
        for group in groups {
            if let Some(token) = group.token_for(message) {
                if group.abort(token) {
                    debug!("🛑 Consumed {:?} on {} ({})", message, group.label(), token);
                    aborted += 1;
                }
            }
        }
        aborted
    }

    /// Number of subscribers registered for `key`, excluding wildcard ones.
    pub fn subscriber_count(&self, key: K) -> usize {
        self.inner
            .groups
            .borrow()
            .get(&key)
            .map_or(0, |group| group.len())
    }

    pub fn wildcard_subscriber_count(&self) -> usize {
        self.inner.all.len()
    }

    /// True while a pass for `key` is running.
    pub fn is_dispatching(&self, key: K) -> bool {
        self.inner
            .groups
            .borrow()
            .get(&key)
            .is_some_and(|group| group.is_dispatching())
    }

    /// Every key that has been subscribed to or published at least once.
    pub fn registered_keys(&self) -> Vec<K> {
        self.inner.groups.borrow().keys().copied().collect()
    }

    pub fn stats(&self) -> RouterStats {
        self.inner.stats.snapshot()
    }

    /// Resolves the group for `key`, creating it on first reference.
    fn group(&self, key: K) -> Rc<SubscriberGroup> {
        let mut groups = self.inner.groups.borrow_mut();
        let group = groups
            .entry(key)
            .or_insert_with(|| {
                Rc::new(SubscriberGroup::new(
                    format!("{:?}", key),
                    self.inner.config.clone(),
                    self.inner.stats.clone(),
                ))
            })
            .clone();
        group
    }

    /// Runs the wildcard pass for `message`, then the deliveries deferred by
    /// publishes nested inside it, until none are left.
    fn dispatch_wildcard(
        &self,
        all: &SubscriberGroup,
        message: &Message,
    ) -> Result<(), DispatchError> {
        // Only non-empty here if an earlier drain unwound.
        self.inner.deferred.borrow_mut().clear();

        let mut failures = Vec::new();
        if let Err(error) = all.publish(message) {
            failures.extend(error.into_errors());
        }

        let limit = self.inner.config.max_deferred_wildcard;
        let mut delivered = 0;
        loop {
            let next = self.inner.deferred.borrow_mut().pop_front();
            let Some(next) = next else { break };

            if delivered == limit {
                let dropped = 1 + std::mem::take(&mut *self.inner.deferred.borrow_mut()).len();
                self.inner.stats.cyclic_discard(dropped as u64);
                warn!(
                    "⚠️ Wildcard redelivery limit of {} reached, {} nested publishes discarded",
                    limit, dropped
                );
                break;
            }

            delivered += 1;
            if let Err(error) = all.publish(&next) {
                failures.extend(error.into_errors());
            }
        }

        DispatchError::from_failures(failures)
    }

    fn defer_wildcard(&self, message: &Message) {
        self.inner.stats.wildcard_deferred();
        trace!("Deferred wildcard delivery of {:?}", message);
        self.inner.deferred.borrow_mut().push_back(message.clone());
    }

    fn discard_cyclic(&self, key: GroupKey<K>, label: &str, message: &Message) {
        self.inner.stats.cyclic_discard(1);
        if self.inner.config.warn_on_cyclic_publish {
            warn!(
                "⚠️ Cyclical publish caught in middle of dispatch and discarded: [{}] = {:?}",
                label, message
            );
        } else {
            debug!("Cyclical publish of {:?} discarded: {:?}", key, message);
        }
    }
}

fn message_only<F>(subscriber: F) -> Callback
where
    F: Fn(&Message) -> anyhow::Result<()> + 'static,
{
    Box::new(move |message: &Message, _: &Unsubscribe| subscriber(message))
}

impl<K: MessageKey> Clone for MessageRouter<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: MessageKey> Default for MessageRouter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MessageKey> fmt::Debug for MessageRouter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("groups", &self.inner.groups.borrow().len())
            .field("wildcard_subscribers", &self.inner.all.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<K: MessageKey> WeakMessageRouter<K> {
    pub fn upgrade(&self) -> Option<MessageRouter<K>> {
        self.inner.upgrade().map(|inner| MessageRouter { inner })
    }
}

impl<K: MessageKey> Clone for WeakMessageRouter<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K: MessageKey> fmt::Debug for WeakMessageRouter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMessageRouter")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
