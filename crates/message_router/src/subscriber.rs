//! Subscriber entries and the capability used to remove them.

use crate::group::SubscriberGroup;
use crate::message::Message;
use std::fmt;
use std::rc::{Rc, Weak};

/// Callback stored for every subscription. Receives the message and the
/// subscription's own [`Unsubscribe`] capability.
pub(crate) type Callback = Box<dyn Fn(&Message, &Unsubscribe) -> anyhow::Result<()>>;

/// Identifies one subscription within its group.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// Capability that removes one subscription.
///
/// Removal is immediate when the owning group is idle and deferred to the end
/// of the current pass when it is dispatching. Invoking it more than once, or
/// after the router has been dropped, does nothing.
#[derive(Clone)]
pub struct Unsubscribe {
    group: Weak<SubscriberGroup>,
    id: SubscriptionId,
}

impl Unsubscribe {
    pub(crate) fn new(group: &Rc<SubscriberGroup>, id: SubscriptionId) -> Self {
        Self {
            group: Rc::downgrade(group),
            id,
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(group) = self.group.upgrade() {
            group.remove(self.id);
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// True until the subscription is removed or its deferred removal is
    /// requested.
    pub fn is_subscribed(&self) -> bool {
        self.group
            .upgrade()
            .is_some_and(|group| group.contains(self.id))
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("group_alive", &(self.group.strong_count() > 0))
            .finish()
    }
}

/// One registered callback.
pub(crate) struct SubscriberEntry {
    pub(crate) id: SubscriptionId,
    pub(crate) once: bool,
    callback: Callback,
    unsubscribe: Unsubscribe,
}

impl SubscriberEntry {
    pub(crate) fn new(callback: Callback, once: bool, unsubscribe: Unsubscribe) -> Self {
        Self {
            id: unsubscribe.id(),
            once,
            callback,
            unsubscribe,
        }
    }

    pub(crate) fn invoke(&self, message: &Message) -> anyhow::Result<()> {
        (self.callback)(message, &self.unsubscribe)
    }

    pub(crate) fn unsubscribe(&self) {
        self.unsubscribe.unsubscribe();
    }
}

impl fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("once", &self.once)
            .finish()
    }
}
