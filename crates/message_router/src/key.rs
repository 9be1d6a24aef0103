//! Message-type keys used to route published messages to subscriber groups.

use std::fmt::Debug;
use std::hash::Hash;

/// Trait for application-defined message-type keys.
///
/// Integers and field-less enums qualify automatically through the blanket
/// implementation, so applications never implement this by hand.
pub trait MessageKey: Copy + Eq + Hash + Debug + 'static {}

impl<T> MessageKey for T where T: Copy + Eq + Hash + Debug + 'static {}

/// Identifies a subscriber group: either the wildcard group or one key.
///
/// The wildcard is its own variant, so no application key can collide with it.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum GroupKey<K: MessageKey> {
    /// Receives every published message regardless of key
    All,
    /// Receives messages published under this key only
    Key(K),
}

impl<K: MessageKey> GroupKey<K> {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, GroupKey::All)
    }

    /// The application key, or `None` for the wildcard group.
    pub fn key(&self) -> Option<K> {
        match self {
            GroupKey::All => None,
            GroupKey::Key(key) => Some(*key),
        }
    }
}

impl<K: MessageKey> From<K> for GroupKey<K> {
    fn from(key: K) -> Self {
        GroupKey::Key(key)
    }
}
