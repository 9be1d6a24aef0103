//! Opaque, reference-identified message values.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A published message.
///
/// Cloning a `Message` clones the handle, not the payload: every subscriber of
/// a pass receives the same allocation, and [`Message::ptr_eq`] compares that
/// identity rather than the payload's value.
#[derive(Clone)]
pub struct Message {
    payload: Rc<dyn Any>,
}

impl Message {
    /// Wraps a payload in a new message with a fresh identity.
    pub fn new<T: Any>(payload: T) -> Self {
        Self {
            payload: Rc::new(payload),
        }
    }

    /// Wraps an existing shared payload. Messages built from clones of the same
    /// `Rc` share an identity.
    pub fn from_rc<T: Any>(payload: Rc<T>) -> Self {
        Self { payload }
    }

    /// A message carrying the [`Void`] placeholder.
    pub fn void() -> Self {
        Self::new(Void)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Identity comparison. Two messages are the same iff they share a payload
    /// allocation.
    pub fn ptr_eq(&self, other: &Message) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.payload) as *const ()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("addr", &self.addr())
            .field("void", &self.is::<Void>())
            .finish()
    }
}

/// Payload used for publishes that carry no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Void;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Unique token issued each time a subscriber group begins a dispatch pass.
///
/// Tokens are never reused, so a stale token can never abort a later pass.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DispatchToken(u64);

impl DispatchToken {
    pub(crate) fn next() -> Self {
        DispatchToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let message = Message::new(String::from("hello"));
        let copy = message.clone();
        assert!(message.ptr_eq(&copy));
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("hello"));
    }

    #[test]
    fn equal_payloads_are_distinct_messages() {
        let a = Message::new(5u32);
        let b = Message::new(5u32);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn from_rc_keeps_identity() {
        let shared = Rc::new(42i64);
        let a = Message::from_rc(shared.clone());
        let b = Message::from_rc(shared);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn void_messages_are_distinct() {
        let a = Message::void();
        let b = Message::void();
        assert!(a.is::<Void>());
        assert!(a.downcast_ref::<u8>().is_none());
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn tokens_increase() {
        let first = DispatchToken::next();
        let second = DispatchToken::next();
        assert!(second > first);
    }
}
