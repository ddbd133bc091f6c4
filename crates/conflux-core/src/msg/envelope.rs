//! Reference-counted message envelope.
//!
//! A [`SharedMsg`] lets several holders on different threads reference one
//! message: a sender, path entries, several destinations. The count is atomic
//! (`Arc`), and the payload is reachable only through `&Message`, so nothing
//! can change it once shared. A changed message is a new envelope.

use std::ops::Deref;
use std::sync::Arc;

use super::Message;

#[derive(Debug, Clone)]
pub struct SharedMsg(Arc<Message>);

impl SharedMsg {
    pub fn share(msg: impl Into<Message>) -> Self {
        Self(Arc::new(msg.into()))
    }

    /// Live handles to this payload, including this one.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &SharedMsg) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Take the payload out: moved when this is the last handle, copied
    /// otherwise.
    pub fn into_message(self) -> Message {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone())
    }

    /// A new envelope holding a changed copy of this payload.
    pub fn with_changes(&self, f: impl FnOnce(&mut Message)) -> SharedMsg {
        let mut copy = (*self.0).clone();
        f(&mut copy);
        SharedMsg(Arc::new(copy))
    }
}

impl Deref for SharedMsg {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.0
    }
}

impl From<Message> for SharedMsg {
    fn from(m: Message) -> Self {
        SharedMsg(Arc::new(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Data;

    #[test]
    fn last_handle_moves_payload() {
        let a = SharedMsg::share(Data::new("d"));
        let b = a.clone();
        assert_eq!(a.handle_count(), 2);
        assert!(a.ptr_eq(&b));

        let copied = a.into_message();
        assert_eq!(b.handle_count(), 1);
        assert_eq!(copied.name(), "d");
        assert_eq!(b.into_message().name(), "d");
    }

    #[test]
    fn changes_produce_a_new_envelope() {
        let a = SharedMsg::share(Data::new("d"));
        let b = a.with_changes(|m| m.header_mut().name = "e".into());
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.name(), "d");
        assert_eq!(b.name(), "e");
    }
}
