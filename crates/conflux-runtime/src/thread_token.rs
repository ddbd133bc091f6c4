//! Thread-affinity capability.
//!
//! A `ThreadToken<T>` can only be obtained on the thread that owns `T`, and is
//! neither `Send` nor `Sync`. Anything holding one (every env handed to a
//! callback) is therefore pinned to the owning thread by the type system.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use conflux_core::error::{ConfluxError, Result};

pub struct ThreadToken<T> {
    owner: ThreadId,
    _pinned: PhantomData<*const T>,
}

impl<T> ThreadToken<T> {
    pub(crate) fn acquire(owner: ThreadId) -> Result<Self> {
        let current = thread::current().id();
        if current != owner {
            return Err(ConfluxError::integrity(format!(
                "{} accessed from {current:?}, owned by {owner:?}",
                std::any::type_name::<T>()
            )));
        }
        Ok(Self {
            owner,
            _pinned: PhantomData,
        })
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn check(&self) {
        debug_assert_eq!(thread::current().id(), self.owner, "thread token moved threads");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::ErrorCode;

    struct Owned;

    #[test]
    fn only_the_owner_thread_acquires() {
        let owner = thread::current().id();
        let token = ThreadToken::<Owned>::acquire(owner).unwrap();
        token.check();

        let joined = thread::spawn(move || ThreadToken::<Owned>::acquire(owner).err()).join();
        if cfg!(debug_assertions) {
            // the violation asserts before returning
            assert!(joined.is_err());
        } else {
            let err = joined.unwrap().unwrap();
            assert_eq!(err.code(), ErrorCode::IntegrityViolation);
        }
    }
}
