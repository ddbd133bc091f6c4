//! Byte buffers carried by `Data`, audio frames, video frames and `Value::Buf`.
//!
//! A buffer is either owned by its holder or borrowed from someone else.
//! Cloning an owned buffer copies the bytes into fresh owned storage; cloning a
//! borrowed (or released) buffer shares the same storage and stays borrowed, so
//! no clone ever becomes a second owner.

use bytes::Bytes;

use crate::fatal;

#[derive(Debug)]
enum Repr {
    Owned(Vec<u8>),
    Borrowed(Bytes),
}

#[derive(Debug)]
pub struct Buf {
    repr: Repr,
}

impl Buf {
    /// Zero-filled owned buffer. Aborts on allocation failure.
    pub fn alloc(len: usize) -> Self {
        Self {
            repr: Repr::Owned(fatal::alloc_zeroed(len)),
        }
    }

    pub fn from_vec(v: Vec<u8>) -> Self {
        Self {
            repr: Repr::Owned(v),
        }
    }

    pub fn borrowed(bytes: Bytes) -> Self {
        Self {
            repr: Repr::Borrowed(bytes),
        }
    }

    pub fn empty() -> Self {
        Self::borrowed(Bytes::new())
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.repr, Repr::Owned(_))
    }

    /// Hand the storage to another holder.
    ///
    /// The buffer keeps a borrowed view of the same bytes; later clones share
    /// it instead of copying.
    pub fn release_ownership(&mut self) -> Bytes {
        let bytes = match std::mem::replace(&mut self.repr, Repr::Borrowed(Bytes::new())) {
            Repr::Owned(v) => Bytes::from(v),
            Repr::Borrowed(b) => b,
        };
        self.repr = Repr::Borrowed(bytes.clone());
        bytes
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.repr {
            Repr::Owned(v) => v,
            Repr::Borrowed(b) => b,
        }
    }

    /// Writable view; only owned buffers are writable.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match &mut self.repr {
            Repr::Owned(v) => Some(v.as_mut_slice()),
            Repr::Borrowed(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both buffers view the same borrowed storage.
    pub fn shares_storage_with(&self, other: &Buf) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Borrowed(a), Repr::Borrowed(b)) => {
                !a.is_empty() && a.as_ptr() == b.as_ptr() && a.len() == b.len()
            }
            _ => false,
        }
    }
}

impl Clone for Buf {
    fn clone(&self) -> Self {
        match &self.repr {
            Repr::Owned(v) => {
                let mut copy = fatal::alloc_zeroed(v.len());
                copy.copy_from_slice(v);
                Self::from_vec(copy)
            }
            Repr::Borrowed(b) => Self::borrowed(b.clone()),
        }
    }
}

impl Default for Buf {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Buf {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl From<Vec<u8>> for Buf {
    fn from(v: Vec<u8>) -> Self {
        Self::from_vec(v)
    }
}

impl From<&[u8]> for Buf {
    fn from(v: &[u8]) -> Self {
        Self::from_vec(v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_clone_copies() {
        let mut a = Buf::alloc(4);
        a.as_mut_slice().unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let b = a.clone();
        assert!(b.is_owned());
        assert_eq!(a, b);
        assert_ne!(a.as_slice().as_ptr(), b.as_slice().as_ptr());
    }

    #[test]
    fn released_clone_shares_and_stays_borrowed() {
        let mut a = Buf::from_vec(vec![9; 8]);
        let handed_off = a.release_ownership();
        assert!(!a.is_owned());
        assert!(a.as_mut_slice().is_none());

        let b = a.clone();
        assert!(!b.is_owned());
        assert!(a.shares_storage_with(&b));
        assert_eq!(handed_off.as_ptr(), b.as_slice().as_ptr());
    }
}
