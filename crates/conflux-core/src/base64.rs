//! Standard-alphabet base64 helpers.
//!
//! Used for the JSON form of `buf` fields and by bindings that ship binary
//! payloads through text channels.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{ConfluxError, Result};

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| ConfluxError::InvalidArgument(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        let encoded = encode(b"how_are_you_this_morning");
        assert_eq!(encoded, "aG93X2FyZV95b3VfdGhpc19tb3JuaW5n");
        assert_eq!(decode(&encoded).unwrap(), b"how_are_you_this_morning");
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("not base64!").is_err());
    }
}
