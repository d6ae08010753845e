//! Core identifier types used throughout the system
//!
//! These are fundamental aliases and constructors used by all modules.
//! They provide semantic meaning and enable future type evolution.

use uuid::Uuid;

/// User ID - opaque 24-hex identifier assigned by the durable store.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Opaque**: Callers must not parse structure out of it
pub type UserId = String;

/// Entrust ID - externally visible correlation key for an order family.
///
/// A cancel order issued against an open order carries the SAME entrust id
/// as its target; the entrust queue keeps them apart with a reserved
/// `<id>_cancel` key.
pub type EntrustId = String;

/// Stock code - `SYMBOL.EXCHANGE`, e.g. `600519.SH`.
pub type StockCode = String;

const OBJECT_ID_BYTES: usize = 12;

/// Allocate a fresh 24-hex identifier.
///
/// The durable store's native ids are 24 hex chars; entrust ids share the
/// format so they can be indexed the same way.
pub fn new_object_id() -> String {
    let entropy = Uuid::new_v4();
    hex::encode(&entropy.as_bytes()[..OBJECT_ID_BYTES])
}

/// Check that a string is a well-formed 24-hex identifier.
pub fn is_object_id(s: &str) -> bool {
    s.len() == OBJECT_ID_BYTES * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_object_id_shape() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(is_object_id(&id));
    }

    #[test]
    fn test_new_object_id_unique() {
        assert_ne!(new_object_id(), new_object_id());
    }

    #[test]
    fn test_is_object_id_rejects_junk() {
        assert!(!is_object_id("zzzzzzzzzzzzzzzzzzzzzzzz"));
        assert!(!is_object_id("abc123"));
        assert!(is_object_id("5f4d1c2b3a4f5e6d7c8b9a0f"));
    }
}
