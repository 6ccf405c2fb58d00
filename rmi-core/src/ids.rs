use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier minted by a node for an object it has exposed to its peer.
///
/// Identifiers are only meaningful within the connection that minted them:
/// the sender keys its sent-object table by them, and the receiver keys its
/// proxy table by them. The same object is always re-sent under the same
/// identifier for the life of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Obj#{}", self.0)
    }
}

/// Allocator for locally-minted object identifiers. One per node.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> ObjectId {
        ObjectId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_sequential() {
        let allocator = IdAllocator::new();
        assert_eq!(allocator.allocate(), ObjectId(1));
        assert_eq!(allocator.allocate(), ObjectId(2));
        assert_eq!(allocator.allocate(), ObjectId(3));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", ObjectId(42)), "Obj#42");
    }

    #[test]
    fn serde_transparent() {
        let id = ObjectId(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
