//! Per-node identity tables.
//!
//! `SentObjects` holds every local object this side has exposed to the peer,
//! keyed by its minted identifier; the entry is what keeps the object alive
//! on behalf of the remote proxy. `ReceivedObjects` holds a weak handle to
//! the local proxy for each peer-minted identifier, so proxy destruction is
//! observable. These tables are private, per-node state - never shared
//! across connections.

use crate::ids::{IdAllocator, ObjectId};
use crate::proxy::{Proxy, ProxyInner};
use crate::value::RmiTarget;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::trace;

/// Objects this side has sent by reference, keyed by minted identifier.
#[derive(Debug, Default)]
pub(crate) struct SentObjects {
    entries: DashMap<ObjectId, Arc<dyn RmiTarget>>,
    // Reverse map keyed by Arc pointer identity, so re-sending the same
    // object reuses its identifier.
    id_by_ptr: DashMap<usize, ObjectId>,
    allocator: IdAllocator,
}

fn ptr_key(target: &Arc<dyn RmiTarget>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

impl SentObjects {
    /// Mint an identifier for `target`, or reuse the one from a prior send.
    pub fn id_for(&self, target: &Arc<dyn RmiTarget>) -> ObjectId {
        let key = ptr_key(target);
        if let Some(existing) = self.id_by_ptr.get(&key) {
            return *existing;
        }
        let id = self.allocator.allocate();
        self.id_by_ptr.insert(key, id);
        self.entries.insert(id, Arc::clone(target));
        trace!(%id, type_name = target.type_name(), "exposed object to peer");
        id
    }

    pub fn resolve(&self, id: ObjectId) -> Option<Arc<dyn RmiTarget>> {
        self.entries.get(&id).map(|e| Arc::clone(&e))
    }

    /// Remove a released identifier. Returns false if it was not present,
    /// which the caller logs as a benign race, never an error.
    pub fn release(&self, id: ObjectId) -> bool {
        match self.entries.remove(&id) {
            Some((_, target)) => {
                self.id_by_ptr.remove(&ptr_key(&target));
                trace!(%id, "released sent object");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Proxies this side holds for peer objects, weakly, keyed by the peer's
/// identifier. At most one live proxy exists per identifier.
#[derive(Debug, Default)]
pub(crate) struct ReceivedObjects {
    entries: DashMap<ObjectId, Weak<ProxyInner>>,
}

impl ReceivedObjects {
    /// Look up the live proxy for `id`, pruning a dead entry if its proxy
    /// has been destroyed.
    pub fn get(&self, id: ObjectId) -> Option<Proxy> {
        let upgraded = self.entries.get(&id).and_then(|w| w.upgrade());
        match upgraded {
            Some(inner) => Some(Proxy::from_inner(inner)),
            None => {
                self.entries.remove_if(&id, |_, w| w.upgrade().is_none());
                None
            }
        }
    }

    pub fn insert(&self, id: ObjectId, inner: &Arc<ProxyInner>) {
        self.entries.insert(id, Arc::downgrade(inner));
    }

    /// Drop the entry for `id`, but only if it still refers to `inner`
    /// (the proxy being destroyed).
    pub fn forget(&self, id: ObjectId, inner: *const ProxyInner) {
        self.entries
            .remove_if(&id, |_, w| std::ptr::eq(w.as_ptr(), inner));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Identifiers whose local proxy has been destroyed since the last outgoing
/// message; flushed with every send.
#[derive(Debug, Default)]
pub(crate) struct ReleaseQueue {
    ids: Mutex<Vec<ObjectId>>,
}

impl ReleaseQueue {
    pub fn push(&self, id: ObjectId) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.push(id);
        }
    }

    pub fn drain(&self) -> Vec<ObjectId> {
        match self.ids.lock() {
            Ok(mut ids) => std::mem::take(&mut *ids),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteException;
    use crate::value::Value;

    #[derive(Debug)]
    struct Inert;

    impl RmiTarget for Inert {
        fn call(&self, _method: &str, _args: Vec<Value>) -> Result<Value, RemoteException> {
            Ok(Value::Null)
        }

        fn type_name(&self) -> &str {
            "Inert"
        }
    }

    #[test]
    fn identifier_assignment_is_idempotent() {
        let sent = SentObjects::default();
        let a: Arc<dyn RmiTarget> = Arc::new(Inert);
        let b: Arc<dyn RmiTarget> = Arc::new(Inert);

        let id_a = sent.id_for(&a);
        assert_eq!(sent.id_for(&a), id_a);
        assert_ne!(sent.id_for(&b), id_a);
        assert_eq!(sent.len(), 2);
    }

    #[test]
    fn release_removes_entry_and_allows_new_identifier() {
        let sent = SentObjects::default();
        let a: Arc<dyn RmiTarget> = Arc::new(Inert);
        let id = sent.id_for(&a);

        assert!(sent.release(id));
        assert!(!sent.release(id));
        assert_eq!(sent.len(), 0);
        assert!(sent.resolve(id).is_none());

        // once released, a re-send mints a fresh identifier
        assert_ne!(sent.id_for(&a), id);
    }

    #[test]
    fn release_queue_drains() {
        let queue = ReleaseQueue::default();
        queue.push(ObjectId(1));
        queue.push(ObjectId(2));
        assert_eq!(queue.drain(), vec![ObjectId(1), ObjectId(2)]);
        assert!(queue.drain().is_empty());
    }
}
