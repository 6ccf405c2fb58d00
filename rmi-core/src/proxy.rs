//! The client-visible stand-in for a foreign value.
//!
//! Every operation on a proxy is redirected, through the node that created
//! it, to the real object on the other side. When the last clone of a proxy
//! is dropped, its identifier is queued on the owning node and flushed to
//! the peer with the next outgoing message, so the peer can eventually
//! release the real object.

use crate::error::RmiError;
use crate::ids::ObjectId;
use crate::node::NodeInner;
use crate::responder::CallKind;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

pub(crate) struct ProxyInner {
    pub(crate) node: Weak<NodeInner>,
    pub(crate) remote_id: ObjectId,
    pub(crate) remote_type: String,
}

impl fmt::Debug for ProxyInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyInner({}:{})", self.remote_type, self.remote_id)
    }
}

impl Drop for ProxyInner {
    // The explicit deregistration hook: destruction queues the identifier
    // for the release protocol. If the node is already gone the connection
    // is over and there is nothing to report.
    fn drop(&mut self) {
        if let Some(node) = self.node.upgrade() {
            trace!(id = %self.remote_id, "proxy destroyed, queueing release");
            node.received.forget(self.remote_id, self as *const ProxyInner);
            node.pending.push(self.remote_id);
        }
    }
}

/// Transparent stand-in for one object owned by the peer.
///
/// Cloning a proxy shares the same remote identity; at most one live proxy
/// exists per `(node, identifier)` pair.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proxy<{}:{}>", self.remote_type(), self.remote_id())
    }
}

impl Proxy {
    pub(crate) fn mint(node: Weak<NodeInner>, remote_id: ObjectId, remote_type: String) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                node,
                remote_id,
                remote_type,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ProxyInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ProxyInner> {
        &self.inner
    }

    /// The identifier the peer minted for the real object.
    pub fn remote_id(&self) -> ObjectId {
        self.inner.remote_id
    }

    /// The declared type name of the real object.
    pub fn remote_type(&self) -> &str {
        &self.inner.remote_type
    }

    /// True when both proxies stand in for the same remote identity.
    pub fn same_identity(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn belongs_to(&self, node: &NodeInner) -> bool {
        std::ptr::eq(self.inner.node.as_ptr(), node as *const NodeInner)
    }

    /// Invoke a named member on the real object, across the connection.
    pub fn call(&self, method: &str, mut args: Vec<Value>) -> Result<Value, RmiError> {
        let node = self
            .inner
            .node
            .upgrade()
            .ok_or(crate::error::ProtocolError::ConnectionClosed)?;
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::from(self.clone()));
        data.append(&mut args);
        node.call(
            CallKind::ObjectMethod,
            &self.inner.remote_type,
            method,
            data,
            Default::default(),
        )
    }
}
