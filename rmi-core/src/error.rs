use crate::ids::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatal wire-level failures: the frame or the exchange itself is broken.
///
/// A `ProtocolError` always aborts the in-progress call. The connection may
/// survive if the corruption was confined to one message, but callers should
/// default to treating it as connection-fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("serializer version byte {found:#04x} does not match expected {expected:#04x}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(String),

    #[error("peer returned identifier {0}, which was never sent from this side")]
    UnknownReturnedIdentifier(ObjectId),

    #[error("connection closed while a response was expected")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// An application-level failure raised while the peer executed a request.
///
/// The peer's error kind and message are carried verbatim. Fatal to the call
/// only; the connection remains usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteException {
    pub kind: String,
    pub message: String,
}

impl RemoteException {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }

    pub fn name_error(message: impl Into<String>) -> Self {
        Self::new("NameError", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn argument_error(message: impl Into<String>) -> Self {
        Self::new("ArgumentError", message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message)
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// Umbrella error for one call through a node.
#[derive(Debug, thiserror::Error)]
pub enum RmiError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("remote exception: {0}")]
    Remote(#[from] RemoteException),
}

impl From<std::io::Error> for RmiError {
    fn from(err: std::io::Error) -> Self {
        RmiError::Protocol(ProtocolError::Io(err))
    }
}

// Handlers that invoke proxies want `?` on node calls; a protocol failure
// inside a handler is reported to the peer as an exception of this kind.
impl From<RmiError> for RemoteException {
    fn from(err: RmiError) -> Self {
        match err {
            RmiError::Remote(e) => e,
            RmiError::Protocol(p) => RemoteException::new("ProtocolError", p.to_string()),
        }
    }
}
