//! Core of a synchronous distributed-object RPC protocol.
//!
//! Two connected nodes exchange line-framed text messages. Primitive values
//! travel by copy; everything else travels by reference and is manipulated
//! through transparent proxies. Calls are synchronous and recursive: while a
//! node waits for a response it services any counter-requests the peer
//! issues, so object graphs spanning both sides can call back and forth
//! freely on one connection.
//!
//! Concrete transports live in `rmi-transport`; this crate supplies the
//! protocol itself plus an in-memory stream pair for same-process use.

pub mod channel;
pub mod encode;
pub mod error;
pub mod eval;
pub mod ids;
pub mod node;
pub mod proxy;
pub mod registry;
pub mod responder;
mod tables;
pub mod value;
pub mod wire;

pub use channel::{memory_pair, MemoryStream, MessageStream};
pub use encode::CallOptions;
pub use error::{ProtocolError, RemoteException, RmiError};
pub use eval::{Evaluator, ExprEvaluator};
pub use ids::ObjectId;
pub use node::{Node, NodeConfig};
pub use proxy::Proxy;
pub use registry::Registry;
pub use responder::CallKind;
pub use value::{ObjRef, RmiTarget, Value};
pub use wire::SerializerVersion;
