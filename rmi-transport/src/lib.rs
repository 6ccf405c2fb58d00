//! Blocking transports for the rmi protocol.
//!
//! Every transport is a [`rmi_core::MessageStream`]: a duplex, ordered
//! stream of newline-framed text lines. The protocol never sees anything
//! below that.

pub mod child;
pub mod stream;
pub mod tcp;

pub use child::ChildChannel;
pub use stream::LineStream;
pub use tcp::{TcpChannel, DEFAULT_PORT};
