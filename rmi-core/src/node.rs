//! One endpoint of a duplex connection.
//!
//! A node owns the channel and the identity tables, and drives the full
//! request -> (possibly nested counter-requests) -> response cycle. A single
//! connection is simultaneously a client and a server: "who is waiting for
//! what" is tracked purely by call-stack recursion, not by connection role.
//! A process acting only as a caller must still be prepared to execute
//! requests, because objects it passed by reference can be called back into.

use crate::channel::MessageStream;
use crate::encode::{CallOptions, Encoder};
use crate::error::{ProtocolError, RemoteException, RmiError};
use crate::registry::Registry;
use crate::responder::{CallKind, Responder};
use crate::tables::{ReceivedObjects, ReleaseQueue, SentObjects};
use crate::value::Value;
use crate::wire::{Frame, MessageType, Serializer, SerializerVersion};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace, warn};

/// Per-connection configuration: the three sub-protocol tags, the active
/// serializer version, and an optional allow-list of type names the encoder
/// may expose by reference. Fixed at construction, never renegotiated.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub serialization_protocol: String,
    pub encoding_protocol: String,
    pub request_protocol: String,
    pub serializer: SerializerVersion,
    pub allowed_types: Option<HashSet<String>>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            serialization_protocol: "s1".to_owned(),
            encoding_protocol: "e1".to_owned(),
            request_protocol: "r1".to_owned(),
            serializer: SerializerVersion::S1,
            allowed_types: None,
        }
    }
}

pub(crate) struct NodeInner {
    pub(crate) self_weak: Weak<NodeInner>,
    channel: Mutex<Box<dyn MessageStream>>,
    serializer: Serializer,
    pub(crate) config: NodeConfig,
    pub(crate) sent: SentObjects,
    pub(crate) received: ReceivedObjects,
    pub(crate) pending: ReleaseQueue,
    pub(crate) registry: Arc<Registry>,
    closed: AtomicBool,
}

impl NodeInner {
    fn channel(&self) -> MutexGuard<'_, Box<dyn MessageStream>> {
        // a poisoned lock only means a peer thread panicked mid-write; the
        // stream state is still the best we have
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn call(
        &self,
        kind: CallKind,
        namespace: &str,
        member: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<Value, RmiError> {
        debug!(kind = kind.as_str(), %namespace, %member, argc = args.len(), "sending request");

        let context = Responder::capture_context();
        let mut data = Vec::with_capacity(args.len() + 4);
        data.push(Value::from(kind.as_str()));
        data.push(Value::Int(context));
        data.push(Value::from(namespace));
        data.push(Value::from(member));
        data.extend(args);
        self.send_message(MessageType::Request, data, opts)?;

        loop {
            let (message_type, message_data) = self.receive_message()?;
            match message_type {
                MessageType::Result => {
                    return Ok(message_data.into_iter().next().unwrap_or(Value::Null));
                }
                MessageType::Exception => {
                    let mut parts = message_data.into_iter();
                    let kind = match parts.next() {
                        Some(Value::Str(s)) => s,
                        _ => "RuntimeError".to_owned(),
                    };
                    let message = match parts.next() {
                        Some(Value::Str(s)) => s,
                        _ => String::new(),
                    };
                    return Err(RmiError::Remote(RemoteException::new(kind, message)));
                }
                MessageType::Close => {
                    return Err(ProtocolError::ConnectionClosed.into());
                }
                MessageType::Request => {
                    // a counter-request: the peer, while servicing our call,
                    // needs something that lives on this side. Service it and
                    // keep waiting for the real answer.
                    trace!("servicing counter-request");
                    let (response_type, response_data) =
                        Responder::new(self).process_request(message_data);
                    self.send_message(response_type, response_data, CallOptions::default())?;
                }
            }
        }
    }

    pub(crate) fn serve_one(&self) -> Result<bool, RmiError> {
        let (message_type, message_data) = self.receive_message()?;
        match message_type {
            MessageType::Request => {
                let (response_type, response_data) =
                    Responder::new(self).process_request(message_data);
                self.send_message(response_type, response_data, CallOptions::default())?;
                Ok(true)
            }
            MessageType::Close => Ok(false),
            other => {
                Err(ProtocolError::UnexpectedMessageType(other.as_str().to_owned()).into())
            }
        }
    }

    pub(crate) fn eval_on_peer(&self, src: &str) -> Result<Value, RmiError> {
        self.call(
            CallKind::Eval,
            "",
            "",
            vec![Value::from(src)],
            CallOptions::default(),
        )
    }

    fn send_message(
        &self,
        message_type: MessageType,
        data: Vec<Value>,
        opts: CallOptions,
    ) -> Result<(), RmiError> {
        let encoded = Encoder::new(self).encode(&data, opts)?;
        // Dropping the data now lets proxies referenced only by this message
        // queue their release in time to ride on this very frame.
        drop(data);
        let released = self.pending.drain();

        let frame = Frame {
            sproto: self.config.serialization_protocol.clone(),
            eproto: self.config.encoding_protocol.clone(),
            rproto: self.config.request_protocol.clone(),
            message_type,
            released,
            encoded,
        };
        let line = self.serializer.serialize(&frame)?;
        trace!(message_type = message_type.as_str(), "sending frame");
        self.channel().send_line(&line).map_err(ProtocolError::Io)?;
        Ok(())
    }

    fn receive_message(&self) -> Result<(MessageType, Vec<Value>), RmiError> {
        let line = self.channel().recv_line().map_err(ProtocolError::Io)?;
        let Some(line) = line else {
            debug!("peer closed the connection");
            self.closed.store(true, Ordering::SeqCst);
            return Ok((MessageType::Close, Vec::new()));
        };

        let frame = self.serializer.deserialize(&line)?;
        if frame.sproto != self.config.serialization_protocol
            || frame.eproto != self.config.encoding_protocol
            || frame.rproto != self.config.request_protocol
        {
            warn!(
                sproto = %frame.sproto,
                eproto = %frame.eproto,
                rproto = %frame.rproto,
                "peer sub-protocol tags do not match this connection's configuration"
            );
        }

        // decode before applying releases: a frame may hand an identifier
        // back and release it in the same breath
        let values = Encoder::new(self).decode(frame.encoded)?;
        for id in frame.released {
            if !self.sent.release(id) {
                warn!(%id, "peer released an identifier not in the sent-object table");
            }
        }
        Ok((frame.message_type, values))
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.channel().close()
    }
}

/// One endpoint of a duplex connection. Cloning shares the endpoint.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("sent", &self.inner.sent.len())
            .field("received", &self.inner.received.len())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Node {
    pub fn new(channel: Box<dyn MessageStream>, registry: Arc<Registry>) -> Self {
        Self::with_config(channel, registry, NodeConfig::default())
    }

    pub fn with_config(
        channel: Box<dyn MessageStream>,
        registry: Arc<Registry>,
        config: NodeConfig,
    ) -> Self {
        let serializer = Serializer::new(config.serializer);
        let inner = Arc::new_cyclic(|self_weak| NodeInner {
            self_weak: self_weak.clone(),
            channel: Mutex::new(channel),
            serializer,
            config,
            sent: SentObjects::default(),
            received: ReceivedObjects::default(),
            pending: ReleaseQueue::default(),
            registry,
            closed: AtomicBool::new(false),
        });
        Self { inner }
    }

    /// Send one request and block until its response arrives, servicing any
    /// counter-requests the peer issues along the way.
    pub fn call(
        &self,
        kind: CallKind,
        namespace: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value, RmiError> {
        self.inner
            .call(kind, namespace, member, args, CallOptions::default())
    }

    /// Like [`Node::call`], with per-call serialization control.
    pub fn call_with(
        &self,
        opts: CallOptions,
        kind: CallKind,
        namespace: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value, RmiError> {
        self.inner.call(kind, namespace, member, args, opts)
    }

    /// Block for exactly one incoming message. A request is executed and
    /// answered and `true` is returned; a close returns `false` without
    /// sending anything. Listening sides call this in a loop.
    pub fn serve_one(&self) -> Result<bool, RmiError> {
        self.inner.serve_one()
    }

    /// Close the channel. A duplex handle is closed exactly once.
    pub fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of local objects currently exposed to the peer.
    pub fn sent_count(&self) -> usize {
        self.inner.sent.len()
    }

    /// Number of live proxies for peer objects.
    pub fn received_count(&self) -> usize {
        self.inner.received.len()
    }
}
