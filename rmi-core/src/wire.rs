//! The wire serializer: frames one message as a single line of text.
//!
//! A frame is a 1-byte protocol-version tag followed by a bracketed,
//! comma-joined token list, in order: the three sub-protocol tags, the
//! message type, the count of released identifiers, the released identifiers
//! themselves, then the encoded `(kind, payload)` pairs flattened. Strings
//! are JSON-quoted so no literal newline ever appears inside a frame; frames
//! are newline-terminated on the wire so transports can use line-based reads.
//!
//! This layer has no knowledge of object identity: payloads are opaque
//! tokens, interpreted by the encoder above it.

use crate::error::ProtocolError;
use crate::ids::ObjectId;
use serde_json::Value as Token;
use tracing::trace;

/// The four message types exchanged between a node pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Result,
    Exception,
    Close,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Result => "result",
            MessageType::Exception => "exception",
            MessageType::Close => "close",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "request" => Some(MessageType::Request),
            "result" => Some(MessageType::Result),
            "exception" => Some(MessageType::Exception),
            "close" => Some(MessageType::Close),
            _ => None,
        }
    }
}

/// Encoding-layer kind tags. Tag 2 is reserved: the original protocol used
/// it for non-object references, a category this value model does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedKind {
    Value,
    ObjectRef,
    ReturnProxy,
}

impl EncodedKind {
    pub fn to_u8(self) -> u8 {
        match self {
            EncodedKind::Value => 0,
            EncodedKind::ObjectRef => 1,
            EncodedKind::ReturnProxy => 3,
        }
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(EncodedKind::Value),
            1 => Some(EncodedKind::ObjectRef),
            3 => Some(EncodedKind::ReturnProxy),
            _ => None,
        }
    }
}

/// One `(kind, payload)` pair produced by the encoder. The payload is an
/// opaque wire token at this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub kind: EncodedKind,
    pub payload: Token,
}

impl Encoded {
    pub fn new(kind: EncodedKind, payload: Token) -> Self {
        Self { kind, payload }
    }
}

/// One deserialized frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sproto: String,
    pub eproto: String,
    pub rproto: String,
    pub message_type: MessageType,
    pub released: Vec<ObjectId>,
    pub encoded: Vec<Encoded>,
}

/// Coexisting serializer versions, identified by the leading frame byte.
/// Exactly one is active per connection, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerVersion {
    /// The bracket itself doubles as the version symbol.
    S1,
    /// An unprintable 0x02 tag byte precedes the bracketed list.
    S2,
}

impl SerializerVersion {
    pub fn tag_byte(self) -> u8 {
        match self {
            SerializerVersion::S1 => b'[',
            SerializerVersion::S2 => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    version: SerializerVersion,
}

impl Serializer {
    pub fn new(version: SerializerVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> SerializerVersion {
        self.version
    }

    /// Emit one self-delimited frame, without the trailing newline (the
    /// channel appends it).
    pub fn serialize(&self, frame: &Frame) -> Result<String, ProtocolError> {
        let mut tokens: Vec<Token> = Vec::with_capacity(5 + frame.released.len() + frame.encoded.len() * 2);
        tokens.push(Token::from(frame.sproto.as_str()));
        tokens.push(Token::from(frame.eproto.as_str()));
        tokens.push(Token::from(frame.rproto.as_str()));
        tokens.push(Token::from(frame.message_type.as_str()));
        tokens.push(Token::from(frame.released.len() as u64));
        for id in &frame.released {
            tokens.push(Token::from(id.0));
        }
        for pair in &frame.encoded {
            tokens.push(Token::from(pair.kind.to_u8()));
            tokens.push(pair.payload.clone());
        }

        let body = serde_json::to_string(&tokens)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        trace!(message_type = frame.message_type.as_str(), len = body.len(), "serialized frame");

        match self.version {
            SerializerVersion::S1 => Ok(body),
            SerializerVersion::S2 => Ok(format!("\u{2}{}", body)),
        }
    }

    /// Parse one frame, validating the leading version tag.
    pub fn deserialize(&self, line: &str) -> Result<Frame, ProtocolError> {
        let first = *line
            .as_bytes()
            .first()
            .ok_or_else(|| ProtocolError::MalformedFrame("empty frame".into()))?;
        let expected = self.version.tag_byte();
        if first != expected {
            return Err(ProtocolError::VersionMismatch {
                expected,
                found: first,
            });
        }
        let body = match self.version {
            SerializerVersion::S1 => line,
            SerializerVersion::S2 => &line[1..],
        };

        let tokens: Vec<Token> = serde_json::from_str(body)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        let mut iter = tokens.into_iter();

        let sproto = next_str(&mut iter, "serialization protocol tag")?;
        let eproto = next_str(&mut iter, "encoding protocol tag")?;
        let rproto = next_str(&mut iter, "request protocol tag")?;

        let type_str = next_str(&mut iter, "message type")?;
        let message_type = MessageType::from_str(&type_str)
            .ok_or(ProtocolError::UnexpectedMessageType(type_str))?;

        let release_count = next_u64(&mut iter, "release count")?;
        let mut released = Vec::with_capacity(release_count as usize);
        for _ in 0..release_count {
            released.push(ObjectId(next_u64(&mut iter, "released identifier")?));
        }

        let mut encoded = Vec::new();
        while let Some(kind_token) = iter.next() {
            let kind_num = kind_token
                .as_u64()
                .ok_or_else(|| ProtocolError::MalformedFrame("kind tag is not a number".into()))?;
            let kind = EncodedKind::from_u8(kind_num as u8).ok_or_else(|| {
                ProtocolError::MalformedFrame(format!("unknown kind tag {}", kind_num))
            })?;
            let payload = iter.next().ok_or_else(|| {
                ProtocolError::MalformedFrame("kind tag without a payload".into())
            })?;
            encoded.push(Encoded::new(kind, payload));
        }

        trace!(message_type = message_type.as_str(), pairs = encoded.len(), "deserialized frame");

        Ok(Frame {
            sproto,
            eproto,
            rproto,
            message_type,
            released,
            encoded,
        })
    }
}

fn next_str(
    iter: &mut std::vec::IntoIter<Token>,
    what: &str,
) -> Result<String, ProtocolError> {
    match iter.next() {
        Some(Token::String(s)) => Ok(s),
        other => Err(ProtocolError::MalformedFrame(format!(
            "expected {}, got {:?}",
            what, other
        ))),
    }
}

fn next_u64(iter: &mut std::vec::IntoIter<Token>, what: &str) -> Result<u64, ProtocolError> {
    match iter.next() {
        Some(token) => token.as_u64().ok_or_else(|| {
            ProtocolError::MalformedFrame(format!("expected {}, got {}", what, token))
        }),
        None => Err(ProtocolError::MalformedFrame(format!(
            "expected {}, got end of frame",
            what
        ))),
    }
}
