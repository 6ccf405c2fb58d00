//! The reference encoder: converts between real call arguments (which may
//! contain object references) and a flat list of `(kind, payload)` pairs
//! with no references.
//!
//! Encoding never descends into a value: an object is replaced by an
//! identifier in one pass, and the receiver reconstructs nothing - it only
//! resolves identifiers back to objects or proxies. The encoded list is
//! twice the length of the input, one tag and one payload per element.
//!
//! An `objectRef` payload is the composite token `"TypeName#id"`, carrying
//! the declared type alongside the identity so the receiving side can mint
//! a typed proxy. A `returnProxy` payload is the bare identifier the
//! receiver minted earlier.

use crate::error::{ProtocolError, RemoteException, RmiError};
use crate::ids::ObjectId;
use crate::node::NodeInner;
use crate::proxy::Proxy;
use crate::value::{ObjRef, Value};
use crate::wire::{Encoded, EncodedKind};
use serde_json::Value as Token;
use tracing::trace;

/// Per-call serialization control.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Force an inline value copy instead of a proxy, for arguments whose
    /// target supplies an expression rendering (`RmiTarget::to_expr`). The
    /// value is materialized on the peer via expression evaluation and the
    /// result substituted. Targets without a rendering still travel by
    /// reference. A narrow escape hatch for values that proxy poorly, not
    /// the default path.
    pub copy: bool,
}

pub(crate) struct Encoder<'a> {
    node: &'a NodeInner,
}

impl<'a> Encoder<'a> {
    pub fn new(node: &'a NodeInner) -> Self {
        Self { node }
    }

    pub fn encode(&self, values: &[Value], opts: CallOptions) -> Result<Vec<Encoded>, RmiError> {
        values
            .iter()
            .map(|v| self.encode_one(v, opts.copy))
            .collect()
    }

    fn encode_one(&self, value: &Value, copy: bool) -> Result<Encoded, RmiError> {
        match value {
            Value::Null => Ok(Encoded::new(EncodedKind::Value, Token::Null)),
            Value::Bool(b) => Ok(Encoded::new(EncodedKind::Value, Token::from(*b))),
            Value::Int(i) => Ok(Encoded::new(EncodedKind::Value, Token::from(*i))),
            Value::Float(f) => {
                let n = serde_json::Number::from_f64(*f).ok_or_else(|| {
                    RmiError::Remote(RemoteException::argument_error(
                        "non-finite float cannot be encoded",
                    ))
                })?;
                Ok(Encoded::new(EncodedKind::Value, Token::Number(n)))
            }
            Value::Str(s) => Ok(Encoded::new(EncodedKind::Value, Token::from(s.as_str()))),
            Value::Object(ObjRef::Remote(proxy)) => {
                if !proxy.belongs_to(self.node) {
                    return Err(RmiError::Remote(RemoteException::argument_error(
                        "cannot pass a proxy belonging to another connection",
                    )));
                }
                // the peer owns the real object; hand its identifier back
                trace!(id = %proxy.remote_id(), "encoding return-proxy");
                Ok(Encoded::new(
                    EncodedKind::ReturnProxy,
                    Token::from(proxy.remote_id().0),
                ))
            }
            Value::Object(ObjRef::Local(target)) => {
                if copy {
                    if let Some(src) = target.to_expr() {
                        let copied = self.node.eval_on_peer(&src)?;
                        return self.encode_one(&copied, false);
                    }
                }
                if let Some(allowed) = &self.node.config.allowed_types {
                    if !allowed.contains(target.type_name()) {
                        return Err(RmiError::Remote(RemoteException::argument_error(format!(
                            "objects of type {} cannot be passed from this node",
                            target.type_name()
                        ))));
                    }
                }
                let id = self.node.sent.id_for(target);
                Ok(Encoded::new(
                    EncodedKind::ObjectRef,
                    Token::from(format!("{}#{}", target.type_name(), id.0)),
                ))
            }
        }
    }

    pub fn decode(&self, encoded: Vec<Encoded>) -> Result<Vec<Value>, RmiError> {
        encoded.into_iter().map(|e| self.decode_one(e)).collect()
    }

    fn decode_one(&self, encoded: Encoded) -> Result<Value, RmiError> {
        match encoded.kind {
            EncodedKind::Value => decode_primitive(encoded.payload),
            EncodedKind::ObjectRef => {
                let (type_name, id) = parse_object_ref(&encoded.payload)?;
                if let Some(existing) = self.node.received.get(id) {
                    return Ok(Value::from(existing));
                }
                let proxy = Proxy::mint(self.node.self_weak.clone(), id, type_name);
                self.node.received.insert(id, proxy.inner());
                trace!(%id, "minted proxy for peer object");
                Ok(Value::from(proxy))
            }
            EncodedKind::ReturnProxy => {
                let id = ObjectId(encoded.payload.as_u64().ok_or_else(|| {
                    ProtocolError::MalformedFrame("return-proxy payload is not an identifier".into())
                })?);
                let target = self
                    .node
                    .sent
                    .resolve(id)
                    .ok_or(ProtocolError::UnknownReturnedIdentifier(id))?;
                trace!(%id, "resolved returned identifier to local object");
                Ok(Value::Object(ObjRef::Local(target)))
            }
        }
    }
}

fn decode_primitive(token: Token) -> Result<Value, RmiError> {
    match token {
        Token::Null => Ok(Value::Null),
        Token::Bool(b) => Ok(Value::Bool(b)),
        Token::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(ProtocolError::MalformedFrame(format!("unrepresentable number {}", n)).into())
            }
        }
        Token::String(s) => Ok(Value::Str(s)),
        other => {
            Err(ProtocolError::MalformedFrame(format!("nested token {} in value slot", other))
                .into())
        }
    }
}

fn parse_object_ref(payload: &Token) -> Result<(String, ObjectId), RmiError> {
    let text = payload.as_str().ok_or_else(|| {
        ProtocolError::MalformedFrame("object-ref payload is not a string".into())
    })?;
    let (type_name, id_text) = text.rsplit_once('#').ok_or_else(|| {
        ProtocolError::MalformedFrame(format!("object-ref payload '{}' lacks an identifier", text))
    })?;
    let id = id_text.parse::<u64>().map_err(|_| {
        ProtocolError::MalformedFrame(format!("bad identifier in object-ref payload '{}'", text))
    })?;
    Ok((type_name.to_owned(), ObjectId(id)))
}
