use crate::error::RemoteException;
use crate::proxy::Proxy;
use std::fmt;
use std::sync::Arc;

/// The capability-set interface a local object exposes when it is passed to
/// the peer by reference. Every instance-method request arriving for the
/// object is routed through [`RmiTarget::call`].
pub trait RmiTarget: Send + Sync + fmt::Debug {
    /// Invoke a named member on this object.
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteException>;

    /// The declared type name, carried to the peer so its proxy can answer
    /// introspection-style questions and route `objectMethod` calls.
    fn type_name(&self) -> &str;

    /// Optional expression rendering used only by the copy escape hatch:
    /// when a call is made with `CallOptions { copy: true }`, arguments whose
    /// target returns `Some(source)` here are materialized on the peer by
    /// evaluating that source, instead of being proxied. Targets returning
    /// `None` (the default) always travel by reference.
    fn to_expr(&self) -> Option<String> {
        None
    }
}

/// A non-primitive value: either an object owned by this side, or a proxy
/// for an object owned by the peer.
#[derive(Clone)]
pub enum ObjRef {
    Local(Arc<dyn RmiTarget>),
    Remote(Proxy),
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjRef::Local(t) => write!(f, "Local<{}>", t.type_name()),
            ObjRef::Remote(p) => write!(f, "Remote<{}:{}>", p.remote_type(), p.remote_id()),
        }
    }
}

/// One call argument or return value.
///
/// Primitives pass by copy. Objects pass by reference only: the encoder
/// replaces them with identifiers and never descends into them.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ObjRef),
}

impl Value {
    pub fn object(target: Arc<dyn RmiTarget>) -> Self {
        Value::Object(ObjRef::Local(target))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Object(ObjRef::Remote(_)))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&Arc<dyn RmiTarget>> {
        match self {
            Value::Object(ObjRef::Local(t)) => Some(t),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Object(ObjRef::Remote(p)) => Some(p),
            _ => None,
        }
    }

    /// A human-readable type tag, used in dispatch error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(ObjRef::Local(t)) => t.type_name(),
            Value::Object(ObjRef::Remote(p)) => p.remote_type(),
        }
    }
}

// Primitives compare by value; objects by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(ObjRef::Local(a)), Value::Object(ObjRef::Local(b))) => {
                Arc::ptr_eq(a, b)
            }
            (Value::Object(ObjRef::Remote(a)), Value::Object(ObjRef::Remote(b))) => {
                a.same_identity(b)
            }
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Object(ObjRef::Remote(p))
    }
}
