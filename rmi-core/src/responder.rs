//! The request responder: interprets a decoded message as one of the fixed
//! call kinds and executes it locally.
//!
//! Failures raised during execution are caught here and converted to an
//! `exception` response - they never propagate up through the node and kill
//! a serving loop. The decoded argument list is consumed and dropped before
//! the node sends the response, so objects referenced only by the request
//! have their releases flushed on the response frame itself.

use crate::error::RemoteException;
use crate::node::NodeInner;
use crate::value::{ObjRef, Value};
use crate::wire::MessageType;
use tracing::debug;

/// The closed set of call kinds a request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Invoke a free function by namespace and name.
    Function,
    /// Invoke a class-level member (constructors included) by class name.
    ClassMethod,
    /// Invoke a named member on a target object.
    ObjectMethod,
    /// Evaluate an expression string with bound arguments.
    Eval,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Function => "function",
            CallKind::ClassMethod => "classMethod",
            CallKind::ObjectMethod => "objectMethod",
            CallKind::Eval => "eval",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "function" => Some(CallKind::Function),
            "classMethod" => Some(CallKind::ClassMethod),
            "objectMethod" => Some(CallKind::ObjectMethod),
            "eval" => Some(CallKind::Eval),
            _ => None,
        }
    }
}

pub(crate) struct Responder<'a> {
    node: &'a NodeInner,
}

impl<'a> Responder<'a> {
    pub fn new(node: &'a NodeInner) -> Self {
        Self { node }
    }

    /// Capture the calling context. A single return value is the only
    /// context in this implementation; the hook is kept because richer
    /// call-semantics formats carry more.
    pub fn capture_context() -> i64 {
        1
    }

    /// Execute one decoded request and shape the response message.
    pub fn process_request(&self, data: Vec<Value>) -> (MessageType, Vec<Value>) {
        match self.execute(data) {
            Ok(value) => (MessageType::Result, vec![value]),
            Err(e) => {
                debug!(kind = %e.kind, message = %e.message, "request raised");
                (
                    MessageType::Exception,
                    vec![Value::Str(e.kind), Value::Str(e.message)],
                )
            }
        }
    }

    fn execute(&self, mut data: Vec<Value>) -> Result<Value, RemoteException> {
        if data.len() < 4 {
            return Err(RemoteException::argument_error(
                "request data is missing its call header",
            ));
        }
        let args = data.split_off(4);
        let mut header = data.into_iter();

        let kind_str = expect_str(header.next(), "call kind")?;
        let _context = header.next(); // single-return context, carried for parity
        let namespace = expect_str(header.next(), "namespace")?;
        let member = expect_str(header.next(), "member name")?;

        let kind = CallKind::from_str(&kind_str).ok_or_else(|| {
            RemoteException::argument_error(format!("unknown call kind '{}'", kind_str))
        })?;
        debug!(kind = kind.as_str(), %namespace, %member, argc = args.len(), "executing request");

        match kind {
            CallKind::Function => {
                let handler = self
                    .node
                    .registry
                    .function(&namespace, &member)
                    .ok_or_else(|| {
                        RemoteException::name_error(format!(
                            "no function '{}' in namespace '{}'",
                            member, namespace
                        ))
                    })?;
                handler(args)
            }
            CallKind::ClassMethod => {
                let handler = self
                    .node
                    .registry
                    .class_member(&namespace, &member)
                    .ok_or_else(|| {
                        RemoteException::name_error(format!(
                            "no class-level member '{}' on class '{}'",
                            member, namespace
                        ))
                    })?;
                handler(args)
            }
            CallKind::ObjectMethod => {
                let mut args = args;
                if args.is_empty() {
                    return Err(RemoteException::argument_error(
                        "object-method request carries no target",
                    ));
                }
                let target = args.remove(0);
                match target {
                    Value::Object(ObjRef::Local(t)) => t.call(&member, args),
                    // the target is itself foreign: calling it recurses
                    // through a deeper counter-request
                    Value::Object(ObjRef::Remote(p)) => p.call(&member, args).map_err(Into::into),
                    other => Err(RemoteException::type_error(format!(
                        "cannot invoke '{}' on a {}",
                        member,
                        other.type_name()
                    ))),
                }
            }
            CallKind::Eval => {
                let mut args = args;
                if args.is_empty() {
                    return Err(RemoteException::argument_error(
                        "eval request carries no source expression",
                    ));
                }
                let src = match args.remove(0) {
                    Value::Str(s) => s,
                    other => {
                        return Err(RemoteException::type_error(format!(
                            "eval source must be a string, not a {}",
                            other.type_name()
                        )))
                    }
                };
                self.node.registry.evaluator().eval(&src, &args)
            }
        }
    }
}

fn expect_str(value: Option<Value>, what: &str) -> Result<String, RemoteException> {
    match value {
        Some(Value::Str(s)) => Ok(s),
        other => Err(RemoteException::argument_error(format!(
            "request {} is missing or not a string: {:?}",
            what, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory_pair;
    use crate::node::Node;
    use crate::registry::Registry;
    use crate::value::RmiTarget;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Doubler;

    impl RmiTarget for Doubler {
        fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteException> {
            match method {
                "double" => Ok(Value::Int(args[0].as_i64().unwrap_or(0) * 2)),
                other => Err(RemoteException::name_error(format!(
                    "Doubler has no member '{}'",
                    other
                ))),
            }
        }

        fn type_name(&self) -> &str {
            "Doubler"
        }
    }

    fn test_node() -> Node {
        let mut registry = Registry::new();
        registry.register_function("math", "add", |args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        registry.register_function("math", "fail", |_| {
            Err(RemoteException::runtime("deliberate failure"))
        });
        let (a, _b) = memory_pair();
        Node::new(Box::new(a), Arc::new(registry))
    }

    fn request(kind: &str, ns: &str, member: &str, args: Vec<Value>) -> Vec<Value> {
        let mut data = vec![
            Value::from(kind),
            Value::Int(Responder::capture_context()),
            Value::from(ns),
            Value::from(member),
        ];
        data.extend(args);
        data
    }

    #[test]
    fn function_call_produces_result() {
        let node = test_node();
        let responder = Responder::new(&node.inner);
        let (mtype, mdata) = responder.process_request(request(
            "function",
            "math",
            "add",
            vec![Value::Int(2), Value::Int(3)],
        ));
        assert_eq!(mtype, MessageType::Result);
        assert_eq!(mdata, vec![Value::Int(5)]);
    }

    #[test]
    fn unknown_function_becomes_exception() {
        let node = test_node();
        let responder = Responder::new(&node.inner);
        let (mtype, mdata) =
            responder.process_request(request("function", "math", "missing", vec![]));
        assert_eq!(mtype, MessageType::Exception);
        assert_eq!(mdata[0], Value::from("NameError"));
    }

    #[test]
    fn handler_failure_becomes_exception() {
        let node = test_node();
        let responder = Responder::new(&node.inner);
        let (mtype, mdata) = responder.process_request(request("function", "math", "fail", vec![]));
        assert_eq!(mtype, MessageType::Exception);
        assert_eq!(mdata[0], Value::from("RuntimeError"));
        assert_eq!(mdata[1], Value::from("deliberate failure"));
    }

    #[test]
    fn object_method_dispatches_through_target() {
        let node = test_node();
        let responder = Responder::new(&node.inner);
        let target = Value::object(Arc::new(Doubler));
        let mut args = vec![target];
        args.push(Value::Int(21));
        let (mtype, mdata) =
            responder.process_request(request("objectMethod", "Doubler", "double", args));
        assert_eq!(mtype, MessageType::Result);
        assert_eq!(mdata, vec![Value::Int(42)]);
    }

    #[test]
    fn eval_evaluates_with_bound_arguments() {
        let node = test_node();
        let responder = Responder::new(&node.inner);
        let (mtype, mdata) = responder.process_request(request(
            "eval",
            "",
            "",
            vec![Value::from("$0 + $1"), Value::Int(2), Value::Int(3)],
        ));
        assert_eq!(mtype, MessageType::Result);
        assert_eq!(mdata, vec![Value::Int(5)]);
    }

    #[test]
    fn malformed_header_becomes_exception() {
        let node = test_node();
        let responder = Responder::new(&node.inner);
        let (mtype, mdata) = responder.process_request(vec![Value::Int(3)]);
        assert_eq!(mtype, MessageType::Exception);
        assert_eq!(mdata[0], Value::from("ArgumentError"));
    }
}
