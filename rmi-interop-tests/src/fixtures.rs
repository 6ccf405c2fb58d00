//! Shared fixtures for cross-node scenario tests.

use rmi_core::{memory_pair, Node, RemoteException, Registry, RmiTarget, Value};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A stateful target whose mutations must be observable across calls.
#[derive(Debug, Default)]
pub struct Counter {
    count: Mutex<i64>,
}

impl Counter {
    pub fn count(&self) -> i64 {
        self.count.lock().map(|c| *c).unwrap_or(0)
    }
}

impl RmiTarget for Counter {
    fn call(&self, method: &str, _args: Vec<Value>) -> Result<Value, RemoteException> {
        let mut count = self
            .count
            .lock()
            .map_err(|_| RemoteException::runtime("counter poisoned"))?;
        match method {
            "increment" => {
                *count += 1;
                Ok(Value::Int(*count))
            }
            "value" => Ok(Value::Int(*count)),
            other => Err(RemoteException::name_error(format!(
                "Counter has no member '{}'",
                other
            ))),
        }
    }

    fn type_name(&self) -> &str {
        "Counter"
    }
}

/// A target that can render itself as an expression, so it may travel by
/// copy instead of by reference.
#[derive(Debug)]
pub struct ExprLiteral {
    pub src: String,
}

impl RmiTarget for ExprLiteral {
    fn call(&self, _method: &str, _args: Vec<Value>) -> Result<Value, RemoteException> {
        Err(RemoteException::name_error("ExprLiteral is inert"))
    }

    fn type_name(&self) -> &str {
        "ExprLiteral"
    }

    fn to_expr(&self) -> Option<String> {
        Some(self.src.clone())
    }
}

/// The registry a typical serving side exposes in these scenarios.
pub fn demo_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_function("math", "add", |args| {
        let a = args[0].as_i64().unwrap_or(0);
        let b = args[1].as_i64().unwrap_or(0);
        Ok(Value::Int(a + b))
    });
    registry.register_function("util", "identity", |mut args| {
        if args.is_empty() {
            return Err(RemoteException::argument_error("identity takes one value"));
        }
        Ok(args.remove(0))
    });
    registry.register_function("util", "type_of", |args| {
        let name = args
            .first()
            .map(|v| v.type_name().to_owned())
            .unwrap_or_default();
        Ok(Value::Str(name))
    });
    registry.register_function("util", "bump_twice", |args| {
        let proxy = args
            .first()
            .and_then(Value::as_proxy)
            .ok_or_else(|| RemoteException::argument_error("bump_twice takes a counter"))?;
        proxy.call("increment", vec![])?;
        proxy.call("increment", vec![])?;
        Ok(Value::Null)
    });
    registry.register_class_member("Counter", "new", |_args| {
        Ok(Value::object(Arc::new(Counter::default())))
    });
    registry
}

/// Two connected nodes, the second served on its own thread until close.
pub fn connected_pair(
    caller_registry: Registry,
    server_registry: Registry,
) -> (Node, Node, JoinHandle<()>) {
    let (a, b) = memory_pair();
    let caller = Node::new(Box::new(a), Arc::new(caller_registry));
    let server = Node::new(Box::new(b), Arc::new(server_registry));
    let serving = server.clone();
    let handle = thread::spawn(move || {
        while serving.serve_one().unwrap_or(false) {}
    });
    (caller, server, handle)
}
