//! Calling side of an rmi connection.
//!
//! A thin convenience wrapper over [`rmi_core::Node`]: constructors for the
//! common transports and one method per call kind. The connection underneath
//! stays duplex; while a call is outstanding the client transparently
//! services counter-requests against objects it passed by reference.

use rmi_core::{
    CallKind, CallOptions, MessageStream, Node, NodeConfig, Registry, RmiError, Value,
};
use rmi_transport::{ChildChannel, TcpChannel};
use std::net::ToSocketAddrs;
use std::process::Command;
use std::sync::Arc;

/// A connected calling endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    node: Node,
}

impl Client {
    /// Connect over an arbitrary channel. The registry serves the peer's
    /// counter-requests; a client that never exposes objects passes an
    /// empty one.
    pub fn new(channel: Box<dyn MessageStream>, registry: Arc<Registry>) -> Self {
        Self {
            node: Node::new(channel, registry),
        }
    }

    pub fn with_config(
        channel: Box<dyn MessageStream>,
        registry: Arc<Registry>,
        config: NodeConfig,
    ) -> Self {
        Self {
            node: Node::with_config(channel, registry, config),
        }
    }

    /// Connect to a TCP peer.
    pub fn tcp<A: ToSocketAddrs>(addr: A, registry: Arc<Registry>) -> anyhow::Result<Self> {
        let channel = TcpChannel::connect(addr)?;
        Ok(Self::new(Box::new(channel), registry))
    }

    /// Spawn a peer process and connect over its stdio.
    pub fn child(command: Command, registry: Arc<Registry>) -> anyhow::Result<Self> {
        let channel = ChildChannel::spawn(command)?;
        Ok(Self::new(Box::new(channel), registry))
    }

    /// The underlying node, for inspection and direct calls.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Invoke a free function on the peer.
    pub fn call_function(
        &self,
        namespace: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RmiError> {
        self.node.call(CallKind::Function, namespace, name, args)
    }

    /// Invoke a class-level member (constructors included) on the peer.
    pub fn call_class_method(
        &self,
        class: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value, RmiError> {
        self.node.call(CallKind::ClassMethod, class, member, args)
    }

    /// Invoke a member on a target value. The target travels first, so a
    /// proxy target is executed by its owner and a local target round-trips
    /// by reference.
    pub fn call_object_method(
        &self,
        target: Value,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value, RmiError> {
        let namespace = target.type_name().to_owned();
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(target);
        data.extend(args);
        self.node
            .call(CallKind::ObjectMethod, &namespace, member, data)
    }

    /// Evaluate an expression on the peer, with `args` bound as `$0`, `$1`
    /// and so on.
    pub fn call_eval(&self, src: &str, args: Vec<Value>) -> Result<Value, RmiError> {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::from(src));
        data.extend(args);
        self.node.call(CallKind::Eval, "", "", data)
    }

    /// Like [`Client::call_function`], but arguments with an expression
    /// rendering are materialized on the peer instead of proxied.
    pub fn call_function_by_copy(
        &self,
        namespace: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RmiError> {
        self.node.call_with(
            CallOptions { copy: true },
            CallKind::Function,
            namespace,
            name,
            args,
        )
    }

    /// Close the connection.
    pub fn close(&self) -> anyhow::Result<()> {
        Ok(self.node.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmi_core::memory_pair;
    use rmi_server::Server;
    use std::thread;

    fn demo_registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register_function("math", "add", |args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        registry.register_class_member("Greeting", "new", |args| {
            let name = args
                .first()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            Ok(Value::from(format!("hello, {}", name)))
        });
        Arc::new(registry)
    }

    fn connected_client() -> (Client, thread::JoinHandle<Result<(), RmiError>>) {
        let (a, b) = memory_pair();
        let server = Server::new(Box::new(b), demo_registry());
        let handle = thread::spawn(move || server.run());
        (Client::new(Box::new(a), Arc::new(Registry::new())), handle)
    }

    #[test]
    fn function_and_class_method_calls() {
        let (client, handle) = connected_client();

        let sum = client
            .call_function("math", "add", vec![Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(sum, Value::Int(5));

        let greeting = client
            .call_class_method("Greeting", "new", vec![Value::from("world")])
            .unwrap();
        assert_eq!(greeting, Value::from("hello, world"));

        client.close().unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn eval_binds_arguments() {
        let (client, handle) = connected_client();
        let result = client
            .call_eval("$0 * $1", vec![Value::Int(6), Value::Int(7)])
            .unwrap();
        assert_eq!(result, Value::Int(42));
        client.close().unwrap();
        handle.join().unwrap().unwrap();
    }
}
