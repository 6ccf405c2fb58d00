//! Serving side of an rmi connection.
//!
//! "Server" is a role, not a protocol distinction: a served connection is
//! fully duplex, and handlers running here can call back into objects the
//! client passed by reference. This crate supplies the per-connection
//! serving loop and a TCP listener that runs one loop per connection.

pub mod logging;

use rmi_core::{MessageStream, Node, NodeConfig, Registry, RmiError};
use rmi_transport::TcpChannel;
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

pub use logging::{init_logging, init_test_logging};

/// Serves one connection until the peer closes it.
#[derive(Debug)]
pub struct Server {
    node: Node,
}

impl Server {
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

    /// The underlying node, for inspection.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Execute requests until the peer closes the connection.
    pub fn run(&self) -> Result<(), RmiError> {
        while self.node.serve_one()? {}
        debug!("connection closed by peer");
        Ok(())
    }
}

/// Accepts TCP connections and serves each on its own thread. All
/// connections share one registry; identity tables are per-connection.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: NodeConfig,
}

impl TcpServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, registry: Arc<Registry>) -> anyhow::Result<Self> {
        Self::bind_with_config(addr, registry, NodeConfig::default())
    }

    pub fn bind_with_config<A: ToSocketAddrs>(
        addr: A,
        registry: Arc<Registry>,
        config: NodeConfig,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            registry,
            config,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until accepting fails.
    pub fn serve_forever(&self) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = self.listener.accept()?;
            debug!(%peer, "accepted connection");
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            thread::spawn(move || {
                let channel = match TcpChannel::from_stream(socket) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(%peer, error = %e, "failed to set up connection");
                        return;
                    }
                };
                let server = Server::with_config(Box::new(channel), registry, config);
                if let Err(e) = server.run() {
                    warn!(%peer, error = %e, "connection ended with error");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmi_core::{memory_pair, CallKind, Value};

    fn math_registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register_function("math", "add", |args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        Arc::new(registry)
    }

    #[test]
    fn run_serves_until_close() {
        init_test_logging();
        let (a, b) = memory_pair();
        let server = Server::new(Box::new(b), math_registry());
        let handle = thread::spawn(move || server.run());

        let client = Node::new(Box::new(a), Arc::new(Registry::new()));
        let result = client
            .call(
                CallKind::Function,
                "math",
                "add",
                vec![Value::Int(4), Value::Int(5)],
            )
            .unwrap();
        assert_eq!(result, Value::Int(9));

        client.close().unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn tcp_server_serves_connections() {
        init_test_logging();
        let server = TcpServer::bind("127.0.0.1:0", math_registry()).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let _ = server.serve_forever();
        });

        let channel = TcpChannel::connect(addr).unwrap();
        let client = Node::new(Box::new(channel), Arc::new(Registry::new()));
        let result = client
            .call(
                CallKind::Function,
                "math",
                "add",
                vec![Value::Int(20), Value::Int(22)],
            )
            .unwrap();
        assert_eq!(result, Value::Int(42));
        client.close().unwrap();
    }
}
