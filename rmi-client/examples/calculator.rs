//! Two nodes in one process: a serving thread exposing a calculator and a
//! client invoking it, including a stateful object passed back and forth by
//! reference.
//!
//! Run with: cargo run --example calculator

use rmi_client::Client;
use rmi_core::{memory_pair, RemoteException, Registry, RmiTarget, Value};
use rmi_server::Server;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug)]
struct Accumulator {
    total: Mutex<i64>,
}

impl RmiTarget for Accumulator {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteException> {
        let mut total = self
            .total
            .lock()
            .map_err(|_| RemoteException::runtime("accumulator poisoned"))?;
        match method {
            "add" => {
                *total += args.first().and_then(Value::as_i64).unwrap_or(0);
                Ok(Value::Int(*total))
            }
            "total" => Ok(Value::Int(*total)),
            other => Err(RemoteException::name_error(format!(
                "Accumulator has no member '{}'",
                other
            ))),
        }
    }

    fn type_name(&self) -> &str {
        "Accumulator"
    }
}

fn main() -> anyhow::Result<()> {
    rmi_server::init_logging()?;

    let mut registry = Registry::new();
    registry.register_function("math", "add", |args| {
        let a = args[0].as_i64().unwrap_or(0);
        let b = args[1].as_i64().unwrap_or(0);
        Ok(Value::Int(a + b))
    });
    registry.register_class_member("Accumulator", "new", |_args| {
        Ok(Value::object(Arc::new(Accumulator {
            total: Mutex::new(0),
        })))
    });

    let (client_end, server_end) = memory_pair();
    let server = Server::new(Box::new(server_end), Arc::new(registry));
    let serving = thread::spawn(move || server.run());

    let client = Client::new(Box::new(client_end), Arc::new(Registry::new()));

    let sum = client.call_function("math", "add", vec![Value::Int(2), Value::Int(3)])?;
    println!("math.add(2, 3) = {:?}", sum);

    let product = client.call_eval("$0 * $1", vec![Value::Int(6), Value::Int(7)])?;
    println!("eval $0 * $1 = {:?}", product);

    // the accumulator lives on the serving side; we only ever hold a proxy
    let acc = client.call_class_method("Accumulator", "new", vec![])?;
    client.call_object_method(acc.clone(), "add", vec![Value::Int(10)])?;
    client.call_object_method(acc.clone(), "add", vec![Value::Int(32)])?;
    let total = client.call_object_method(acc, "total", vec![])?;
    println!("accumulator total = {:?}", total);

    client.close()?;
    serving.join().map_err(|_| anyhow::anyhow!("serving thread panicked"))??;
    Ok(())
}
