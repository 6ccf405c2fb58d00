//! End-to-end scenarios over connected node pairs.

use rmi_client::Client;
use rmi_core::{CallKind, CallOptions, ObjRef, Registry, RmiError, Value};
use rmi_interop_tests::fixtures::{connected_pair, demo_registry, Counter, ExprLiteral};
use rmi_server::TcpServer;
use std::sync::Arc;
use std::thread;

#[test]
fn function_call_across_nodes() {
    rmi_server::init_test_logging();
    let (caller, _server, handle) = connected_pair(Registry::new(), demo_registry());

    let result = caller
        .call(
            CallKind::Function,
            "math",
            "add",
            vec![Value::Int(2), Value::Int(3)],
        )
        .unwrap();
    assert_eq!(result, Value::Int(5));

    caller.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn eval_across_nodes() {
    let (caller, _server, handle) = connected_pair(Registry::new(), demo_registry());

    let result = caller
        .call(CallKind::Eval, "", "", vec![Value::from("2+3")])
        .unwrap();
    assert_eq!(result, Value::Int(5));

    caller.close().unwrap();
    handle.join().unwrap();
}

// The liveness property: while the caller waits for its response, the
// serving side calls back into an object the caller passed by reference.
// The nested requests are serviced on the caller's own call stack, so the
// exchange completes without any extra threads on the calling side.
#[test]
fn counter_request_calls_back_into_caller() {
    let (caller, server, handle) = connected_pair(Registry::new(), demo_registry());

    let counter = Arc::new(Counter::default());
    let value = Value::object(Arc::clone(&counter) as _);
    caller
        .call(CallKind::Function, "util", "bump_twice", vec![value])
        .unwrap();

    assert_eq!(counter.count(), 2);
    // the server's proxy died with the handler, and its release rode the
    // response frame back
    assert_eq!(caller.sent_count(), 0);
    assert_eq!(server.received_count(), 0);

    caller.close().unwrap();
    handle.join().unwrap();
}

// Return-proxy symmetry: a reference that travels out and comes back must
// decode to the original object, not to a proxy of a proxy.
#[test]
fn reference_round_trip_restores_identity() {
    let (caller, _server, handle) = connected_pair(Registry::new(), demo_registry());

    let counter = Arc::new(Counter::default());
    let outbound = Value::object(Arc::clone(&counter) as _);
    let returned = caller
        .call(CallKind::Function, "util", "identity", vec![outbound])
        .unwrap();

    match returned {
        Value::Object(ObjRef::Local(target)) => {
            assert!(Arc::ptr_eq(&target, &(counter as _)));
        }
        other => panic!("expected the original local object, got {:?}", other),
    }

    caller.close().unwrap();
    handle.join().unwrap();
}

// A proxy received from the peer is dropped; its release travels with the
// next outgoing message and the peer's sent table empties.
#[test]
fn dropped_proxy_releases_remote_object() {
    let (caller, server, handle) = connected_pair(Registry::new(), demo_registry());

    let counter = caller
        .call(CallKind::ClassMethod, "Counter", "new", vec![])
        .unwrap();
    let proxy = counter.as_proxy().cloned().unwrap();
    assert_eq!(server.sent_count(), 1);
    assert_eq!(caller.received_count(), 1);

    proxy.call("increment", vec![]).unwrap();
    drop(proxy);
    drop(counter);
    assert_eq!(caller.received_count(), 0);
    // release is queued, not yet sent
    assert_eq!(server.sent_count(), 1);

    caller
        .call(CallKind::Eval, "", "", vec![Value::from("0")])
        .unwrap();
    assert_eq!(server.sent_count(), 0);

    caller.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn remote_exception_carries_kind_and_message() {
    let (caller, _server, handle) = connected_pair(Registry::new(), demo_registry());

    match caller.call(CallKind::Function, "util", "identity", vec![]) {
        Err(RmiError::Remote(e)) => {
            assert_eq!(e.kind, "ArgumentError");
            assert_eq!(e.message, "identity takes one value");
        }
        other => panic!("expected remote exception, got {:?}", other),
    }

    // the connection survives the exception
    let result = caller
        .call(
            CallKind::Function,
            "math",
            "add",
            vec![Value::Int(1), Value::Int(2)],
        )
        .unwrap();
    assert_eq!(result, Value::Int(3));

    caller.close().unwrap();
    handle.join().unwrap();
}

// The copy escape hatch: a target with an expression rendering materializes
// on the peer as a plain value instead of a reference.
#[test]
fn copy_option_materializes_value_on_peer() {
    let (caller, server, handle) = connected_pair(Registry::new(), demo_registry());

    let literal = Value::object(Arc::new(ExprLiteral {
        src: "40 + 2".to_owned(),
    }));
    let type_name = caller
        .call_with(
            CallOptions { copy: true },
            CallKind::Function,
            "util",
            "type_of",
            vec![literal],
        )
        .unwrap();
    assert_eq!(type_name, Value::from("int"));
    // no reference was ever exposed
    assert_eq!(caller.sent_count(), 0);
    assert_eq!(server.sent_count(), 0);

    caller.close().unwrap();
    handle.join().unwrap();
}

// The full stack over a real socket: client facade, TCP transport, threaded
// listener, and a stateful object driven through its proxy.
#[test]
fn client_over_tcp_end_to_end() {
    rmi_server::init_test_logging();
    let server = TcpServer::bind("127.0.0.1:0", Arc::new(demo_registry())).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || {
        let _ = server.serve_forever();
    });

    let client = Client::tcp(addr, Arc::new(Registry::new())).unwrap();

    let sum = client
        .call_function("math", "add", vec![Value::Int(2), Value::Int(3)])
        .unwrap();
    assert_eq!(sum, Value::Int(5));

    let counter = client.call_class_method("Counter", "new", vec![]).unwrap();
    assert!(counter.is_proxy());
    client
        .call_object_method(counter.clone(), "increment", vec![])
        .unwrap();
    let count = client
        .call_object_method(counter, "increment", vec![])
        .unwrap();
    assert_eq!(count, Value::Int(2));

    let product = client
        .call_eval("$0 * $1", vec![Value::Int(6), Value::Int(7)])
        .unwrap();
    assert_eq!(product, Value::Int(42));

    client.close().unwrap();
}

// Without the copy option the same target travels by reference.
#[test]
fn without_copy_the_same_target_is_proxied() {
    let (caller, _server, handle) = connected_pair(Registry::new(), demo_registry());

    let literal = Value::object(Arc::new(ExprLiteral {
        src: "40 + 2".to_owned(),
    }));
    let type_name = caller
        .call(CallKind::Function, "util", "type_of", vec![literal])
        .unwrap();
    assert_eq!(type_name, Value::from("ExprLiteral"));

    caller.close().unwrap();
    handle.join().unwrap();
}
