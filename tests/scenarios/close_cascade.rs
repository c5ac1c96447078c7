//! Scenario 6: `close(close_clients: true)` closes every active client's endpoint exactly once,
//! releases the server's own OS resource, and leaves the server permanently closed.

use crate::{
    tests::util::{drive_until, unique_name},
    Callbacks, IpcError, Server, ServerOptions, Timeout,
};
use std::{sync::mpsc, thread};

#[test]
fn close_with_cascade() {
    let name = unique_name("close-cascade");
    let mut server = Server::listen(&name, ServerOptions::new().max_clients(2).buffer_size(16)).unwrap();

    let (tx_a, rx_a) = mpsc::channel::<()>();
    let (tx_b, rx_b) = mpsc::channel::<()>();
    let client_a = thread::spawn({
        let name = name.clone();
        move || {
            let _socket = crate::connect(&name).unwrap();
            let _ = rx_a.recv();
        }
    });
    let client_b = thread::spawn({
        let name = name.clone();
        move || {
            let _socket = crate::connect(&name).unwrap();
            let _ = rx_b.recv();
        }
    });

    let mut callbacks = Callbacks::new();
    drive_until(&mut server, &mut callbacks, 200, || server.clients().len() == 2);

    let clients = server.clients();
    assert_eq!(clients.len(), 2);

    server.close(true).unwrap();
    for client in clients.values() {
        assert!(client.socket().is_closed(), "every active client must be closed by the cascade");
    }

    // Idempotent: a second close neither raises nor re-closes anything already closed.
    server.close(true).unwrap();

    let err = server.process_events(&mut Callbacks::new(), Timeout::Immediate).unwrap_err();
    assert_eq!(IpcError::from_io(&err), Some(IpcError::ServerClosed));

    tx_a.send(()).unwrap();
    tx_b.send(()).unwrap();
    client_a.join().unwrap();
    client_b.join().unwrap();
}
