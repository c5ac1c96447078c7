//! Scenario 1: one client connects, sends one short message, and disconnects cleanly.

use crate::{
    tests::util::{drive_until, unique_name},
    Callbacks, ClientId, Server, ServerOptions,
};
use std::{
    sync::{Arc, Mutex},
    thread,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Accept(ClientId),
    Data(ClientId, Vec<u8>),
    Disconnected(ClientId),
}

#[test]
fn echo_one_client() {
    let name = unique_name("echo-one-client");
    let mut server = Server::listen(&name, ServerOptions::new().max_clients(1).buffer_size(16)).unwrap();

    let client = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).unwrap();
            socket.write(b"hello").unwrap();
        }
    });

    let events = Arc::new(Mutex::new(Vec::new()));
    let mut callbacks = Callbacks::new()
        .on_accept({
            let events = Arc::clone(&events);
            move |client| {
                events.lock().unwrap().push(Event::Accept(client.id()));
                true
            }
        })
        .on_data({
            let events = Arc::clone(&events);
            move |client, bytes| {
                events.lock().unwrap().push(Event::Data(client.id(), bytes.to_vec()));
            }
        })
        .on_disconnected({
            let events = Arc::clone(&events);
            move |client| {
                events.lock().unwrap().push(Event::Disconnected(client.id()));
            }
        });

    drive_until(&mut server, &mut callbacks, 200, || {
        matches!(events.lock().unwrap().last(), Some(Event::Disconnected(_)))
    });
    client.join().unwrap();

    let recorded = events.lock().unwrap();
    assert_eq!(recorded.len(), 3, "expected exactly accept, data, disconnected: {recorded:?}");
    let id = match recorded[0] {
        Event::Accept(id) => id,
        ref other => panic!("expected accept first, got {other:?}"),
    };
    assert_eq!(recorded[1], Event::Data(id, b"hello".to_vec()));
    assert_eq!(recorded[2], Event::Disconnected(id));
    assert!(server.clients().is_empty());
}
