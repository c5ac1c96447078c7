//! Scenario 2: two clients connect and write concurrently. Cross-client event order may vary by
//! slot index, but each client's own events stay in accept -> data -> disconnected order.

use crate::{
    tests::util::{drive_until, unique_name},
    Callbacks, ClientId, Server, ServerOptions,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Accept,
    Data(Vec<u8>),
    Disconnected,
}

#[test]
fn interleaved_clients() {
    let name = unique_name("interleaved");
    let mut server = Server::listen(&name, ServerOptions::new().max_clients(2).buffer_size(64)).unwrap();

    let a = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).unwrap();
            socket.write(b"aaa").unwrap();
        }
    });
    let b = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).unwrap();
            socket.write(b"bb").unwrap();
        }
    });

    let events: Arc<Mutex<HashMap<ClientId, Vec<Event>>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut callbacks = Callbacks::new()
        .on_accept({
            let events = Arc::clone(&events);
            move |client| {
                events.lock().unwrap().entry(client.id()).or_default().push(Event::Accept);
                true
            }
        })
        .on_data({
            let events = Arc::clone(&events);
            move |client, bytes| {
                events.lock().unwrap().entry(client.id()).or_default().push(Event::Data(bytes.to_vec()));
            }
        })
        .on_disconnected({
            let events = Arc::clone(&events);
            move |client| {
                events.lock().unwrap().entry(client.id()).or_default().push(Event::Disconnected);
            }
        });

    drive_until(&mut server, &mut callbacks, 400, || {
        let events = events.lock().unwrap();
        events.len() == 2 && events.values().all(|v| v.last() == Some(&Event::Disconnected))
    });
    a.join().unwrap();
    b.join().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    let mut payloads: Vec<Vec<u8>> = Vec::new();
    for per_client in events.values() {
        assert_eq!(per_client.len(), 3, "each client sees accept, data, disconnected: {per_client:?}");
        assert_eq!(per_client[0], Event::Accept);
        let Event::Data(bytes) = &per_client[1] else { panic!("expected data second") };
        payloads.push(bytes.clone());
        assert_eq!(per_client[2], Event::Disconnected);
    }
    payloads.sort();
    assert_eq!(payloads, vec![b"aaa".to_vec(), b"bb".to_vec()]);
    assert!(server.clients().is_empty());
}
