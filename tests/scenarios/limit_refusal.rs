//! Scenario 4: a connection attempt arriving at `max_clients` yields exactly one `error("accept",
//! "client limit reached", None)` callback, and the already-active client is unaffected.

use crate::{
    tests::util::{drive_until, unique_name},
    Callbacks, Client, Server, ServerOptions,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
};

#[test]
fn limit_refusal() {
    let name = unique_name("limit-refusal");
    let mut server = Server::listen(&name, ServerOptions::new().max_clients(1).buffer_size(16)).unwrap();

    let accepts = Arc::new(AtomicUsize::new(0));
    let errors: Arc<Mutex<Vec<(String, String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut callbacks = Callbacks::new()
        .on_accept({
            let accepts = Arc::clone(&accepts);
            move |_client| {
                accepts.fetch_add(1, Ordering::SeqCst);
                true
            }
        })
        .on_error({
            let errors = Arc::clone(&errors);
            move |phase: &str, message: &str, client: Option<Client>| {
                errors.lock().unwrap().push((phase.to_owned(), message.to_owned(), client.is_some()));
            }
        });

    let client_a = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).unwrap();
            // Held open for the whole test; dropped (and thus disconnected) only at the end.
            thread::sleep(std::time::Duration::from_millis(300));
            drop(socket);
        }
    });

    drive_until(&mut server, &mut callbacks, 200, || accepts.load(Ordering::SeqCst) >= 1);
    assert_eq!(server.clients().len(), 1);

    let client_b = thread::spawn({
        let name = name.clone();
        move || {
            // Succeeds at the OS level (still queued in the listen backlog); the server refuses
            // it without ever materializing a `Client` for it.
            let _socket = crate::connect(&name).unwrap();
        }
    });

    drive_until(&mut server, &mut callbacks, 200, || !errors.lock().unwrap().is_empty());
    client_b.join().unwrap();

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1, "expected exactly one refusal: {errors:?}");
    assert_eq!(errors[0], ("accept".to_owned(), "client limit reached".to_owned(), false));
    assert_eq!(accepts.load(Ordering::SeqCst), 1, "client A's session must be unaffected");
    assert_eq!(server.clients().len(), 1);

    client_a.join().unwrap();
}
