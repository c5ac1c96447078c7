//! Scenario 3: the `accept` callback vetoes the first connection attempt. The OS-level connect
//! still succeeds for that client, but it never shows up in `data`, `disconnected`, or
//! `Server::clients`. A later attempt is admitted normally.

use crate::{
    tests::util::{drive_until, unique_name},
    Callbacks, Server, ServerOptions,
};
use std::{
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
    sync::Arc,
    thread,
};

#[test]
fn admission_veto() {
    let name = unique_name("veto");
    let mut server = Server::listen(&name, ServerOptions::new().max_clients(1).buffer_size(16)).unwrap();

    let accepts_seen = Arc::new(AtomicU32::new(0));
    let data_seen = Arc::new(AtomicUsize::new(0));
    let disconnects_seen = Arc::new(AtomicUsize::new(0));

    let vetoed = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).expect("OS-level connect should still succeed");
            let _ = socket.write(b"should never be seen");
        }
    });

    let mut callbacks = Callbacks::new()
        .on_accept({
            let accepts_seen = Arc::clone(&accepts_seen);
            move |_client| accepts_seen.fetch_add(1, Ordering::SeqCst) > 0
        })
        .on_data({
            let data_seen = Arc::clone(&data_seen);
            move |_client, _bytes| {
                data_seen.fetch_add(1, Ordering::SeqCst);
            }
        })
        .on_disconnected({
            let disconnects_seen = Arc::clone(&disconnects_seen);
            move |_client| {
                disconnects_seen.fetch_add(1, Ordering::SeqCst);
            }
        });

    drive_until(&mut server, &mut callbacks, 200, || accepts_seen.load(Ordering::SeqCst) >= 1);
    vetoed.join().unwrap();

    assert_eq!(accepts_seen.load(Ordering::SeqCst), 1);
    assert_eq!(data_seen.load(Ordering::SeqCst), 0);
    assert_eq!(disconnects_seen.load(Ordering::SeqCst), 0);
    assert!(server.clients().is_empty());

    let admitted = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).unwrap();
            socket.write(b"second").unwrap();
        }
    });

    drive_until(&mut server, &mut callbacks, 200, || disconnects_seen.load(Ordering::SeqCst) >= 1);
    admitted.join().unwrap();

    assert_eq!(accepts_seen.load(Ordering::SeqCst), 2);
    assert_eq!(data_seen.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects_seen.load(Ordering::SeqCst), 1);
    assert!(server.clients().is_empty());
}
