//! Scenario 5: a single OS-level write larger than `buffer_size` is delivered as two or more
//! `data` callbacks, in order, whose concatenation reconstructs the original bytes.

use crate::{
    tests::util::{drive_until, unique_name},
    Callbacks, Server, ServerOptions,
};
use std::{
    sync::{Arc, Mutex},
    thread,
};

#[test]
fn large_payload_split() {
    let name = unique_name("large-payload");
    let mut server = Server::listen(&name, ServerOptions::new().max_clients(1).buffer_size(4)).unwrap();

    const PAYLOAD: &[u8] = b"abcdefghij";
    let client = thread::spawn({
        let name = name.clone();
        move || {
            let socket = crate::connect(&name).unwrap();
            socket.write(PAYLOAD).unwrap();
        }
    });

    let chunks: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let disconnected = Arc::new(Mutex::new(false));
    let mut callbacks = Callbacks::new()
        .on_data({
            let chunks = Arc::clone(&chunks);
            move |_client, bytes| {
                assert!(bytes.len() <= 4, "each chunk must respect buffer_size: got {} bytes", bytes.len());
                chunks.lock().unwrap().push(bytes.to_vec());
            }
        })
        .on_disconnected({
            let disconnected = Arc::clone(&disconnected);
            move |_client| {
                *disconnected.lock().unwrap() = true;
            }
        });

    drive_until(&mut server, &mut callbacks, 400, || *disconnected.lock().unwrap());
    client.join().unwrap();

    let chunks = chunks.lock().unwrap();
    assert!(chunks.len() >= 2, "a 10-byte write through a 4-byte buffer must split: {chunks:?}");
    let reassembled: Vec<u8> = chunks.iter().flatten().copied().collect();
    assert_eq!(reassembled, PAYLOAD);
}
