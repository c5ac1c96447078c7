//! Test utilities: unique per-test endpoint names and a bounded tick-driving loop, scaled down
//! from `interprocess`'s own `tests/util` (name generation plus a drive helper) to what a
//! single-threaded, caller-driven server actually needs in a test.
#![allow(dead_code)]

use crate::{Callbacks, Server, Timeout};
use std::sync::atomic::{AtomicU32, Ordering};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// An endpoint name unique to this process and this call, so concurrently running tests never
/// collide on the same rendezvous path (a Unix socket file or a Windows pipe name).
pub fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    #[cfg(unix)]
    {
        format!("/tmp/multiplex-ipc-test-{pid}-{tag}-{n}.sock")
    }
    #[cfg(windows)]
    {
        format!("multiplex-ipc-test-{pid}-{tag}-{n}")
    }
}

/// Ticks `server` with a short bounded wait until `done` reports true, or panics after
/// `max_ticks` — a hung condition is a test bug, not a flaky timing window worth retrying
/// silently.
pub fn drive_until(
    server: &mut Server,
    callbacks: &mut Callbacks<'_>,
    max_ticks: u32,
    mut done: impl FnMut() -> bool,
) {
    for _ in 0..max_ticks {
        if done() {
            return;
        }
        server.process_events(callbacks, Timeout::Millis(50)).expect("tick failed");
    }
    assert!(done(), "condition not met after {max_ticks} ticks");
}
