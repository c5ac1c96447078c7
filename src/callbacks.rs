//! Builder for the four callbacks a tick may invoke, plus the panic-safe dispatch adapter
//! [`Server::process_events`](crate::Server::process_events) drives.

use crate::server::Client;
use std::panic::{catch_unwind, AssertUnwindSafe};

type AcceptFn<'a> = dyn Fn(Client) -> bool + 'a;
type DataFn<'a> = dyn FnMut(&Client, &[u8]) + 'a;
type DisconnectedFn<'a> = dyn FnMut(Client) + 'a;
type ErrorFn<'a> = dyn FnMut(&str, &str, Option<Client>) + 'a;

/// The callback table passed to [`Server::process_events`](crate::Server::process_events).
///
/// Every field is optional; an absent `accept` admits unconditionally, and an absent `error`
/// means failures reported during a tick are simply dropped after being logged.
#[derive(Default)]
pub struct Callbacks<'a> {
    accept: Option<Box<AcceptFn<'a>>>,
    data: Option<Box<DataFn<'a>>>,
    disconnected: Option<Box<DisconnectedFn<'a>>>,
    error: Option<Box<ErrorFn<'a>>>,
}

impl<'a> Callbacks<'a> {
    /// All callbacks absent.
    pub fn new() -> Self { Self::default() }

    /// Sets the `accept` callback. Return `false` to veto admission.
    pub fn on_accept(mut self, f: impl Fn(Client) -> bool + 'a) -> Self {
        self.accept = Some(Box::new(f));
        self
    }

    /// Sets the `data` callback, invoked once per non-empty read.
    pub fn on_data(mut self, f: impl FnMut(&Client, &[u8]) + 'a) -> Self {
        self.data = Some(Box::new(f));
        self
    }

    /// Sets the `disconnected` callback, invoked exactly once per accepted client.
    pub fn on_disconnected(mut self, f: impl FnMut(Client) + 'a) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }

    /// Sets the `error` callback: `(phase_id, message, client)`. `phase_id` is one of
    /// `"accept"`, `"read"`, `"data"`, `"disconnected"`, `"internal"`.
    pub fn on_error(mut self, f: impl FnMut(&str, &str, Option<Client>) + 'a) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub(crate) fn fire_accept(&mut self, client: Client) -> bool {
        let outcome = match &self.accept {
            Some(cb) => Some(catch_unwind(AssertUnwindSafe(|| cb(client.clone())))),
            None => None,
        };
        match outcome {
            None => true,
            Some(Ok(admit)) => admit,
            Some(Err(payload)) => {
                self.fire_error("accept", &panic_message(&payload), Some(client));
                false
            }
        }
    }

    pub(crate) fn fire_data(&mut self, client: &Client, bytes: &[u8]) {
        let outcome = match &mut self.data {
            Some(cb) => Some(catch_unwind(AssertUnwindSafe(|| cb(client, bytes)))),
            None => None,
        };
        if let Some(Err(payload)) = outcome {
            self.fire_error("data", &panic_message(&payload), Some(client.clone()));
        }
    }

    pub(crate) fn fire_disconnected(&mut self, client: Client) {
        let outcome = match &mut self.disconnected {
            Some(cb) => Some(catch_unwind(AssertUnwindSafe(|| cb(client.clone())))),
            None => None,
        };
        if let Some(Err(payload)) = outcome {
            self.fire_error("disconnected", &panic_message(&payload), Some(client));
        }
    }

    /// Routes a phase failure (an `io::Error` turned to text, or a caught callback panic) to the
    /// `error` callback, if one is registered. A panic raised from inside `error` itself is
    /// caught here and only logged, per the callback invariant — it never propagates.
    pub(crate) fn fire_error(&mut self, phase: &str, message: &str, client: Option<Client>) {
        let outcome = match &mut self.error {
            Some(cb) => Some(catch_unwind(AssertUnwindSafe(|| cb(phase, message, client)))),
            None => None,
        };
        if outcome.is_some_and(|r| r.is_err()) {
            log::error!("panic inside error callback (phase {phase}): {message}");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_owned()
    }
}
