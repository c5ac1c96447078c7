//! The multiplexed server event loop: client accounting, callback dispatch, and the
//! `Transport`-abstracted readiness scan that drives one tick.

pub(crate) mod transport;

use crate::{
    callbacks::Callbacks,
    error::IpcError,
    path,
    socket::Socket,
    server::transport::{HarvestOutcome, PendingAccept, Transport},
};
use log::{debug, trace, warn};
use std::{collections::HashMap, fmt, io, sync::Arc};

#[cfg(unix)]
use crate::os::unix::UnixTransport as PlatformTransport;
#[cfg(windows)]
use crate::os::windows::WindowsTransport as PlatformTransport;

/// A stable per-session client identifier: the client file descriptor on Unix, widened; the pipe
/// handle's numeric value on Windows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClientId(i64);

impl ClientId {
    pub(crate) fn from_raw(v: i64) -> Self { Self(v) }

    /// The raw OS-handle value this identifier wraps.
    pub fn as_raw(self) -> i64 { self.0 }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Bounds the wait phase of [`Server::process_events`]. One portable variant in place of a raw
/// signed millisecond count, so "wait forever" reads the same on both platforms instead of relying
/// on each platform's own negative-means-infinite convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately if nothing is ready.
    Immediate,
    /// Wait up to this many milliseconds.
    Millis(u32),
    /// Wait until something is ready, however long that takes.
    Infinite,
}

/// Builder for [`Server::listen`]'s tunables.
#[derive(Copy, Clone, Debug)]
pub struct ServerOptions {
    max_clients: usize,
    buffer_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self { Self { max_clients: 5, buffer_size: 1024 } }
}

impl ServerOptions {
    /// Starts from the default: 5 concurrent clients, 1024-byte read buffer.
    pub fn new() -> Self { Self::default() }

    /// Hard upper bound on concurrent clients. `0` is silently replaced by the default.
    pub fn max_clients(mut self, n: usize) -> Self {
        self.max_clients = if n == 0 { Self::default().max_clients } else { n };
        self
    }

    /// Per-read byte buffer size. `0` is silently replaced by the default.
    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = if n == 0 { Self::default().buffer_size } else { n };
        self
    }
}

/// The private half of a client endpoint's shared state. `Client` is `Arc<ClientInner>`, so the
/// server's copy in `clients_by_id` and the embedder's copy handed out at `accept` refer to the
/// same socket.
pub(crate) struct ClientInner {
    id: ClientId,
    socket: Socket,
}

/// A handle to one connected client, shared between the server's internal bookkeeping and
/// whatever the embedder does with the copy it was given at `accept`/`data`/`disconnected`.
///
/// Cloning a `Client` clones the `Arc`, not the underlying socket: both copies observe the same
/// open/closed state and the same bytes.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl Client {
    pub(crate) fn new(id: ClientId, socket: Socket) -> Self { Self(Arc::new(ClientInner { id, socket })) }

    /// This client's stable identifier.
    pub fn id(&self) -> ClientId { self.0.id }

    /// The underlying byte-stream endpoint.
    pub fn socket(&self) -> &Socket { &self.0.socket }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("id", &self.0.id).finish_non_exhaustive()
    }
}

/// A running server: the listening endpoint, the bounded pool of client slots, and the
/// `Transport`-abstracted OS readiness/completion state.
pub struct Server {
    path: std::ffi::OsString,
    max_clients: usize,
    closed: bool,
    transport: PlatformTransport,
    clients_by_id: HashMap<ClientId, Client>,
}

impl Server {
    /// Starts listening at `path` with the given options. All-or-nothing: on any failure every
    /// partially allocated OS resource from this call is released before returning.
    pub fn listen(path: &str, options: ServerOptions) -> io::Result<Self> {
        let resolved = path::resolve(path)?;
        let transport = PlatformTransport::create(&resolved, options.max_clients, options.buffer_size)
            .map_err(|e| IpcError::FailedToCreateServerInstance.with_source(e))?;
        debug!("listening at {:?} (max_clients={})", resolved, options.max_clients);
        Ok(Self {
            path: resolved,
            max_clients: options.max_clients,
            closed: false,
            transport,
            clients_by_id: HashMap::new(),
        })
    }

    /// Runs one bounded wait-then-dispatch tick. Returns `Ok(true)` on a normal tick (including
    /// one where nothing happened); fails with [`IpcError::ServerClosed`] if called after
    /// [`Self::close`], or [`IpcError::PollFailed`] if the readiness/completion wait itself fails.
    pub fn process_events(&mut self, callbacks: &mut Callbacks<'_>, timeout: Timeout) -> io::Result<bool> {
        if self.closed {
            return Err(IpcError::ServerClosed.into());
        }

        if let Err(e) = self.transport.wait(timeout) {
            warn!("readiness wait failed: {e}");
            return Err(IpcError::PollFailed.with_source(e));
        }

        self.accept_phase(callbacks)?;
        self.data_phase(callbacks);
        self.transport.compact();

        Ok(true)
    }

    fn accept_phase(&mut self, callbacks: &mut Callbacks<'_>) -> io::Result<()> {
        loop {
            let pending = match self.transport.next_pending_accept() {
                Ok(Some(p)) => p,
                Ok(None) => break,
                Err(e) => {
                    callbacks.fire_error("accept", &e.to_string(), None);
                    break;
                }
            };

            if self.clients_by_id.len() >= self.max_clients {
                debug!("refusing client {}: client limit reached", pending.id());
                callbacks.fire_error("accept", IpcError::ClientLimitReached.msg(), None);
                self.transport.reject(pending);
                continue;
            }

            let id = pending.id();
            let socket = match self.transport.admit(pending) {
                Ok(s) => s,
                Err(e) => {
                    callbacks.fire_error("accept", &e.to_string(), None);
                    continue;
                }
            };
            let client = Client::new(id, socket);

            let admitted = callbacks.fire_accept(client.clone());
            if admitted {
                trace!("client {id} admitted");
                self.clients_by_id.insert(id, client);
            } else {
                trace!("client {id} vetoed by accept callback");
                self.transport.revoke(id);
                let _ = client.socket().close();
            }
        }
        Ok(())
    }

    fn data_phase(&mut self, callbacks: &mut Callbacks<'_>) {
        let slots = self.transport.ready_data_slots();
        let mut buf = Vec::new();
        for slot in slots {
            let Some(client) = self.clients_by_id.get(&slot.id).cloned() else { continue };
            match self.transport.harvest(slot, &mut buf) {
                HarvestOutcome::Data(_) => {
                    callbacks.fire_data(&client, &buf);
                }
                HarvestOutcome::Disconnected => {
                    trace!("client {} disconnected", slot.id);
                    self.transport.reclaim(slot);
                    self.clients_by_id.remove(&slot.id);
                    let _ = client.socket().close();
                    callbacks.fire_disconnected(client);
                }
                HarvestOutcome::WouldBlock => {}
                HarvestOutcome::Error(e) => {
                    warn!("read failed for client {}: {e}", slot.id);
                    callbacks.fire_error("read", &e.to_string(), Some(client.clone()));
                    self.transport.reclaim(slot);
                    self.clients_by_id.remove(&slot.id);
                    let _ = client.socket().close();
                    callbacks.fire_disconnected(client);
                }
            }
        }
    }

    /// A shallow clone of the live client map: an `Arc` clone per entry, safe to iterate without
    /// holding anything the server could mutate mid-tick.
    pub fn clients(&self) -> HashMap<ClientId, Client> { self.clients_by_id.clone() }

    /// The configured `max_clients` ceiling.
    pub fn client_limit(&self) -> usize { self.max_clients }

    /// Idempotent teardown. When `close_clients` is `true`, every tracked client's socket is
    /// closed too (errors are logged, not propagated).
    pub fn close(&mut self, close_clients: bool) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if close_clients {
            for (id, client) in &self.clients_by_id {
                if let Err(e) = client.socket().close() {
                    warn!("error closing client {id} during server close: {e}");
                }
            }
        }
        self.clients_by_id.clear();
        self.transport.teardown();
        debug!("server at {:?} closed", self.path);
        Ok(())
    }
}

impl PartialEq for Server {
    /// Two `Server` values are equal when they share the same OS listening identity: the same
    /// listening socket on Unix (comparing the rendezvous path alone would conflate a closed
    /// server with an unrelated later one that reused the same path), or the same normalized
    /// endpoint path on Windows, where pipe instances have no single shared listener handle to
    /// compare.
    #[cfg(unix)]
    fn eq(&self, other: &Self) -> bool { self.transport.listener_fd() == other.transport.listener_fd() }
    #[cfg(windows)]
    fn eq(&self, other: &Self) -> bool { self.path == other.path }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Server({:?})", self.path) }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("path", &self.path)
            .field("max_clients", &self.max_clients)
            .field("closed", &self.closed)
            .field("clients", &self.clients_by_id.len())
            .finish()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.close(false);
    }
}
