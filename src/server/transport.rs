//! The OS-readiness abstraction the tick algorithm in [`super::Server::process_events`] drives.
//!
//! Unix implements this with a `poll(2)` pollset; Windows implements it with a
//! `WaitForMultipleObjects` wait over per-instance connect/data completion events. The tick
//! algorithm itself is written once, against this trait, and reads uniformly on both platforms.

use crate::{server::ClientId, socket::Socket, server::Timeout};
use std::io;

/// A connection that has arrived but not yet been admitted or refused.
pub(crate) trait PendingAccept {
    fn id(&self) -> ClientId;
}

/// One live client slot signalled ready this tick.
#[derive(Copy, Clone, Debug)]
pub(crate) struct DataSlot {
    pub id: ClientId,
    pub index: usize,
}

/// The result of harvesting one client's read for this tick.
pub(crate) enum HarvestOutcome {
    /// `buf` (passed by the caller, filled in place) holds this many bytes.
    Data(usize),
    /// The peer closed the connection cleanly.
    Disconnected,
    /// Nothing was ready yet; leave the client alone.
    WouldBlock,
    /// A real I/O error occurred; the client should be torn down.
    Error(io::Error),
}

/// Unifies the pollset-based (Unix) and overlapped-events-based (Windows) transports behind one
/// tick algorithm. See the module-level documentation.
pub(crate) trait Transport: Sized {
    type Pending: PendingAccept;

    /// Creates the transport and begins listening/accepting at `path`.
    fn create(path: &std::ffi::OsStr, max_clients: usize, buffer_size: usize) -> io::Result<Self>;

    /// Blocks up to `timeout` waiting for readiness or completion.
    fn wait(&mut self, timeout: Timeout) -> io::Result<()>;

    /// Returns the next connection attempt materialized by the last [`Self::wait`], if any. Unix
    /// calls this in a loop until it returns `Ok(None)` (draining the listen backlog); Windows
    /// returns at most one pending accept per signalled instance.
    fn next_pending_accept(&mut self) -> io::Result<Option<Self::Pending>>;

    /// Admits a pending connection: wires it into the transport's live-client bookkeeping and
    /// returns the `Socket` the server hands to the embedder.
    fn admit(&mut self, pending: Self::Pending) -> io::Result<Socket>;

    /// Refuses a pending connection before it has been wired in as a live client (client limit
    /// reached).
    fn reject(&mut self, pending: Self::Pending);

    /// Undoes an [`Self::admit`] for a client the `accept` callback just vetoed: the slot is
    /// released the same way a disconnect would release it (Unix: marked dead, pending
    /// compaction; Windows: disconnected and re-armed for the next client).
    fn revoke(&mut self, id: ClientId);

    /// Slots signalled readable/completed this tick, in slot order.
    fn ready_data_slots(&self) -> Vec<DataSlot>;

    /// Reads up to `buffer_size` bytes from `slot` into `buf` (which is cleared and resized by
    /// the callee) and classifies the result.
    fn harvest(&mut self, slot: DataSlot, buf: &mut Vec<u8>) -> HarvestOutcome;

    /// Reclaims a slot after a disconnect or unrecoverable read error.
    fn reclaim(&mut self, slot: DataSlot);

    /// Unix-only housekeeping: compacts the pollfd vector after a reclaim. A no-op on Windows,
    /// whose instance array never shifts.
    fn compact(&mut self);

    /// Number of live, accepted clients.
    fn client_count(&self) -> usize;

    /// Releases every OS resource the transport owns directly. Windows pipe handles already
    /// dispatched to a [`Client`](crate::Client) are shared with that client's `Socket` and are
    /// *not* touched here — only the listener-side resources the transport alone owns are freed.
    fn teardown(&mut self);
}
