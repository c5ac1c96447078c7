use std::{
    fmt::{self, Display, Formatter},
    io,
};

/// The fixed taxonomy of named error conditions this crate can report.
///
/// Every variant carries a static, human-readable message. Constructors that fail at an API
/// boundary return `std::io::Error` (via [`From<IpcError> for std::io::Error`](#impl-From<IpcError>-for-Error)),
/// with the originating [`IpcError`] always recoverable through [`IpcError::from_io`], whether or
/// not the `io::Error` also carries an OS-level source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IpcError {
    /// A server handle was required but none was available.
    ///
    /// Unreachable in this port: a [`Server`](crate::Server) value only exists once `listen` has
    /// succeeded, so there is no "nil server" state to observe in safe code. Kept in the taxonomy
    /// for parity with the other handle-validity variants below.
    ServerIsNil,
    /// An operation was attempted on a server that has already been closed.
    ServerClosed,
    /// A socket handle was required but none was available.
    ///
    /// Unreachable in this port, for the same reason as [`Self::ServerIsNil`].
    SocketIsNil,
    /// An operation was attempted on a socket that has already been closed.
    SocketClosed,
    /// `set_nonblocking` was called on a server-owned socket.
    ServerOwnedSocket,
    /// An endpoint path was required but none was given.
    ///
    /// Unreachable in this port: the resolver takes `&str`, not an optional pointer.
    PathIsNil,
    /// Allocating the OS resources behind a [`Server`](crate::Server) failed.
    FailedToCreateServerInstance,
    /// Allocating the OS resources behind a [`Socket`](crate::Socket) failed.
    FailedToCreateSocketInstance,
    /// The client-side `connect` call failed.
    FailedToConnect,
    /// The readiness/completion wait at the start of a tick failed.
    PollFailed,
    /// A read from a client or from the client-side socket failed.
    ReadFailed,
    /// A write to a client or to the client-side socket failed.
    WriteFailed,
    /// Querying the non-blocking state of a socket failed.
    StateCheckFailed,
    /// Setting the non-blocking state of a socket failed.
    SetStateFailed,
    /// A bounded read or wait exceeded its deadline.
    Timeout,
    /// A connection attempt arrived while the server was already at `max_clients`.
    ClientLimitReached,
    /// A user-supplied callback panicked.
    CallbackFailed,
    /// Re-arming a Windows pipe instance after a client disconnected failed.
    FailedToRecreatePipe,
}

impl IpcError {
    pub(crate) const fn msg(self) -> &'static str {
        use IpcError::*;
        match self {
            ServerIsNil => "server is nil",
            ServerClosed => "server is closed",
            SocketIsNil => "socket is nil",
            SocketClosed => "socket is closed",
            ServerOwnedSocket => "server owned socket",
            PathIsNil => "path is nil",
            FailedToCreateServerInstance => "failed to create server instance",
            FailedToCreateSocketInstance => "failed to create socket instance",
            FailedToConnect => "failed to connect",
            PollFailed => "poll failed",
            ReadFailed => "read failed",
            WriteFailed => "write failed",
            StateCheckFailed => "state check failed",
            SetStateFailed => "set state failed",
            Timeout => "timeout",
            ClientLimitReached => "client limit reached",
            CallbackFailed => "callback failed",
            FailedToRecreatePipe => "failed to recreate pipe",
        }
    }

    /// Recovers the [`IpcError`] that produced a given [`io::Error`], for errors that originated
    /// from this crate — whether constructed bare via [`From<IpcError> for io::Error`] or carrying
    /// an additional OS-level source.
    ///
    /// Returns `None` for errors that came from elsewhere (e.g. a raw OS error surfaced directly
    /// through `io::Error::last_os_error`).
    pub fn from_io(err: &io::Error) -> Option<Self> {
        let inner = err.get_ref()?;
        if let Some(wrapped) = inner.downcast_ref::<WithSource>() {
            return Some(wrapped.code);
        }
        inner.downcast_ref::<IpcError>().copied()
    }

    /// Attaches an OS-level `source` to this error code, for the common "this crate operation
    /// failed because of an underlying OS error" case. The resulting `io::Error`'s `Display`
    /// shows both; [`Self::from_io`] still recovers the [`IpcError`] code from it directly.
    pub(crate) fn with_source(self, source: io::Error) -> io::Error {
        io::Error::new(source.kind(), WithSource { code: self, source })
    }
}

impl Display for IpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(self.msg()) }
}
impl std::error::Error for IpcError {}

impl From<IpcError> for io::Error {
    fn from(e: IpcError) -> Self { io::Error::other(e) }
}

/// An [`IpcError`] paired with the OS error that caused it. Stored as the `io::Error`'s inner
/// error object so both the typed code and the OS message survive the round trip through
/// `std::io::Error`.
#[derive(Debug)]
struct WithSource {
    code: IpcError,
    source: io::Error,
}

impl Display for WithSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "{}: {}", self.code, self.source) }
}

impl std::error::Error for WithSource {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { Some(&self.source) }
}
