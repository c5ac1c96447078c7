//! The byte-stream endpoint handle shared by client-side `connect` and server-accepted clients.

use crate::{error::IpcError, path};
use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

#[cfg(unix)]
use crate::os::unix;
#[cfg(unix)]
use std::{
    os::fd::{AsRawFd, OwnedFd, RawFd},
    sync::Mutex,
};

#[cfg(windows)]
use crate::os::windows::{self, PipeHandle};
#[cfg(windows)]
use std::sync::Arc;

/// Options controlling [`Socket::read`].
#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    buffer_size: usize,
    timeout: Option<Duration>,
}

impl Default for ReadOptions {
    fn default() -> Self { Self { buffer_size: 1024, timeout: None } }
}

impl ReadOptions {
    /// Starts from the default: 1024-byte buffer, no timeout (block indefinitely).
    pub fn new() -> Self { Self::default() }

    /// Sets the maximum number of bytes read in one call. `0` is silently replaced by the
    /// default, matching [`crate::ServerOptions::buffer_size`].
    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = if n == 0 { Self::default().buffer_size } else { n };
        self
    }

    /// Bounds how long [`Socket::read`] waits for readiness before returning
    /// [`IpcError::Timeout`].
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    pub(crate) fn buffer_size_or_default(self) -> usize { self.buffer_size }
    pub(crate) fn timeout_duration(self) -> Option<Duration> { self.timeout }
}

#[cfg(unix)]
enum Inner {
    Fd(Mutex<Option<OwnedFd>>),
}

#[cfg(windows)]
enum Inner {
    Pipe(Arc<PipeHandle>),
}

/// One connected byte-stream endpoint: a Unix domain socket file descriptor or a Windows named
/// pipe handle, plus the ownership and closed-state bookkeeping the server and the embedder both
/// need.
pub struct Socket {
    inner: Inner,
    server_owned: bool,
    closed: AtomicBool,
}

impl Socket {
    #[cfg(unix)]
    pub(crate) fn from_fd(fd: OwnedFd, server_owned: bool) -> Self {
        Self { inner: Inner::Fd(Mutex::new(Some(fd))), server_owned, closed: AtomicBool::new(false) }
    }

    #[cfg(windows)]
    pub(crate) fn from_pipe(handle: Arc<PipeHandle>, server_owned: bool) -> Self {
        Self { inner: Inner::Pipe(handle), server_owned, closed: AtomicBool::new(false) }
    }

    #[cfg(unix)]
    pub(crate) fn as_raw_fd(&self) -> Option<RawFd> {
        match &self.inner {
            Inner::Fd(guard) => guard.lock().unwrap_or_else(|e| e.into_inner()).as_ref().map(AsRawFd::as_raw_fd),
        }
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(IpcError::SocketClosed.into())
        } else {
            Ok(())
        }
    }

    /// Reads up to `opts.buffer_size` bytes. Blocks indefinitely unless `opts` carries a
    /// timeout, in which case a non-ready socket after that duration fails with
    /// [`IpcError::Timeout`]. An empty result means the peer closed its end of the stream.
    pub fn read(&self, opts: ReadOptions) -> io::Result<Vec<u8>> {
        self.check_open()?;
        if let Some(timeout) = opts.timeout_duration() {
            self.wait_readable(timeout)?;
        }
        let mut buf = vec![0u8; opts.buffer_size_or_default()];
        let n = self.read_raw(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Writes the entire byte string in one synchronous call. The OS, not this crate, decides
    /// whether that takes one or several underlying syscalls on Unix.
    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.check_open()?;
        self.write_raw(bytes).map(drop).map_err(|e| IpcError::WriteFailed.with_source(e))
    }

    /// Returns whether the handle is currently in non-blocking mode.
    pub fn is_nonblocking(&self) -> io::Result<bool> {
        self.check_open()?;
        self.is_nonblocking_raw().map_err(|e| IpcError::StateCheckFailed.with_source(e))
    }

    /// Toggles non-blocking mode. Refused with [`IpcError::ServerOwnedSocket`] for a client
    /// endpoint the server accepted — its blocking mode is the server's to manage.
    pub fn set_nonblocking(&self, flag: bool) -> io::Result<()> {
        self.check_open()?;
        if self.server_owned {
            return Err(IpcError::ServerOwnedSocket.into());
        }
        self.set_nonblocking_raw(flag).map_err(|e| IpcError::SetStateFailed.with_source(e))
    }

    /// Returns a platform-specific description of the peer. On Unix this is the filesystem path
    /// the peer connected from, if the kernel reports one.
    pub fn peer_name(&self) -> io::Result<String> {
        self.check_open()?;
        self.peer_name_raw()
    }

    /// Closes the endpoint. Idempotent: a second call is a cheap no-op that returns `Ok(())`.
    pub fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.close_raw();
        Ok(())
    }

    /// Whether [`Self::close`] has already run (explicitly, or by the transport reclaiming the
    /// slot on disconnect).
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    #[cfg(unix)]
    fn read_raw(&self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.inner {
            Inner::Fd(guard) => {
                let guard = guard.lock().unwrap_or_else(|e| e.into_inner());
                let fd = guard.as_ref().ok_or(IpcError::SocketClosed)?;
                unix::FdOps(fd.as_raw_fd()).read(buf)
            }
        }
    }
    #[cfg(windows)]
    fn read_raw(&self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.inner {
            Inner::Pipe(p) => p.read(buf),
        }
    }

    #[cfg(unix)]
    fn write_raw(&self, buf: &[u8]) -> io::Result<usize> {
        match &self.inner {
            Inner::Fd(guard) => {
                let guard = guard.lock().unwrap_or_else(|e| e.into_inner());
                let fd = guard.as_ref().ok_or(IpcError::SocketClosed)?;
                unix::FdOps(fd.as_raw_fd()).write(buf)
            }
        }
    }
    #[cfg(windows)]
    fn write_raw(&self, buf: &[u8]) -> io::Result<usize> {
        match &self.inner {
            Inner::Pipe(p) => p.write(buf),
        }
    }

    #[cfg(unix)]
    fn is_nonblocking_raw(&self) -> io::Result<bool> {
        match &self.inner {
            Inner::Fd(guard) => {
                let guard = guard.lock().unwrap_or_else(|e| e.into_inner());
                let fd = guard.as_ref().ok_or(IpcError::SocketClosed)?;
                unix::is_nonblocking(fd.as_raw_fd())
            }
        }
    }
    #[cfg(windows)]
    fn is_nonblocking_raw(&self) -> io::Result<bool> {
        match &self.inner {
            Inner::Pipe(p) => p.is_nonblocking(),
        }
    }

    #[cfg(unix)]
    fn set_nonblocking_raw(&self, flag: bool) -> io::Result<()> {
        match &self.inner {
            Inner::Fd(guard) => {
                let guard = guard.lock().unwrap_or_else(|e| e.into_inner());
                let fd = guard.as_ref().ok_or(IpcError::SocketClosed)?;
                unix::set_nonblocking(fd.as_raw_fd(), flag)
            }
        }
    }
    #[cfg(windows)]
    fn set_nonblocking_raw(&self, flag: bool) -> io::Result<()> {
        match &self.inner {
            Inner::Pipe(p) => p.set_nonblocking(flag),
        }
    }

    #[cfg(unix)]
    fn peer_name_raw(&self) -> io::Result<String> {
        match &self.inner {
            Inner::Fd(guard) => {
                let guard = guard.lock().unwrap_or_else(|e| e.into_inner());
                let fd = guard.as_ref().ok_or(IpcError::SocketClosed)?;
                unix::peer_name(fd.as_raw_fd())
            }
        }
    }
    #[cfg(windows)]
    fn peer_name_raw(&self) -> io::Result<String> {
        // Named pipes have no peer address to query; there is nothing meaningful to return here.
        Ok(String::new())
    }

    #[cfg(unix)]
    fn close_raw(&self) {
        match &self.inner {
            Inner::Fd(guard) => {
                let mut guard = guard.lock().unwrap_or_else(|e| e.into_inner());
                guard.take();
            }
        }
    }
    #[cfg(windows)]
    fn close_raw(&self) {
        match &self.inner {
            Inner::Pipe(p) => p.close(),
        }
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<()> {
        #[cfg(unix)]
        {
            let fd = self.as_raw_fd().ok_or(IpcError::SocketClosed)?;
            let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
            let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
            let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
            if ret < 0 {
                return Err(IpcError::PollFailed.with_source(io::Error::last_os_error()));
            }
            if ret == 0 {
                return Err(IpcError::Timeout.into());
            }
            Ok(())
        }
        #[cfg(windows)]
        {
            // The client-side handle is opened in plain blocking mode (no `FILE_FLAG_OVERLAPPED`,
            // see `os::windows::connect`), so there is no completion event to wait on here.
            // `PeekNamedPipe` lets us poll for available bytes (or a broken pipe) without
            // consuming them, which is enough to honor a bounded wait before the real `ReadFile`.
            let Inner::Pipe(p) = &self.inner;
            let handle = p.raw();
            let deadline = std::time::Instant::now() + timeout;
            loop {
                let mut available: u32 = 0;
                let ok = unsafe {
                    windows_sys::Win32::System::Pipes::PeekNamedPipe(
                        handle,
                        std::ptr::null_mut(),
                        0,
                        std::ptr::null_mut(),
                        &mut available,
                        std::ptr::null_mut(),
                    )
                };
                if ok == 0 {
                    // Broken pipe or another error: let the real read below surface it.
                    return Ok(());
                }
                if available > 0 {
                    return Ok(());
                }
                if std::time::Instant::now() >= deadline {
                    return Err(IpcError::Timeout.into());
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Connects to the endpoint at `path`, in blocking mode. Fails with
/// [`IpcError::FailedToConnect`] on OS error.
pub fn connect(path: &str) -> io::Result<Socket> {
    let resolved = path::resolve(path)?;
    #[cfg(unix)]
    {
        let fd = unix::connect(&resolved).map_err(|e| IpcError::FailedToConnect.with_source(e))?;
        Ok(Socket::from_fd(fd, false))
    }
    #[cfg(windows)]
    {
        let handle = windows::connect(&resolved).map_err(|e| IpcError::FailedToConnect.with_source(e))?;
        Ok(Socket::from_pipe(handle, false))
    }
}
