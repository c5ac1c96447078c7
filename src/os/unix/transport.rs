//! `poll(2)`-based multiplexing: index 0 of `pollfds` is the listening socket; indices `1..` are
//! live clients, in the order they were admitted.

use super::{create_listener, set_nonblocking};
use crate::{
    server::{
        transport::{DataSlot, HarvestOutcome, PendingAccept, Transport},
        ClientId, Timeout,
    },
    socket::Socket,
};
use std::{
    ffi::OsStr,
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

/// A connection accepted off the listening socket, not yet wired into the pollfd vector.
pub(crate) struct UnixPending {
    fd: OwnedFd,
}
impl PendingAccept for UnixPending {
    fn id(&self) -> ClientId { ClientId::from_raw(i64::from(self.fd.as_raw_fd())) }
}

pub(crate) struct UnixTransport {
    listener: Option<OwnedFd>,
    path: std::ffi::OsString,
    pollfds: Vec<libc::pollfd>,
    client_count: usize,
    buffer_size: usize,
}

impl UnixTransport {
    /// The listening socket's raw file descriptor, the kernel-assigned identity that distinguishes
    /// this listening socket from any other one bound to the same path (e.g. a prior, now-closed
    /// server that used the same rendezvous file).
    pub(crate) fn listener_fd(&self) -> RawFd {
        self.listener.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }

    fn accept_one(&self) -> io::Result<Option<OwnedFd>> {
        let ret = unsafe { libc::accept(self.listener_fd(), std::ptr::null_mut(), std::ptr::null_mut()) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(err),
            };
        }
        let fd = unsafe { OwnedFd::from_raw_fd(ret) };
        set_nonblocking(fd.as_raw_fd(), true)?;
        Ok(Some(fd))
    }
}

impl Transport for UnixTransport {
    type Pending = UnixPending;

    fn create(path: &OsStr, max_clients: usize, buffer_size: usize) -> io::Result<Self> {
        let backlog = i32::try_from(max_clients).unwrap_or(i32::MAX);
        let listener = create_listener(path, backlog)?;
        let pollfds = vec![libc::pollfd { fd: listener.as_raw_fd(), events: libc::POLLIN, revents: 0 }];
        Ok(Self { listener: Some(listener), path: path.to_owned(), pollfds, client_count: 0, buffer_size })
    }

    fn wait(&mut self, timeout: Timeout) -> io::Result<()> {
        let millis = match timeout {
            Timeout::Immediate => 0,
            Timeout::Millis(ms) => i32::try_from(ms).unwrap_or(i32::MAX),
            Timeout::Infinite => -1,
        };
        let ret = unsafe {
            libc::poll(self.pollfds.as_mut_ptr(), self.pollfds.len() as libc::nfds_t, millis)
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                for pfd in &mut self.pollfds {
                    pfd.revents = 0;
                }
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    fn next_pending_accept(&mut self) -> io::Result<Option<Self::Pending>> {
        let listen_ready = self.pollfds.first().is_some_and(|pfd| pfd.revents & libc::POLLIN != 0);
        if !listen_ready {
            return Ok(None);
        }
        match self.accept_one()? {
            Some(fd) => Ok(Some(UnixPending { fd })),
            None => {
                // Drained; clear the bit so a later call in the same tick doesn't retry it.
                if let Some(pfd) = self.pollfds.first_mut() {
                    pfd.revents &= !libc::POLLIN;
                }
                Ok(None)
            }
        }
    }

    fn admit(&mut self, pending: Self::Pending) -> io::Result<Socket> {
        self.pollfds.push(libc::pollfd { fd: pending.fd.as_raw_fd(), events: libc::POLLIN, revents: 0 });
        self.client_count += 1;
        Ok(Socket::from_fd(pending.fd, true))
    }

    fn reject(&mut self, pending: Self::Pending) {
        drop(pending.fd);
    }

    fn revoke(&mut self, id: ClientId) {
        if let Some(pfd) = self.pollfds.iter_mut().skip(1).find(|pfd| i64::from(pfd.fd) == id.as_raw()) {
            pfd.fd = -1;
            self.client_count = self.client_count.saturating_sub(1);
        }
    }

    fn ready_data_slots(&self) -> Vec<DataSlot> {
        self.pollfds
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, pfd)| pfd.fd >= 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
            .map(|(index, pfd)| DataSlot { id: ClientId::from_raw(i64::from(pfd.fd)), index })
            .collect()
    }

    fn harvest(&mut self, slot: DataSlot, buf: &mut Vec<u8>) -> HarvestOutcome {
        let fd = self.pollfds.get(slot.index).map(|pfd| pfd.fd).unwrap_or(-1) as RawFd;
        if fd < 0 {
            return HarvestOutcome::Disconnected;
        }
        let ops = super::FdOps(fd);
        buf.clear();
        buf.resize(self.buffer_size, 0);
        match ops.read(buf) {
            Ok(0) => HarvestOutcome::Disconnected,
            Ok(n) => {
                buf.truncate(n);
                HarvestOutcome::Data(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => HarvestOutcome::WouldBlock,
            Err(e) => HarvestOutcome::Error(e),
        }
    }

    fn reclaim(&mut self, slot: DataSlot) {
        // The fd itself is owned by the client's `Socket` (handed out at admission); marking the
        // pollfd slot dead just stops this transport from polling it again. The socket is closed,
        // if at all, by whoever drops the last `Client`/`Socket` reference.
        if let Some(pfd) = self.pollfds.get_mut(slot.index) {
            pfd.fd = -1;
        }
        self.client_count = self.client_count.saturating_sub(1);
    }

    fn compact(&mut self) {
        self.pollfds.retain(|pfd| pfd.fd >= 0);
    }

    fn client_count(&self) -> usize { self.client_count }

    fn teardown(&mut self) {
        self.listener.take();
        self.pollfds.clear();
        let _ = super::unlink(&self.path);
    }
}
