use std::{
    io,
    os::fd::{AsRawFd, RawFd},
};

/// Thin wrapper around a raw file descriptor providing the handful of syscalls the transport and
/// the client-side socket need. Does not own the descriptor; callers pair it with an `OwnedFd`.
#[repr(transparent)]
pub(crate) struct FdOps(pub(crate) RawFd);

impl FdOps {
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe { libc::read(self.0, buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe { libc::write(self.0, buf.as_ptr().cast(), buf.len()) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
}
impl AsRawFd for FdOps {
    fn as_raw_fd(&self) -> RawFd { self.0 }
}
