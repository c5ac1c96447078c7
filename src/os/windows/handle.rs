use super::close_handle;
use std::{io, ptr, sync::Mutex};
use windows_sys::Win32::{
    Foundation::{BOOL, HANDLE, PIPE_NOWAIT},
    Storage::FileSystem::{ReadFile, WriteFile},
    System::Pipes::{GetNamedPipeHandleState, SetNamedPipeHandleState},
};

/// A named pipe handle that may be invalidated from under a held [`Client`](crate::Client) when
/// the server reuses the underlying pipe instance for its next connection: the pipe instance is
/// disconnected and reconnected in place rather than recreated, so the same `HANDLE` value can
/// outlive several client sessions (see `DESIGN.md`).
pub(crate) struct PipeHandle {
    handle: Mutex<HANDLE>,
}

// SAFETY: `HANDLE` is an opaque kernel object reference with no thread affinity; every access
// goes through the mutex.
unsafe impl Send for PipeHandle {}
unsafe impl Sync for PipeHandle {}

impl PipeHandle {
    pub fn new(handle: HANDLE) -> Self { Self { handle: Mutex::new(handle) } }

    pub fn raw(&self) -> HANDLE {
        *self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn replace(&self, new_handle: HANDLE) {
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = new_handle;
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let h = self.raw();
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut read: u32 = 0;
        let ok: BOOL = unsafe {
            ReadFile(h, buf.as_mut_ptr().cast(), len, &mut read, ptr::null_mut())
        };
        if ok == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(read as usize)
        }
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let h = self.raw();
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut written: u32 = 0;
        let ok: BOOL = unsafe {
            WriteFile(h, buf.as_ptr().cast(), len, &mut written, ptr::null_mut())
        };
        if ok == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(written as usize)
        }
    }

    pub fn is_nonblocking(&self) -> io::Result<bool> {
        let h = self.raw();
        let mut mode: u32 = 0;
        let ok: BOOL = unsafe {
            GetNamedPipeHandleState(h, &mut mode, ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), 0)
        };
        if ok == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(mode & PIPE_NOWAIT != 0)
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        let h = self.raw();
        let mut mode: u32 = 0;
        let ok: BOOL = unsafe {
            GetNamedPipeHandleState(h, &mut mode, ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), 0)
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        if nonblocking {
            mode |= PIPE_NOWAIT;
        } else {
            mode &= !PIPE_NOWAIT;
        }
        let ok: BOOL = unsafe { SetNamedPipeHandleState(h, &mut mode, ptr::null_mut(), ptr::null_mut()) };
        if ok == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Closes the handle. Idempotent is enforced by the caller via the `closed` flag on
    /// [`Socket`](crate::socket::Socket); this replaces the stored value with a sentinel so a
    /// concurrent reader sees an immediate error rather than operating on a reused handle.
    pub fn close(&self) {
        let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        close_handle(*guard);
        *guard = windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
    }
}

