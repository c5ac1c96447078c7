//! Windows transport: duplex, message-type, overlapped named pipes multiplexed with
//! `WaitForMultipleObjects`.

mod handle;
pub(crate) mod transport;

pub(crate) use handle::PipeHandle;
pub(crate) use transport::WindowsTransport;

use std::{ffi::OsStr, io, os::windows::ffi::OsStrExt, ptr, sync::Arc};
use windows_sys::Win32::{
    Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{
        CreateFileW, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
    },
    System::Pipes::{CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_TYPE_MESSAGE, PIPE_WAIT},
};

/// The fixed server-side connect timeout, in milliseconds, per the pipe namespace contract.
pub(crate) const CONNECT_TIMEOUT_MS: u32 = 5000;

pub(crate) fn encode_wide_nul(s: &OsStr) -> Vec<u16> {
    let mut v: Vec<u16> = s.encode_wide().collect();
    v.push(0);
    v
}

/// Connects to the named pipe at `path`, in blocking mode.
pub(crate) fn connect(path: &OsStr) -> io::Result<Arc<PipeHandle>> {
    let wide = encode_wide_nul(path);
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            ptr::null(),
            OPEN_EXISTING,
            0,
            0 as HANDLE,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    Ok(Arc::new(PipeHandle::new(handle)))
}

pub(crate) fn close_handle(handle: HANDLE) {
    if handle != INVALID_HANDLE_VALUE && !handle.is_null() {
        unsafe {
            CloseHandle(handle);
        }
    }
}

/// Creates one server-side pipe instance: duplex, message-type, byte-read-mode, overlapped I/O,
/// with `buffer_size` used for both the inbound and outbound OS buffers per the pipe namespace
/// contract. `max_clients` must be identical across every instance sharing the same pipe name, per
/// `CreateNamedPipeW`'s own requirement.
pub(crate) fn create_instance(wide_path: &[u16], max_clients: usize, buffer_size: usize) -> io::Result<HANDLE> {
    let max_instances = u32::try_from(max_clients).unwrap_or(u32::MAX);
    let buffer_size = u32::try_from(buffer_size).unwrap_or(u32::MAX);
    let handle = unsafe {
        CreateNamedPipeW(
            wide_path.as_ptr(),
            PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED,
            PIPE_TYPE_MESSAGE | PIPE_READMODE_BYTE | PIPE_WAIT,
            max_instances,
            buffer_size,
            buffer_size,
            CONNECT_TIMEOUT_MS,
            ptr::null(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    Ok(handle)
}
