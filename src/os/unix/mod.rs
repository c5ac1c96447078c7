//! Unix transport: `AF_UNIX` `SOCK_STREAM` sockets multiplexed with `poll(2)`.

mod fd;
pub(crate) mod transport;

pub(crate) use fd::FdOps;
pub(crate) use transport::UnixTransport;

use std::{
    ffi::OsStr,
    io,
    os::{
        fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
        unix::ffi::OsStrExt,
    },
    ptr,
};

// `sockaddr_un::sun_path` is 108 bytes on Linux-family platforms but only 104 bytes on the BSDs
// and macOS; hardcoding 108 everywhere reads/writes past the real field on the latter.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "emscripten",
    target_os = "solaris",
    target_os = "illumos",
    target_os = "hermit",
    target_os = "redox",
    all(target_env = "newlib", target_arch = "xtensa"),
    target_env = "uclibc",
))]
const SUN_PATH_LEN: usize = 108;
#[cfg(any(
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    target_os = "macos",
    target_os = "ios",
))]
const SUN_PATH_LEN: usize = 104;

/// Connects to the Unix domain socket at `path`, in blocking mode.
pub(crate) fn connect(path: &OsStr) -> io::Result<OwnedFd> {
    let fd = new_stream_socket()?;
    let addr = SockAddrUn::new(path)?;
    let ret = unsafe {
        libc::connect(fd.as_raw_fd(), addr.as_ptr().cast(), addr.len())
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Creates, binds and begins listening on a fresh `AF_UNIX` `SOCK_STREAM` socket at `path`,
/// unlinking any stale filesystem entry first (ignoring `ENOENT`).
pub(crate) fn create_listener(path: &OsStr, backlog: i32) -> io::Result<OwnedFd> {
    let fd = new_stream_socket()?;
    set_nonblocking(fd.as_raw_fd(), true)?;

    let unlink_ret = unsafe { libc::unlink(SockAddrUn::cpath(path)?.as_ptr()) };
    if unlink_ret == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::NotFound {
            return Err(err);
        }
    }

    let addr = SockAddrUn::new(path)?;
    let bind_ret = unsafe { libc::bind(fd.as_raw_fd(), addr.as_ptr().cast(), addr.len()) };
    if bind_ret == -1 {
        return Err(io::Error::last_os_error());
    }
    let listen_ret = unsafe { libc::listen(fd.as_raw_fd(), backlog) };
    if listen_ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Removes the rendezvous file at `path`, ignoring `ENOENT`.
pub(crate) fn unlink(path: &OsStr) -> io::Result<()> {
    let cpath = SockAddrUn::cpath(path)?;
    let ret = unsafe { libc::unlink(cpath.as_ptr()) };
    if ret == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::NotFound {
            return Err(err);
        }
    }
    Ok(())
}

fn new_stream_socket() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    let new_flags =
        if nonblocking { flags | libc::O_NONBLOCK } else { flags & !libc::O_NONBLOCK };
    if unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn is_nonblocking(fd: RawFd) -> io::Result<bool> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags & libc::O_NONBLOCK != 0)
}

pub(crate) fn peer_name(fd: RawFd) -> io::Result<String> {
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
    let ret =
        unsafe { libc::getpeername(fd, ptr::addr_of_mut!(addr).cast(), ptr::addr_of_mut!(len)) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    let path_bytes = unsafe { &*ptr::addr_of!(addr.sun_path).cast::<[u8; SUN_PATH_LEN]>() };
    let nul = path_bytes.iter().position(|&b| b == 0).unwrap_or(path_bytes.len());
    Ok(String::from_utf8_lossy(&path_bytes[..nul]).into_owned())
}

/// A `sockaddr_un` built from an `OsStr` path, retaining the `CString`-style NUL terminator
/// required by the kernel ABI.
struct SockAddrUn {
    addr: libc::sockaddr_un,
    len: libc::socklen_t,
}
impl SockAddrUn {
    fn cpath(path: &OsStr) -> io::Result<std::ffi::CString> {
        std::ffi::CString::new(path.as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
    }
    fn new(path: &OsStr) -> io::Result<Self> {
        let bytes = path.as_bytes();
        let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
        let sun_path = unsafe { &mut *ptr::addr_of_mut!(addr.sun_path).cast::<[u8; SUN_PATH_LEN]>() };
        if bytes.len() >= sun_path.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "endpoint path exceeds the platform's socket address length limit",
            ));
        }
        sun_path[..bytes.len()].copy_from_slice(bytes);
        let len = (std::mem::size_of::<libc::sa_family_t>() + bytes.len() + 1) as libc::socklen_t;
        Ok(Self { addr, len })
    }
    fn as_ptr(&self) -> *const libc::sockaddr_un { &self.addr }
    fn len(&self) -> libc::socklen_t { self.len }
}
