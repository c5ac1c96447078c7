//! Endpoint path normalization.
//!
//! Given a caller-supplied path string, produces the OS-native endpoint identifier used by both
//! [`connect`](crate::connect) and [`Server::listen`](crate::Server::listen).

use std::ffi::OsString;
use std::io;

#[cfg(windows)]
const PIPE_PREFIX: &str = r"\\.\pipe\";

/// Normalizes `path` into the OS-native endpoint identifier.
///
/// On Unix this is the identity function (bounded, at bind time, by the kernel's
/// `sockaddr_un::sun_path` capacity). On Windows, the `\\.\pipe\` namespace prefix is prepended
/// unless it is already present, so that `resolve(resolve(p)?)? == resolve(p)?`.
pub(crate) fn resolve(path: &str) -> io::Result<OsString> {
    #[cfg(unix)]
    {
        Ok(OsString::from(path))
    }
    #[cfg(windows)]
    {
        if path.starts_with(PIPE_PREFIX) {
            log::trace!("endpoint path {path:?} already carries the pipe namespace prefix");
            Ok(OsString::from(path))
        } else {
            log::trace!("prefixing endpoint path {path:?} with {PIPE_PREFIX:?}");
            let mut full = String::with_capacity(PIPE_PREFIX.len() + path.len());
            full.push_str(PIPE_PREFIX);
            full.push_str(path);
            Ok(OsString::from(full))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn unix_path_is_identity() {
        assert_eq!(resolve("/tmp/foo.sock").unwrap(), OsString::from("/tmp/foo.sock"));
    }

    #[cfg(windows)]
    #[test]
    fn windows_path_gets_prefixed_once() {
        let once = resolve("example").unwrap();
        assert_eq!(once, OsString::from(r"\\.\pipe\example"));
        let twice = resolve(once.to_str().unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[cfg(windows)]
    #[test]
    fn windows_path_with_prefix_is_untouched() {
        let pre = resolve(r"\\.\pipe\already").unwrap();
        assert_eq!(pre, OsString::from(r"\\.\pipe\already"));
    }
}
