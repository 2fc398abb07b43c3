//! The abstract unix socket clients use to report progress.

use std::{
    io::Write,
    os::{
        fd::AsRawFd,
        linux::net::SocketAddrExt,
        unix::net::{SocketAddr, UnixListener, UnixStream},
    },
};

use log::{debug, info};
use splash_core::protocol::COMPLETE;

use crate::{Error, Result, sys};

pub const DEFAULT_SOCKET: &str = "/splashd";
/// Pending connections queued by the kernel.
pub const BACKLOG: libc::c_int = 5;

fn address(name: &str) -> Result<SocketAddr> {
    SocketAddr::from_abstract_name(name.as_bytes())
        .map_err(Error::io(format!("invalid socket name {name:?}")))
}

/// Binds the non-blocking listener the daemon waits on.
pub fn listen(name: &str) -> Result<UnixListener> {
    let listener = UnixListener::bind_addr(&address(name)?)
        .map_err(Error::io(format!("binding control socket {name:?}")))?;
    // listening again on a bound socket only resizes its queue
    // SAFETY: the descriptor is owned by `listener` for the whole call.
    sys::cvt(unsafe { libc::listen(listener.as_raw_fd(), BACKLOG) })
        .map_err(Error::io("setting control socket backlog"))?;
    listener
        .set_nonblocking(true)
        .map_err(Error::io("making control socket non-blocking"))?;
    info!("listening on abstract socket {name:?}");
    Ok(listener)
}

/// Connects to a running daemon and writes one encoded frame.
pub fn send(name: &str, frame: &[u8]) -> Result<()> {
    let mut stream = UnixStream::connect_addr(&address(name)?)
        .map_err(Error::io(format!("connecting to {name:?}")))?;
    stream
        .write_all(frame)
        .map_err(Error::io("sending progress"))?;
    debug!("sent {} bytes to {name:?}", frame.len());
    Ok(())
}

/// Parses a command line percentage, `None` unless it is a whole number in 0..=100.
pub fn parse_percentage(text: &str) -> Option<u8> {
    text.trim().parse::<u8>().ok().filter(|value| *value <= COMPLETE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages() {
        assert_eq!(parse_percentage("0"), Some(0));
        assert_eq!(parse_percentage(" 42\n"), Some(42));
        assert_eq!(parse_percentage("100"), Some(100));
        assert_eq!(parse_percentage("101"), None);
        assert_eq!(parse_percentage("-1"), None);
        assert_eq!(parse_percentage("4.5"), None);
        assert_eq!(parse_percentage("half"), None);
        assert_eq!(parse_percentage(""), None);
    }

    #[test]
    fn send_without_daemon_fails() {
        let name = format!("/splashd-test-absent-{}", std::process::id());
        assert!(matches!(send(&name, &[1, 0]), Err(Error::Io { .. })));
    }
}
