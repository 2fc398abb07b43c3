use std::{
    io,
    os::fd::{IntoRawFd, OwnedFd},
};

use log::error;

/// Turns the `-1` convention of libc calls into an [`io::Error`].
pub(crate) fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Closes `fd` and logs a failure instead of returning it.
pub(crate) fn close_fd(fd: OwnedFd, what: &str) {
    let raw = fd.into_raw_fd();
    // SAFETY: `raw` came out of an OwnedFd and is closed exactly once here.
    if unsafe { libc::close(raw) } == -1 {
        error!("closing {what}: {}", io::Error::last_os_error());
    }
}
