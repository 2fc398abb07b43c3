use std::{
    io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd},
    time::Duration,
};

use log::debug;
use strum::EnumCount;

use crate::{Error, Result, sys};

/// What a timer is for. Each role has at most one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumCount, strum_macros::EnumIter)]
pub enum TimerRole {
    /// Boot did not complete in time.
    Quit,
}

impl TimerRole {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TimerRole::Quit),
            _ => None,
        }
    }
}

fn timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as _,
        tv_nsec: duration.subsec_nanos() as _,
    }
}

/// A monotonic timerfd.
#[derive(Debug)]
pub struct Timer {
    fd: OwnedFd,
}

impl Timer {
    /// Arms a timer that fires once after `after`, then every `after` when `repeat` is set.
    pub fn new(after: Duration, repeat: bool) -> Result<Self> {
        // SAFETY: plain syscall, the result is checked before use.
        let raw = sys::cvt(unsafe {
            libc::timerfd_create(
                libc::CLOCK_MONOTONIC,
                libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
            )
        })
        .map_err(Error::io("creating timer"))?;
        // SAFETY: `raw` is a fresh descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // a zero value would disarm the timer
        let after = after.max(Duration::from_nanos(1));
        let spec = libc::itimerspec {
            it_interval: timespec(if repeat { after } else { Duration::ZERO }),
            it_value: timespec(after),
        };
        // SAFETY: `spec` outlives the call, the old value is not requested.
        sys::cvt(unsafe { libc::timerfd_settime(fd.as_raw_fd(), 0, &spec, std::ptr::null_mut()) })
            .map_err(Error::io("arming timer"))?;
        debug!("timer armed for {after:?}, repeat: {repeat}");
        Ok(Timer { fd })
    }

    /// Reads the expiration counter. Returns 0 when nothing expired yet.
    pub fn drain(&self) -> io::Result<u64> {
        let mut count = [0u8; 8];
        // SAFETY: the buffer is valid for 8 bytes.
        let read =
            unsafe { libc::read(self.fd.as_raw_fd(), count.as_mut_ptr().cast(), count.len()) };
        if read == -1 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(error);
        }
        Ok(u64::from_ne_bytes(count))
    }

    pub fn close(self) {
        sys::close_fd(self.fd, "timer");
    }
}

impl AsFd for Timer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Timer {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// One slot per [`TimerRole`].
#[derive(Debug)]
pub struct TimerRegistry {
    timers: [Option<Timer>; TimerRole::COUNT],
}

impl Default for TimerRegistry {
    fn default() -> Self {
        TimerRegistry {
            timers: std::array::from_fn(|_| None),
        }
    }
}

impl TimerRegistry {
    pub fn insert(&mut self, role: TimerRole, timer: Timer) -> Result<&Timer> {
        let slot = &mut self.timers[role.index()];
        if slot.is_some() {
            return Err(Error::TimerInUse(role));
        }
        Ok(slot.insert(timer))
    }

    pub fn get(&self, role: TimerRole) -> Option<&Timer> {
        self.timers[role.index()].as_ref()
    }

    pub fn remove(&mut self, role: TimerRole) -> Option<Timer> {
        self.timers[role.index()].take()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.iter().all(Option::is_none)
    }

    pub fn close_all(&mut self) {
        for (index, slot) in self.timers.iter_mut().enumerate() {
            if let Some(timer) = slot.take() {
                debug!("closing {:?} timer", TimerRole::from_index(index));
                timer.close();
            }
        }
    }
}
