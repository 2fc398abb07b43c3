//! Single-threaded epoll loop watching the quit timer, the control socket
//! and the one client allowed to report progress at a time.

use std::{
    io::{self, Read},
    os::{
        fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
        unix::net::{UnixListener, UnixStream},
    },
    time::Duration,
};

use log::{debug, error, info, warn};
use splash_core::protocol::{BootStatus, FRAME_CAPACITY, FrameAssembler, ProtocolError, Update};

use crate::{
    Error, Result, control, sys,
    timer::{Timer, TimerRegistry, TimerRole},
};

/// Events handled per wakeup.
pub const MAX_EVENTS: usize = 5;

const LISTENER_TOKEN: u64 = 1 << 32;
const CONNECTION_TOKEN: u64 = 2 << 32;

/// Identifies a watched descriptor in epoll user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Timer(TimerRole),
    Listener,
    Connection,
}

impl From<Token> for u64 {
    fn from(token: Token) -> u64 {
        match token {
            Token::Timer(role) => role.index() as u64,
            Token::Listener => LISTENER_TOKEN,
            Token::Connection => CONNECTION_TOKEN,
        }
    }
}

impl TryFrom<u64> for Token {
    type Error = u64;

    fn try_from(data: u64) -> core::result::Result<Self, u64> {
        match data {
            LISTENER_TOKEN => Ok(Token::Listener),
            CONNECTION_TOKEN => Ok(Token::Connection),
            index => usize::try_from(index)
                .ok()
                .and_then(TimerRole::from_index)
                .map(Token::Timer)
                .ok_or(data),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A client reported 100%.
    Success,
    /// Gave up waiting, boot did not complete.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Running,
    Stopped(Outcome),
}

/// Application state the handlers update.
#[derive(Debug, Clone)]
pub struct Context {
    pub status: BootStatus,
    /// Progress frames applied so far.
    pub updates: u32,
    state: LoopState,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            status: BootStatus::default(),
            updates: 0,
            state: LoopState::NotStarted,
        }
    }
}

impl Context {
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The first outcome wins, later stop requests are ignored.
    pub fn stop(&mut self, outcome: Outcome) {
        if !matches!(self.state, LoopState::Stopped(_)) {
            debug!("event loop stopping: {outcome:?}");
            self.state = LoopState::Stopped(outcome);
        }
    }

    fn apply(&mut self, frame: core::result::Result<Update, ProtocolError>) {
        match frame {
            Ok(update) => {
                if update.malformed {
                    warn!(
                        "malformed progress frame, applying {}% anyway",
                        update.status.percentage()
                    );
                }
                info!(
                    "boot progress {}%: {}",
                    update.status.percentage(),
                    String::from_utf8_lossy(update.status.message())
                );
                self.status = update.status;
                self.updates += 1;
                if self.status.is_complete() {
                    self.stop(Outcome::Success);
                }
            }
            Err(e) => warn!("ignoring progress frame: {e}"),
        }
    }
}

pub struct Reactor {
    epoll: OwnedFd,
    timers: TimerRegistry,
    listener: Option<UnixListener>,
    connection: Option<UnixStream>,
    frames: FrameAssembler,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        // SAFETY: plain syscall, the result is checked before use.
        let raw = sys::cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })
            .map_err(Error::io("creating epoll instance"))?;
        Ok(Reactor {
            // SAFETY: `raw` is a fresh descriptor owned by nobody else.
            epoll: unsafe { OwnedFd::from_raw_fd(raw) },
            timers: TimerRegistry::default(),
            listener: None,
            connection: None,
            frames: FrameAssembler::default(),
        })
    }

    fn control(&self, op: libc::c_int, fd: RawFd, token: Token) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: token.into(),
        };
        // SAFETY: `event` outlives the call.
        sys::cvt(unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) })?;
        Ok(())
    }

    fn watch(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.control(libc::EPOLL_CTL_ADD, fd, token)
    }

    fn unwatch(&self, fd: RawFd, token: Token) {
        if let Err(e) = self.control(libc::EPOLL_CTL_DEL, fd, token) {
            warn!("removing {token:?} from epoll: {e}");
        }
    }

    /// Arms a timer for `role` and watches it.
    pub fn add_timer(&mut self, role: TimerRole, after: Duration, repeat: bool) -> Result<()> {
        if self.timers.get(role).is_some() {
            return Err(Error::TimerInUse(role));
        }
        let timer = Timer::new(after, repeat)?;
        self.watch(timer.as_raw_fd(), Token::Timer(role))
            .map_err(Error::io(format!("watching {role:?} timer")))?;
        self.timers.insert(role, timer)?;
        info!("{role:?} timer set to {after:?}");
        Ok(())
    }

    /// Starts accepting clients on the abstract socket `name`.
    pub fn listen(&mut self, name: &str) -> Result<()> {
        let listener = control::listen(name)?;
        self.watch(listener.as_raw_fd(), Token::Listener)
            .map_err(Error::io("watching control socket"))?;
        self.listener = Some(listener);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Dispatches events until a handler stops `context`.
    ///
    /// With nothing to watch the loop could never end, so it fails right away.
    pub fn run(&mut self, context: &mut Context) -> Result<Outcome> {
        if self.timers.is_empty() && self.listener.is_none() {
            warn!("nothing to wait for, giving up");
            context.stop(Outcome::Failure);
        } else {
            context.state = LoopState::Running;
        }

        let mut events = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        while let LoopState::Running = context.state {
            // SAFETY: `events` holds MAX_EVENTS entries.
            let ready = unsafe {
                libc::epoll_wait(
                    self.epoll.as_raw_fd(),
                    events.as_mut_ptr(),
                    MAX_EVENTS as libc::c_int,
                    -1,
                )
            };
            if ready == -1 {
                let error = io::Error::last_os_error();
                if error.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                context.stop(Outcome::Failure);
                return Err(Error::Io {
                    context: "waiting for events".into(),
                    source: error,
                });
            }

            for event in &events[..ready as usize] {
                let data = event.u64;
                match Token::try_from(data) {
                    Ok(token) => self.dispatch(token, context),
                    Err(data) => warn!("event for unknown token {data:#x}"),
                }
            }
        }

        match context.state {
            LoopState::Stopped(outcome) => Ok(outcome),
            _ => Ok(Outcome::Failure),
        }
    }

    fn dispatch(&mut self, token: Token, context: &mut Context) {
        match token {
            Token::Timer(role) => self.on_timer(role, context),
            Token::Listener => self.on_listener(),
            Token::Connection => self.on_connection(context),
        }
    }

    fn on_timer(&mut self, role: TimerRole, context: &mut Context) {
        if let Some(timer) = self.timers.get(role) {
            match timer.drain() {
                Ok(0) => return,
                Ok(count) => debug!("{role:?} timer expired {count} times"),
                Err(e) => error!("reading {role:?} timer: {e}"),
            }
        }
        match role {
            TimerRole::Quit => {
                warn!("boot did not complete in time");
                context.stop(Outcome::Failure);
            }
        }
    }

    fn on_listener(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            let stream = match listener.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accepting client: {e}");
                    break;
                }
            };
            if let Err(e) = stream.set_nonblocking(true) {
                error!("making client non-blocking: {e}");
                continue;
            }
            if self.connection.is_some() {
                discard(stream);
                continue;
            }
            match self.watch(stream.as_raw_fd(), Token::Connection) {
                Ok(()) => {
                    debug!("client connected");
                    self.connection = Some(stream);
                }
                Err(e) => error!("watching client: {e}"),
            }
        }
    }

    fn on_connection(&mut self, context: &mut Context) {
        let Some(stream) = &mut self.connection else {
            return;
        };
        let mut buffer = [0u8; FRAME_CAPACITY];
        match stream.read(&mut buffer) {
            Ok(0) => {
                debug!("client disconnected");
                if let Some(tail) = self.frames.finish() {
                    context.apply(tail);
                }
                self.close_connection();
            }
            Ok(read) => self.frames.feed(&buffer[..read], |frame| context.apply(frame)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                error!("reading from client: {e}");
                self.close_connection();
            }
        }
    }

    fn close_connection(&mut self) {
        if let Some(stream) = self.connection.take() {
            self.unwatch(stream.as_raw_fd(), Token::Connection);
            sys::close_fd(stream.into(), "client connection");
        }
        self.frames = FrameAssembler::default();
    }

    /// Closes every descriptor. Failures are logged and teardown goes on.
    pub fn shutdown(mut self) {
        self.close_connection();
        if let Some(listener) = self.listener.take() {
            sys::close_fd(listener.into(), "control socket");
        }
        self.timers.close_all();
        sys::close_fd(self.epoll, "epoll instance");
        debug!("event loop shut down");
    }
}

/// Drops a client that connected while another one is active.
fn discard(mut stream: UnixStream) {
    let mut buffer = [0u8; FRAME_CAPACITY];
    let mut dropped = 0;
    while let Ok(read @ 1..) = stream.read(&mut buffer) {
        dropped += read;
    }
    info!("busy, discarded extra client and {dropped} bytes");
}
