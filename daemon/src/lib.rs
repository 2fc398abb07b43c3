//! Linux side of the splash daemon: the framebuffer device, the control
//! socket and the event loop that waits for boot to finish.

pub mod animation;
pub mod control;
pub mod error;
pub mod fbdev;
pub mod reactor;
pub mod std_fs;
pub mod timer;

mod sys;

pub use error::{Error, Result};
