use std::{io, path::PathBuf};

use splash_core::{animation::ScriptError, protocol::ProtocolError, surface::SurfaceError};

use crate::timer::TimerRole;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("framebuffer type {0} is not packed pixels")]
    UnsupportedType(u32),
    #[error("framebuffer visual {0} is not true or direct color")]
    UnsupportedVisual(u32),
    #[error("framebuffer {field} value {value} is out of range")]
    Geometry { field: &'static str, value: u32 },
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("decoding {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: embedded_pnm::Error,
    },
    #[error("encoding {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: embedded_pnm::Error,
    },
    #[error("{}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: ScriptError,
    },
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("timer {0:?} is already armed")]
    TimerInUse(TimerRole),
}

impl Error {
    /// Wraps an [`io::Error`] with what was being done, for use with `map_err`.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Error {
        let context = context.into();
        move |source| Error::Io { context, source }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
