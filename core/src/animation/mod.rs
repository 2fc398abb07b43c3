//! Frame-by-frame boot animations.
//!
//! An animation is a directory with a `desc.txt` script and one sub-directory
//! of still frames per part. [`script`] parses the description, [`player`]
//! walks the parts and draws each frame at the scripted rate.

pub mod player;
pub mod script;

pub use player::{FrameLoader, Pacer, PartState, PlaybackError, Player, Summary};
pub use script::{Frame, Part, Script, ScriptError};
