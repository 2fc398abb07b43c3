//! Loads an animation directory and plays it on a background thread.

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{error, info, warn};
use splash_core::{
    Raster,
    animation::{Frame, FrameLoader, Pacer, Player, Script},
    surface::Canvas,
};

use crate::{Error, Result, std_fs};

pub const SCRIPT_NAME: &str = "desc.txt";
/// Frames of a part, matched inside its directory and played in name order.
pub const FRAME_PATTERN: &str = "*.p[bgpn]m";

/// Parses `<dir>/desc.txt` and lists the frames of every part.
pub fn load(dir: &Path) -> Result<Script> {
    let path = dir.join(SCRIPT_NAME);
    let text = std::fs::read_to_string(&path)
        .map_err(Error::io(format!("reading {}", path.display())))?;
    let mut script = Script::parse(&text).map_err(|source| Error::Script {
        path: path.clone(),
        source,
    })?;

    for part in &mut script.parts {
        let part_dir = dir.join(&part.path);
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&part_dir.to_string_lossy()),
            FRAME_PATTERN
        );
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(frame) => part.frames.push(Frame {
                    path: frame.to_string_lossy().into_owned(),
                }),
                Err(e) => warn!("skipping unreadable frame: {e}"),
            }
        }
        info!("animation part {}: {} frames", part.path, part.frames.len());
    }
    Ok(script)
}

/// Decodes frames from disk.
#[derive(Debug, Default)]
pub struct FileFrameLoader;

impl FrameLoader for FileFrameLoader {
    type Error = Error;

    fn load(&mut self, path: &str) -> Result<Raster> {
        std_fs::decode_file(Path::new(path))
    }
}

/// Sleeps away what is left of each frame interval.
#[derive(Debug)]
pub struct ThreadPacer {
    started: Instant,
}

impl Default for ThreadPacer {
    fn default() -> Self {
        ThreadPacer {
            started: Instant::now(),
        }
    }
}

impl Pacer for ThreadPacer {
    fn frame_start(&mut self) {
        self.started = Instant::now();
    }

    fn wait(&mut self, interval: Duration) {
        let remaining = interval.saturating_sub(self.started.elapsed());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

/// An animation running on its own thread. The thread owns the canvas and
/// hands it back from [`AnimationThread::stop`].
pub struct AnimationThread<C> {
    exit: Arc<AtomicBool>,
    handle: JoinHandle<C>,
}

impl<C: Canvas + Send + 'static> AnimationThread<C> {
    pub fn spawn(script: Script, canvas: C) -> Result<Self> {
        let (width, height) = canvas.size();
        if (script.width, script.height) != (width, height) {
            warn!(
                "animation is {}x{}, screen is {}x{}",
                script.width, script.height, width, height
            );
        }

        let exit = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exit);
        let handle = thread::Builder::new()
            .name("animation".into())
            .spawn(move || {
                let mut canvas = canvas;
                let mut player = Player::new(script);
                let mut pacer = ThreadPacer::default();
                if let Err(e) = player.run(&mut canvas, &mut FileFrameLoader, &mut pacer, &flag) {
                    error!("animation stopped: {e}");
                }
                canvas
            })
            .map_err(Error::io("starting animation thread"))?;
        Ok(AnimationThread { exit, handle })
    }
}

impl<C> AnimationThread<C> {
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Asks the animation to end and waits for it. `None` if the thread panicked.
    pub fn stop(self) -> Option<C> {
        self.request_exit();
        match self.handle.join() {
            Ok(canvas) => Some(canvas),
            Err(_) => {
                error!("animation thread panicked");
                None
            }
        }
    }
}
