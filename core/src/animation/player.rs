use alloc::{string::String, vec::Vec};
use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use log::{debug, info, warn};

use super::script::Script;
use crate::{Raster, surface::Canvas};

/// Decodes a frame image on first use.
pub trait FrameLoader {
    type Error;

    fn load(&mut self, path: &str) -> Result<Raster, Self::Error>;
}

/// Frame-rate pacing. `wait` is called after each frame is drawn and should
/// sleep for what is left of `interval` since the matching `frame_start`.
pub trait Pacer {
    fn frame_start(&mut self);
    fn wait(&mut self, interval: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    Pending,
    Playing { iteration: u32 },
    Done,
}

#[derive(Debug)]
pub enum PlaybackError<E> {
    Load { path: String, error: E },
}

impl<E: core::fmt::Display> core::fmt::Display for PlaybackError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlaybackError::Load { path, error } => write!(f, "loading frame {path}: {error}"),
        }
    }
}

impl<E: core::fmt::Debug + core::fmt::Display> core::error::Error for PlaybackError<E> {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub frames: u32,
    pub iterations: u32,
    pub decoded: u32,
}

/// Plays a [`Script`] part after part.
///
/// A part loops until its count is reached. An exit request stops the current
/// part at the next frame, or at the end of the running iteration for parts
/// marked play-until-complete. No iteration starts once exit was requested.
pub struct Player {
    script: Script,
    states: Vec<PartState>,
    cache: Vec<Vec<Option<Raster>>>,
}

impl Player {
    pub fn new(script: Script) -> Self {
        let states = alloc::vec![PartState::Pending; script.parts.len()];
        let cache = script
            .parts
            .iter()
            .map(|part| part.frames.iter().map(|_| None).collect())
            .collect();
        Self {
            script,
            states,
            cache,
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn states(&self) -> &[PartState] {
        &self.states
    }

    pub fn run<C, L, P>(
        &mut self,
        canvas: &mut C,
        loader: &mut L,
        pacer: &mut P,
        exit: &AtomicBool,
    ) -> Result<Summary, PlaybackError<L::Error>>
    where
        C: Canvas,
        L: FrameLoader,
        P: Pacer,
    {
        let interval = self.script.frame_interval();
        let mut summary = Summary::default();

        for index in 0..self.script.parts.len() {
            let part = &self.script.parts[index];
            if part.frames.is_empty() {
                warn!("animation part {} has no frames", part.path);
                self.states[index] = PartState::Done;
                continue;
            }

            let mut iteration = 0;
            while part.is_infinite() || iteration < part.count {
                if exit.load(Ordering::Acquire) {
                    break;
                }
                self.states[index] = PartState::Playing { iteration };

                for (frame, slot) in part.frames.iter().zip(self.cache[index].iter_mut()) {
                    if !part.play_until_complete && exit.load(Ordering::Acquire) {
                        break;
                    }
                    pacer.frame_start();
                    if slot.is_none() {
                        let raster = loader.load(&frame.path).map_err(|error| {
                            PlaybackError::Load {
                                path: frame.path.clone(),
                                error,
                            }
                        })?;
                        summary.decoded += 1;
                        *slot = Some(raster);
                    }
                    if let Some(raster) = slot {
                        canvas.blit(raster, 0.5, 0.5);
                        summary.frames += 1;
                    }
                    pacer.wait(interval);
                }

                iteration += 1;
                summary.iterations += 1;
            }

            debug!("animation part {} done after {} iterations", part.path, iteration);
            self.states[index] = PartState::Done;
            if part.count == 1 {
                self.cache[index] = Vec::new();
                self.script.parts[index].frames = Vec::new();
            }
        }

        info!(
            "animation finished: {} frames, {} iterations, {} decoded",
            summary.frames, summary.iterations, summary.decoded
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::{
        Rgb,
        animation::{Frame, Part},
        surface::Region,
    };
    use alloc::{format, string::ToString, vec};
    use std::collections::HashMap;

    /// Frame ids are smuggled through the raster width.
    struct IdLoader {
        loads: HashMap<String, u32>,
    }

    impl FrameLoader for IdLoader {
        type Error = &'static str;

        fn load(&mut self, path: &str) -> Result<Raster, Self::Error> {
            if path.ends_with("broken") {
                return Err("broken frame");
            }
            *self.loads.entry(path.to_string()).or_default() += 1;
            let id: u32 = path.rsplit('/').next().unwrap().parse().unwrap();
            Ok(Raster::filled(id, 1, Rgb::BLACK))
        }
    }

    #[derive(Default)]
    struct Recorder {
        drawn: Vec<u32>,
    }

    impl Canvas for Recorder {
        fn size(&self) -> (u32, u32) {
            (1000, 1)
        }

        fn blit(&mut self, raster: &Raster, _: f32, _: f32) -> Region {
            self.drawn.push(raster.width());
            Region::default()
        }
    }

    /// Raises the exit flag once `exit_after` frames were drawn.
    struct CountingPacer<'a> {
        frames: u32,
        exit_after: Option<u32>,
        exit: &'a AtomicBool,
        waited: Vec<Duration>,
    }

    impl Pacer for CountingPacer<'_> {
        fn frame_start(&mut self) {}

        fn wait(&mut self, interval: Duration) {
            self.frames += 1;
            self.waited.push(interval);
            if Some(self.frames) == self.exit_after {
                self.exit.store(true, Ordering::Release);
            }
        }
    }

    fn part(count: u32, complete: bool, dir: u32, frames: &[u32]) -> Part {
        Part {
            count,
            pause: 0,
            play_until_complete: complete,
            path: format!("part{dir}"),
            frames: frames
                .iter()
                .map(|id| Frame { path: format!("part{dir}/{id}") })
                .collect(),
        }
    }

    fn play(parts: Vec<Part>, exit_after: Option<u32>) -> (Player, Vec<u32>, Summary, IdLoader) {
        let script = Script { width: 1000, height: 1, fps: 50, parts };
        let mut player = Player::new(script);
        let exit = AtomicBool::new(false);
        let mut canvas = Recorder::default();
        let mut loader = IdLoader { loads: HashMap::new() };
        let mut pacer = CountingPacer { frames: 0, exit_after, exit: &exit, waited: Vec::new() };
        let summary = player.run(&mut canvas, &mut loader, &mut pacer, &exit).unwrap();
        assert!(pacer.waited.iter().all(|d| *d == Duration::from_millis(20)));
        (player, canvas.drawn, summary, loader)
    }

    #[test]
    fn counted_part_plays_exactly_count_iterations() {
        let (player, drawn, summary, _) =
            play(vec![part(3, false, 0, &[1, 2]), part(1, false, 1, &[9])], None);
        assert_eq!(drawn, [1, 2, 1, 2, 1, 2, 9]);
        assert_eq!(summary.iterations, 4);
        assert!(player.states().iter().all(|s| *s == PartState::Done));
    }

    #[test]
    fn frames_are_decoded_once() {
        let (_, _, summary, loader) = play(vec![part(4, false, 0, &[1, 2, 3])], None);
        assert_eq!(summary.frames, 12);
        assert_eq!(summary.decoded, 3);
        assert!(loader.loads.values().all(|n| *n == 1));
    }

    #[test]
    fn single_pass_parts_release_frames() {
        let (player, _, _, _) =
            play(vec![part(1, false, 0, &[1, 2]), part(2, false, 1, &[3])], None);
        assert!(player.script().parts[0].frames.is_empty());
        assert!(player.cache[0].is_empty());
        assert_eq!(player.script().parts[1].frames.len(), 1);
        assert!(player.cache[1].iter().all(Option::is_some));
    }

    #[test]
    fn infinite_part_stops_at_next_frame() {
        // exit raised after the 2nd frame of the 2nd iteration
        let (player, drawn, summary, _) =
            play(vec![part(0, false, 0, &[1, 2, 3]), part(2, false, 1, &[7])], Some(5));
        assert_eq!(drawn, [1, 2, 3, 1, 2]);
        assert_eq!(summary.iterations, 2);
        assert_eq!(player.states(), &[PartState::Done, PartState::Done]);
    }

    #[test]
    fn complete_part_finishes_its_iteration() {
        let (_, drawn, summary, _) = play(vec![part(0, true, 0, &[1, 2, 3, 4])], Some(6));
        assert_eq!(drawn, [1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(summary.iterations, 2);
    }

    #[test]
    fn no_part_starts_after_exit() {
        let (_, drawn, _, _) =
            play(vec![part(1, false, 0, &[1, 2]), part(1, true, 1, &[5])], Some(2));
        assert_eq!(drawn, [1, 2]);
    }

    #[test]
    fn empty_parts_are_skipped() {
        let (player, drawn, _, _) =
            play(vec![part(0, false, 0, &[]), part(1, false, 1, &[3])], None);
        assert_eq!(drawn, [3]);
        assert_eq!(player.states()[0], PartState::Done);
    }

    #[test]
    fn load_errors_stop_playback() {
        let mut parts = vec![part(1, false, 0, &[1])];
        parts[0].frames.push(Frame { path: "part0/broken".to_string() });
        let mut player = Player::new(Script { width: 1, height: 1, fps: 10, parts });
        let exit = AtomicBool::new(false);
        let mut pacer =
            CountingPacer { frames: 0, exit_after: None, exit: &exit, waited: Vec::new() };
        let result = player.run(
            &mut Recorder::default(),
            &mut IdLoader { loads: HashMap::new() },
            &mut pacer,
            &exit,
        );
        let Err(PlaybackError::Load { path, error }) = result else {
            panic!("expected a load error");
        };
        assert_eq!(path, "part0/broken");
        assert_eq!(error, "broken frame");
        assert_eq!(player.states()[0], PartState::Playing { iteration: 0 });
    }
}
