use alloc::{string::String, vec::Vec};
use core::time::Duration;
use log::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    MissingHeader,
    InvalidHeader,
    ZeroFps,
}

impl core::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ScriptError::MissingHeader => f.write_str("animation script has no header line"),
            ScriptError::InvalidHeader => f.write_str("expected `width height fps` header"),
            ScriptError::ZeroFps => f.write_str("animation fps must not be zero"),
        }
    }
}

impl core::error::Error for ScriptError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Number of iterations, 0 loops until an exit is requested.
    pub count: u32,
    /// Parsed but not used for timing.
    pub pause: u32,
    /// Finish the running iteration even after an exit request.
    pub play_until_complete: bool,
    /// Frame directory, relative to the animation root.
    pub path: String,
    pub frames: Vec<Frame>,
}

impl Part {
    pub fn is_infinite(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub parts: Vec<Part>,
}

fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

fn parse_header(line: &str) -> Result<(u32, u32, u32), ScriptError> {
    let mut fields = line.split_whitespace().map(|f| f.parse::<u32>());
    match (fields.next(), fields.next(), fields.next()) {
        (Some(Ok(width)), Some(Ok(height)), Some(Ok(fps))) => Ok((width, height, fps)),
        _ => Err(ScriptError::InvalidHeader),
    }
}

/// `type count pause path`, where the type `c` plays each iteration to completion.
fn parse_part(line: &str) -> Option<Part> {
    let mut fields = line.split_whitespace();
    let kind = fields.next()?;
    let count = fields.next()?.parse().ok()?;
    let pause = fields.next()?.parse().ok()?;
    let path = fields.next()?;
    Some(Part {
        count,
        pause,
        play_until_complete: kind == "c",
        path: String::from(path),
        frames: Vec::new(),
    })
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut lines = text.lines().map(str::trim).filter(|line| !is_comment(line));

        let header = lines.next().ok_or(ScriptError::MissingHeader)?;
        let (width, height, fps) = parse_header(header)?;
        if fps == 0 {
            return Err(ScriptError::ZeroFps);
        }

        let mut parts = Vec::new();
        for line in lines {
            match parse_part(line) {
                Some(part) => {
                    debug!(
                        "part {}: count={} pause={} complete={}",
                        part.path, part.count, part.pause, part.play_until_complete
                    );
                    parts.push(part);
                }
                None => warn!("skipping malformed animation line: {line:?}"),
            }
        }

        Ok(Script {
            width,
            height,
            fps,
            parts,
        })
    }

    /// Time budget of one frame.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: &str = "\
        # boot animation\n\
        800 480 30\n\
        p 1 0 part0\n\
        \n\
        p 0 0 part1\n\
        c 3 10 part2\n";

    #[test]
    fn parses_header_and_parts() {
        let script = Script::parse(DESC).unwrap();
        assert_eq!((script.width, script.height, script.fps), (800, 480, 30));
        assert_eq!(script.parts.len(), 3);

        let part = &script.parts[0];
        assert_eq!((part.count, part.pause, part.path.as_str()), (1, 0, "part0"));
        assert!(!part.play_until_complete);

        assert!(script.parts[1].is_infinite());

        let part = &script.parts[2];
        assert_eq!((part.count, part.pause), (3, 10));
        assert!(part.play_until_complete);
    }

    #[test]
    fn frame_interval_from_fps() {
        let script = Script::parse("1 1 25\n").unwrap();
        assert_eq!(script.frame_interval(), Duration::from_micros(40_000));
        assert!(script.parts.is_empty());
    }

    #[test]
    fn malformed_parts_are_skipped() {
        let script = Script::parse("10 10 5\np x 0 a\np 1\nc 2 0 b extra\n").unwrap();
        assert_eq!(script.parts.len(), 1);
        assert_eq!(script.parts[0].path, "b");
    }

    #[test]
    fn only_a_lone_c_plays_to_completion() {
        let script = Script::parse("10 10 5
c 1 0 a
cx 1 0 b
complete 1 0 c
p 1 0 d
").unwrap();
        let complete: Vec<bool> = script.parts.iter().map(|p| p.play_until_complete).collect();
        assert_eq!(complete, [true, false, false, false]);
    }

    #[test]
    fn header_errors() {
        assert_eq!(Script::parse(""), Err(ScriptError::MissingHeader));
        assert_eq!(Script::parse("# only a comment\n"), Err(ScriptError::MissingHeader));
        assert_eq!(Script::parse("800 480\n"), Err(ScriptError::InvalidHeader));
        assert_eq!(Script::parse("800 480 0\n"), Err(ScriptError::ZeroFps));
    }
}
