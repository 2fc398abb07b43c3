use std::{
    fs,
    path::Path,
    sync::atomic::AtomicBool,
    time::Duration,
};

use splash_core::{
    animation::{Pacer, Player},
    surface::{PixelLayout, Surface},
};
use splash_daemon::{
    Error,
    animation::{self, AnimationThread, FileFrameLoader},
};

struct NoWait;

impl Pacer for NoWait {
    fn frame_start(&mut self) {}
    fn wait(&mut self, _: Duration) {}
}

fn solid_ppm(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    let mut text = format!("P3\n{width} {height}\n255\n");
    for _ in 0..width * height {
        text += &format!("{} {} {}\n", rgb[0], rgb[1], rgb[2]);
    }
    fs::write(path, text).unwrap();
}

fn animation_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("desc.txt"),
        "4 2 100\np 2 0 part0\nc 1 0 part1\n",
    )
    .unwrap();
    fs::create_dir(dir.path().join("part0")).unwrap();
    fs::create_dir(dir.path().join("part1")).unwrap();
    solid_ppm(&dir.path().join("part0/b.ppm"), 4, 2, [0, 255, 0]);
    solid_ppm(&dir.path().join("part0/a.ppm"), 4, 2, [255, 0, 0]);
    fs::write(dir.path().join("part0/notes.txt"), "not a frame").unwrap();
    fs::write(dir.path().join("part1/last.pgm"), "P2 2 2 255 255 255 255 255").unwrap();
    dir
}

fn memory_surface(width: u32, height: u32) -> Surface<Vec<u8>> {
    let stride = width as usize * 4;
    Surface::new(vec![0; stride * height as usize], width, height, stride, PixelLayout::XRGB8888)
        .unwrap()
}

#[test]
fn frames_are_listed_in_name_order() {
    let dir = animation_dir();
    let script = animation::load(dir.path()).unwrap();
    assert_eq!((script.width, script.height, script.fps), (4, 2, 100));

    let names: Vec<_> = script.parts[0]
        .frames
        .iter()
        .map(|frame| Path::new(&frame.path).file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.ppm", "b.ppm"]);
    assert_eq!(script.parts[1].frames.len(), 1);
}

#[test]
fn plays_frames_from_disk() {
    let dir = animation_dir();
    let script = animation::load(dir.path()).unwrap();
    let mut surface = memory_surface(8, 4);
    let exit = AtomicBool::new(false);

    let summary = Player::new(script)
        .run(&mut surface, &mut FileFrameLoader, &mut NoWait, &exit)
        .unwrap();
    assert_eq!(summary.frames, 5);
    assert_eq!(summary.decoded, 3);
    // the 2x2 white frame lands centered on top of the last green one
    assert_eq!(surface.pixel(3, 1), Some(0x00ff_ffff));
    assert_eq!(surface.pixel(2, 1), Some(0x0000_ff00));
    assert_eq!(surface.pixel(0, 0), Some(0));
}

#[test]
fn missing_part_directory_has_no_frames() {
    let dir = animation_dir();
    fs::write(dir.path().join("desc.txt"), "4 2 10\np 1 0 nowhere\n").unwrap();
    let script = animation::load(dir.path()).unwrap();
    assert!(script.parts[0].frames.is_empty());
}

#[test]
fn script_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(animation::load(dir.path()), Err(Error::Io { .. })));

    fs::write(dir.path().join("desc.txt"), "wide tall fast\n").unwrap();
    assert!(matches!(animation::load(dir.path()), Err(Error::Script { .. })));
}

#[test]
fn thread_hands_back_the_canvas() {
    let dir = animation_dir();
    fs::write(dir.path().join("desc.txt"), "4 2 100\np 0 0 part0\n").unwrap();
    let script = animation::load(dir.path()).unwrap();

    let animation = AnimationThread::spawn(script, memory_surface(4, 2)).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(!animation.is_finished());
    let surface = animation.stop().unwrap();
    let pixel = surface.pixel(0, 0).unwrap();
    assert!(pixel == 0x00ff_0000 || pixel == 0x0000_ff00);
}

#[test]
fn broken_frame_ends_the_thread() {
    let dir = animation_dir();
    fs::write(dir.path().join("part0/c.ppm"), "P3 4 2 255 1 2").unwrap();
    let script = animation::load(dir.path()).unwrap();

    let animation = AnimationThread::spawn(script, memory_surface(4, 2)).unwrap();
    assert!(animation.stop().is_some());
}
