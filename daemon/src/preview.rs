use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};

use argh::FromArgs;
use log::{error, info};
use splash_core::{animation::Player, surface::Canvas};
use splash_daemon::{
    animation::{self, FileFrameLoader, ThreadPacer},
    std_fs,
};

use crate::minifb_display::MinifbCanvas;

mod minifb_display;

#[derive(FromArgs)]
/// Preview a splash image or animation in a desktop window
struct Args {
    /// PNM image to show
    #[argh(option)]
    image: Option<PathBuf>,

    /// animation directory with a desc.txt, replaces --image
    #[argh(option)]
    animation: Option<PathBuf>,

    /// window width, defaults to the image or animation width
    #[argh(option)]
    width: Option<u32>,

    /// window height, defaults to the image or animation height
    #[argh(option)]
    height: Option<u32>,

    /// horizontal image position, 0 is left and 1 is right
    #[argh(option, default = "0.5")]
    x_align: f32,

    /// vertical image position, 0 is top and 1 is bottom
    #[argh(option, default = "0.5")]
    y_align: f32,
}

fn run(args: &Args) -> Result<(), String> {
    let closed = Arc::new(AtomicBool::new(false));

    if let Some(dir) = &args.animation {
        let script = animation::load(dir).map_err(|e| e.to_string())?;
        let width = args.width.unwrap_or(script.width);
        let height = args.height.unwrap_or(script.height);
        let mut canvas = MinifbCanvas::new(width, height, Arc::clone(&closed))?;
        let summary = Player::new(script)
            .run(
                &mut canvas,
                &mut FileFrameLoader,
                &mut ThreadPacer::default(),
                &closed,
            )
            .map_err(|e| e.to_string())?;
        info!("played {} frames", summary.frames);
        canvas.wait_closed();
        return Ok(());
    }

    let Some(path) = &args.image else {
        return Err(String::from("pass --image or --animation"));
    };
    let raster = std_fs::decode_file(path).map_err(|e| e.to_string())?;
    let width = args.width.unwrap_or(raster.width());
    let height = args.height.unwrap_or(raster.height());
    let mut canvas = MinifbCanvas::new(width, height, closed)?;
    let region = canvas.blit(&raster, args.x_align, args.y_align);
    info!("drawn at {region:?}");
    canvas.wait_closed();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
