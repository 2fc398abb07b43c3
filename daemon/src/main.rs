use std::{path::PathBuf, process::ExitCode, time::Duration};

use argh::FromArgs;
use embedded_graphics::{pixelcolor::Rgb888, prelude::*};
use log::{error, info, warn};
use splash_daemon::{
    Result,
    animation::{self, AnimationThread},
    control::DEFAULT_SOCKET,
    fbdev::Framebuffer,
    reactor::{Context, Outcome, Reactor},
    std_fs,
    timer::TimerRole,
};

const DEFAULT_DEVICE: &str = "/dev/fb0";
const DEFAULT_IMAGE: &str = "/usr/share/splashd/logo.ppm";
/// Exit status when boot did not report completion in time.
const TIMEOUT_EXIT: u8 = 2;

#[derive(FromArgs)]
/// Show a boot splash until boot reports completion.
struct Args {
    /// framebuffer device
    #[argh(option, default = "PathBuf::from(DEFAULT_DEVICE)")]
    device: PathBuf,

    /// PNM image to show
    #[argh(option, default = "PathBuf::from(DEFAULT_IMAGE)")]
    image: PathBuf,

    /// animation directory with a desc.txt, replaces --image
    #[argh(option)]
    animation: Option<PathBuf>,

    /// seconds to wait for boot to complete
    #[argh(option, default = "30")]
    timeout: u64,

    /// abstract control socket name
    #[argh(option, default = "String::from(DEFAULT_SOCKET)")]
    socket: String,

    /// horizontal image position, 0 is left and 1 is right
    #[argh(option, default = "0.5")]
    x_align: f32,

    /// vertical image position, 0 is top and 1 is bottom
    #[argh(option, default = "0.5")]
    y_align: f32,
}

enum Splash {
    Still(Framebuffer),
    Animated(AnimationThread<Framebuffer>),
}

impl Splash {
    fn start(args: &Args) -> Result<Self> {
        let mut framebuffer = Framebuffer::open(&args.device)?;
        let Ok(()) = framebuffer.surface_mut().clear(Rgb888::BLACK);

        match &args.animation {
            Some(dir) => {
                let script = animation::load(dir)?;
                Ok(Splash::Animated(AnimationThread::spawn(script, framebuffer)?))
            }
            None => {
                let raster = std_fs::decode_file(&args.image)?;
                let region = framebuffer
                    .surface_mut()
                    .blit(&raster, args.x_align, args.y_align);
                info!("splash drawn at {region:?}");
                Ok(Splash::Still(framebuffer))
            }
        }
    }

    fn finish(self) {
        let framebuffer = match self {
            Splash::Still(framebuffer) => Some(framebuffer),
            Splash::Animated(animation) => animation.stop(),
        };
        if let Some(framebuffer) = framebuffer {
            framebuffer.close();
        }
    }
}

fn wait_for_boot(args: &Args) -> Result<Outcome> {
    let mut reactor = Reactor::new()?;
    if let Err(e) = reactor.add_timer(TimerRole::Quit, Duration::from_secs(args.timeout), false) {
        error!("boot timeout disabled: {e}");
    }
    if let Err(e) = reactor.listen(&args.socket) {
        error!("control socket unavailable: {e}");
    }

    let mut context = Context::default();
    let outcome = reactor.run(&mut context)?;
    info!(
        "last progress {}% after {} updates",
        context.status.percentage(),
        context.updates
    );
    reactor.shutdown();
    Ok(outcome)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    info!("paints on");
    let splash = match Splash::start(&args) {
        Ok(splash) => splash,
        Err(e) => {
            error!("{e}");
            info!("paints off");
            return ExitCode::FAILURE;
        }
    };

    let outcome = wait_for_boot(&args);
    splash.finish();
    info!("paints off");

    match outcome {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Failure) => {
            warn!("boot did not complete, leaving the console to the caller");
            ExitCode::from(TIMEOUT_EXIT)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
