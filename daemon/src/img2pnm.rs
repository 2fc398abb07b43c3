use std::{path::PathBuf, process::ExitCode};

use argh::FromArgs;
use embedded_pnm::{Raster, Rgb};
use image::imageops::FilterType;
use log::{error, info};
use splash_daemon::std_fs::StdFileWriter;

#[derive(FromArgs)]
/// Convert an image to a binary PPM splash
struct Args {
    /// input image path
    #[argh(option, short = 'i')]
    input_path: PathBuf,

    /// output PPM file path
    #[argh(option, short = 'o')]
    output_path: PathBuf,

    /// fit the image into this width, keeping the aspect ratio
    #[argh(option)]
    max_width: Option<u32>,

    /// fit the image into this height, keeping the aspect ratio
    #[argh(option)]
    max_height: Option<u32>,
}

fn convert(args: &Args) -> Result<Raster, String> {
    let mut image = image::open(&args.input_path)
        .map_err(|e| format!("opening {}: {e}", args.input_path.display()))?;

    let max_width = args.max_width.unwrap_or(image.width());
    let max_height = args.max_height.unwrap_or(image.height());
    if image.width() > max_width || image.height() > max_height {
        image = image.resize(max_width, max_height, FilterType::Triangle);
        info!("resized to {}x{}", image.width(), image.height());
    }

    let image = image.into_rgb8();
    let pixels = image
        .pixels()
        .map(|p| Rgb::new(p[0], p[1], p[2]))
        .collect();
    Raster::new(image.width(), image.height(), pixels)
        .ok_or_else(|| String::from("image has no pixels"))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    let raster = match convert(&args) {
        Ok(raster) => raster,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let written = StdFileWriter::create(&args.output_path).and_then(|mut out| {
        embedded_pnm::encode_ppm(&raster, &mut out).map_err(|source| {
            splash_daemon::Error::Encode {
                path: args.output_path.clone(),
                source,
            }
        })
    });
    match written {
        Ok(()) => {
            info!(
                "wrote {}x{} splash to {}",
                raster.width(),
                raster.height(),
                args.output_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
