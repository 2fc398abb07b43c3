use std::process::ExitCode;

use argh::FromArgs;
use log::{error, warn};
use splash_core::protocol::{self, MAX_MESSAGE_LEN};
use splash_daemon::control::{self, DEFAULT_SOCKET};

#[derive(FromArgs)]
/// Report boot progress to a running splashd.
struct Args {
    /// progress from 0 to 100, 100 ends the splash
    #[argh(positional)]
    percentage: String,

    /// status text
    #[argh(positional)]
    message: Option<String>,

    /// abstract control socket name
    #[argh(option, default = "String::from(DEFAULT_SOCKET)")]
    socket: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    let Some(percentage) = control::parse_percentage(&args.percentage) else {
        error!("invalid percentage {:?}, expected 0 to 100", args.percentage);
        return ExitCode::FAILURE;
    };
    let message = args.message.as_deref().unwrap_or_default();
    let encoded = match protocol::encode(percentage, message.as_bytes()) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if encoded.truncated {
        warn!("message longer than {MAX_MESSAGE_LEN} bytes, truncating");
    }

    match control::send(&args.socket, &encoded.frame) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
