use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dmxlink_controller::{ControllerConfig, LinkController, Mode};
use dmxlink_transport::{SimLink, SimPins};
use tracing::info;

use crate::cmd::{parse_assignments, SendArgs};
use crate::exit::{controller_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_frames, OutputFormat};

const PROGRESS_POLL: Duration = Duration::from_millis(2);

pub fn run(args: SendArgs, format: OutputFormat, mut config: ControllerConfig) -> CliResult<i32> {
    if args.frames == Some(0) {
        return Err(CliError::new(USAGE, "--frames must be greater than zero"));
    }
    if let Some(start_code) = args.start_code {
        config.start_code = start_code;
    }
    let assignments = parse_assignments(&args.set)?;

    let link = SimLink::new();
    let mut controller = LinkController::with_config(link.clone(), SimPins::new(), config);
    for (address, value) in assignments {
        controller
            .set_channel(address, value)
            .map_err(|err| controller_error(&format!("set channel {address}"), err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    if args.frames.is_none() {
        install_ctrlc_handler(running.clone())?;
    }

    controller
        .start(Mode::Transmit)
        .map_err(|err| controller_error("start failed", err))?;
    while running.load(Ordering::SeqCst)
        && args
            .frames
            .is_none_or(|limit| controller.stats().frames_sent < limit)
    {
        thread::sleep(PROGRESS_POLL);
    }
    controller
        .stop()
        .map_err(|err| controller_error("stop failed", err))?;

    let stats = controller.stats();
    info!(frames = stats.frames_sent, timeouts = stats.tx_timeouts, "transmit finished");

    let mut frames = link.captured_frames();
    if let Some(limit) = args.frames {
        frames.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    print_frames(&frames, format);
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
