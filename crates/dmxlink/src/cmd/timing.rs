use std::time::Duration;

use dmxlink_controller::{ControllerConfig, ControllerError};
use dmxlink_frame::{TimingConfig, MIN_BREAK, MIN_MARK_AFTER_BREAK, SLOT_TIME};
use serde::Serialize;

use crate::cmd::TimingArgs;
use crate::exit::{controller_error, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

#[derive(Serialize)]
struct TimingOutput {
    #[serde(flatten)]
    timing: TimingConfig,
    start_code: u8,
    slot_us: u64,
    data_us: u64,
    frame_period_us: u64,
    refresh_hz: f64,
    min_break_us: u64,
    min_mark_after_break_us: u64,
}

pub fn run(args: TimingArgs, format: OutputFormat, config: ControllerConfig) -> CliResult<i32> {
    let timing = effective_timing(config.timing, &args);
    timing.validate().map_err(|err| {
        controller_error(
            "invalid timing",
            ControllerError::Configuration(err.to_string()),
        )
    })?;

    let out = TimingOutput {
        timing,
        start_code: config.start_code,
        slot_us: micros(SLOT_TIME),
        data_us: micros(timing.data_time()),
        frame_period_us: micros(timing.frame_period()),
        refresh_hz: (timing.refresh_rate() * 100.0).round() / 100.0,
        min_break_us: micros(MIN_BREAK),
        min_mark_after_break_us: micros(MIN_MARK_AFTER_BREAK),
    };
    let fields = [
        ("break", format!("{} µs", micros(timing.break_time))),
        ("mark after break", format!("{} µs", micros(timing.mark_after_break))),
        ("inter-frame gap", format!("{} ms", timing.inter_frame_gap.as_millis())),
        ("tx done timeout", format!("{} ms", timing.tx_done_timeout.as_millis())),
        ("start code", format!("0x{:02X}", config.start_code)),
        ("slot time", format!("{} µs", out.slot_us)),
        ("data time", format!("{} µs", out.data_us)),
        ("frame period", format!("{} µs", out.frame_period_us)),
        ("refresh rate", format!("{:.2} Hz", out.refresh_hz)),
    ];
    print_fields(&out, &fields, format);
    Ok(SUCCESS)
}

fn effective_timing(mut timing: TimingConfig, args: &TimingArgs) -> TimingConfig {
    if let Some(us) = args.break_us {
        timing.break_time = Duration::from_micros(us);
    }
    if let Some(us) = args.mark_us {
        timing.mark_after_break = Duration::from_micros(us);
    }
    if let Some(ms) = args.gap_ms {
        timing.inter_frame_gap = Duration::from_millis(ms);
    }
    timing
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_fields() {
        let args = TimingArgs {
            break_us: Some(120),
            gap_ms: Some(2),
            ..TimingArgs::default()
        };
        let timing = effective_timing(TimingConfig::default(), &args);
        assert_eq!(timing.break_time, Duration::from_micros(120));
        assert_eq!(timing.mark_after_break, Duration::from_micros(20));
        assert_eq!(timing.inter_frame_gap, Duration::from_millis(2));
    }
}
