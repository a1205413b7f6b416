use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use dmxlink_controller::{ControllerConfig, Pinout};
use tracing::debug;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod send;
pub mod timing;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transmit frames on a simulated link and print what went on the wire.
    Send(SendArgs),
    /// Feed a capture script through the receive decoder.
    Decode(DecodeArgs),
    /// Show the effective frame timing.
    Timing(TimingArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format, load_config(config)?),
        Command::Decode(args) => decode::run(args, format, load_config(config)?),
        Command::Timing(args) => timing::run(args, format, load_config(config)?),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel values as ADDRESS=VALUE pairs (comma-separated).
    #[arg(long, value_name = "ADDR=VALUE", value_delimiter = ',')]
    pub set: Vec<String>,
    /// Start code (decimal or 0x-prefixed hex). Overrides the config file.
    #[arg(long, value_name = "BYTE", value_parser = parse_byte)]
    pub start_code: Option<u8>,
    /// Stop after N frames. Without it, transmit until interrupted.
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture script, one event per line ("-" reads stdin).
    pub script: PathBuf,
    /// Print a single channel.
    #[arg(long, value_name = "ADDR", conflicts_with_all = ["start", "count"])]
    pub channel: Option<u16>,
    /// First address of a range to print.
    #[arg(long, value_name = "ADDR", requires = "count")]
    pub start: Option<u16>,
    /// Number of channels in the range.
    #[arg(long, value_name = "N", requires = "start")]
    pub count: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct TimingArgs {
    /// Override the break length in microseconds.
    #[arg(long, value_name = "US")]
    pub break_us: Option<u64>,
    /// Override the mark-after-break length in microseconds.
    #[arg(long, value_name = "US")]
    pub mark_us: Option<u64>,
    /// Override the inter-frame gap in milliseconds.
    #[arg(long, value_name = "MS")]
    pub gap_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Load the controller configuration, filling unset pins from the reference
/// wiring since every command runs on a simulated board.
pub fn load_config(path: Option<&Path>) -> CliResult<ControllerConfig> {
    let Some(path) = path else {
        return Ok(ControllerConfig::reference());
    };
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    let mut config: ControllerConfig = serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })?;

    let reference = Pinout::REFERENCE;
    let pinout = &mut config.pinout;
    pinout.tx = pinout.tx.or(reference.tx);
    pinout.rx = pinout.rx.or(reference.rx);
    pinout.direction = pinout.direction.or(reference.direction);
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Parse a byte written as decimal or `0x`-prefixed hex.
pub fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid byte value: {input}"))
}

/// Parse `ADDR=VALUE` pairs. Address bounds are left to the controller so
/// they are reported the same way as library calls.
pub fn parse_assignments(pairs: &[String]) -> CliResult<Vec<(u16, u8)>> {
    pairs
        .iter()
        .map(|pair| {
            let (address, value) = pair.split_once('=').ok_or_else(|| {
                CliError::new(USAGE, format!("expected ADDR=VALUE, got {pair:?}"))
            })?;
            let address = address
                .trim()
                .parse::<u16>()
                .map_err(|_| CliError::new(USAGE, format!("invalid address in {pair:?}")))?;
            let value = parse_byte(value).map_err(|msg| CliError::new(USAGE, msg))?;
            Ok((address, value))
        })
        .collect()
}
