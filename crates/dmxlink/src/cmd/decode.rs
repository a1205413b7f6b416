use std::io::Read;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use dmxlink_controller::{ControllerConfig, LinkController, Mode};
use dmxlink_frame::FRAME_SIZE;
use dmxlink_transport::{LinkEvent, SimLink, SimPins};

use crate::cmd::DecodeArgs;
use crate::exit::{controller_error, io_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::{print_decode, DecodeReport, OutputFormat, Selection};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest payload one `data` line may expand to: room for a long frame.
const MAX_DATA_BYTES: usize = FRAME_SIZE * 2;

pub fn run(args: DecodeArgs, format: OutputFormat, config: ControllerConfig) -> CliResult<i32> {
    let script = read_script(&args.script)?;
    let events = parse_script(&script)?;
    let event_count = events.len();

    let link = SimLink::new();
    let mut controller = LinkController::with_config(link.clone(), SimPins::new(), config);
    controller
        .start(Mode::Receive)
        .map_err(|err| controller_error("start failed", err))?;

    link.inject_all(events);
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while link.pending_events() > 0 {
        if Instant::now() >= deadline {
            return Err(CliError::new(INTERNAL, "receiver did not drain the capture"));
        }
        thread::sleep(Duration::from_millis(1));
    }
    // Joining the worker guarantees the last event taken was fully applied.
    controller
        .stop()
        .map_err(|err| controller_error("stop failed", err))?;
    let final_state = controller.receive_state();

    let selection = match (args.channel, args.start, args.count) {
        (Some(address), _, _) => Selection::Channel {
            address,
            value: controller
                .get_channel(address)
                .map_err(|err| controller_error("read channel", err))?,
        },
        (None, Some(start), Some(count)) => Selection::Range {
            start,
            values: controller
                .get_range(start, count)
                .map_err(|err| controller_error("read range", err))?,
        },
        _ => Selection::Universe {
            slots: controller.get_universe(),
        },
    };

    let stats = controller.stats();
    let report = DecodeReport {
        events: event_count,
        frames_received: stats.frames_received,
        short_frames: stats.short_frames,
        alternate_frames: stats.alternate_frames,
        link_faults: stats.link_faults,
        final_state: final_state.as_str(),
        selection,
    };
    print_decode(&report, format);
    Ok(SUCCESS)
}

fn read_script(path: &Path) -> CliResult<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|err| io_error("failed reading stdin", err))?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

/// Parse a capture script into link events.
///
/// One event per line: `break`, `data <hex>`, `frame-error`, `parity-error`,
/// `overflow` or `buffer-full`. Hex may be split into tokens freely; a token
/// `HH*N` repeats byte `HH` N times. `#` starts a comment.
pub fn parse_script(text: &str) -> CliResult<Vec<LinkEvent>> {
    let mut events = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let invalid =
            |msg: String| CliError::new(DATA_INVALID, format!("line {}: {msg}", index + 1));

        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(keyword, rest)| (keyword, rest.trim()));
        let event = match keyword.to_ascii_lowercase().as_str() {
            "break" => LinkEvent::Break,
            "frame-error" => LinkEvent::FrameError,
            "parity-error" => LinkEvent::ParityError,
            "overflow" => LinkEvent::Overflow,
            "buffer-full" => LinkEvent::BufferFull,
            "data" => LinkEvent::data(parse_hex(rest).map_err(invalid)?),
            other => return Err(invalid(format!("unknown event {other:?}"))),
        };
        if !matches!(event, LinkEvent::Data(_)) && !rest.is_empty() {
            return Err(invalid(format!("{keyword} takes no arguments")));
        }
        events.push(event);
    }
    Ok(events)
}

fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    for token in input.split_whitespace() {
        if let Some((byte, count)) = token.split_once('*') {
            let byte = hex_pairs(byte)?;
            let [byte] = byte.as_slice() else {
                return Err(format!("repeat needs a single byte, got {token:?}"));
            };
            let count: usize = count
                .parse()
                .map_err(|_| format!("invalid repeat count in {token:?}"))?;
            let len = bytes
                .len()
                .checked_add(count)
                .filter(|len| *len <= MAX_DATA_BYTES)
                .ok_or_else(|| too_long(token))?;
            bytes.resize(len, *byte);
        } else {
            bytes.extend(hex_pairs(token)?);
            if bytes.len() > MAX_DATA_BYTES {
                return Err(too_long(token));
            }
        }
    }
    Ok(bytes)
}

fn too_long(token: &str) -> String {
    format!("data longer than {MAX_DATA_BYTES} bytes at {token:?}")
}

fn hex_pairs(token: &str) -> Result<Vec<u8>, String> {
    if token.len() % 2 != 0 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("invalid hex {token:?}"));
    }
    (0..token.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&token[i..i + 2], 16).map_err(|err| err.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_events_and_comments() {
        let script = "# capture\nbreak\ndata 00 ff10  # start code then two slots\n\nframe-error\nOVERFLOW\nbuffer-full\nparity-error\n";
        let events = parse_script(script).unwrap();
        assert_eq!(
            events,
            vec![
                LinkEvent::Break,
                LinkEvent::data(vec![0x00u8, 0xFF, 0x10]),
                LinkEvent::FrameError,
                LinkEvent::Overflow,
                LinkEvent::BufferFull,
                LinkEvent::ParityError,
            ]
        );
    }

    #[test]
    fn repeat_token_expands() {
        let events = parse_script("data 00 ff*3 01").unwrap();
        assert_eq!(events, vec![LinkEvent::data(vec![0u8, 255, 255, 255, 1])]);
    }

    #[test]
    fn errors_name_the_line() {
        let err = parse_script("break\ndata 0g").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("line 2:"), "{}", err.message);

        assert!(parse_script("jump").is_err());
        assert!(parse_script("break now").is_err());
        assert!(parse_script("data 0").is_err());
        assert!(parse_script("data 0102*2").is_err());
    }

    #[test]
    fn oversized_repeat_is_rejected() {
        let err = parse_script("data 00 00*18446744073709551615").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("line 1:"), "{}", err.message);

        assert!(parse_script("data 00 ff*4000000000").is_err());
        assert!(parse_script("data 00*1026 00").is_err());

        let events = parse_script("data 00 ff*600").unwrap();
        assert!(matches!(&events[0], LinkEvent::Data(bytes) if bytes.len() == 601));
    }

    #[test]
    fn empty_data_is_allowed() {
        assert_eq!(parse_script("data").unwrap(), vec![LinkEvent::data(Vec::<u8>::new())]);
    }
}
