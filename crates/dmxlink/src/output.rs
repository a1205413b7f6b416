use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dmxlink_frame::{start_code_name, Universe};
use dmxlink_transport::CapturedFrame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    index: usize,
    start_code: u8,
    start_code_name: &'a str,
    slot_count: usize,
    break_us: u64,
    mark_after_break_us: u64,
    gap_before_us: Option<u64>,
    completed: bool,
    active_slots: BTreeMap<u16, u8>,
}

/// Print frames captured from the simulated line, one record per frame.
pub fn print_frames(frames: &[CapturedFrame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for (index, frame) in frames.iter().enumerate() {
                let out = FrameOutput {
                    index,
                    start_code: frame.start_code,
                    start_code_name: start_code_name(frame.start_code),
                    slot_count: frame.slots.len(),
                    break_us: micros(frame.break_time),
                    mark_after_break_us: micros(frame.mark_after_break),
                    gap_before_us: frame.gap_before.map(micros),
                    completed: frame.completed,
                    active_slots: active_slots(&frame.slots),
                };
                print_json(&out);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "#", "START CODE", "BREAK µs", "MAB µs", "GAP µs", "SLOTS", "ACTIVE",
                ]);
            for (index, frame) in frames.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    format!("0x{:02X} {}", frame.start_code, start_code_name(frame.start_code)),
                    micros(frame.break_time).to_string(),
                    micros(frame.mark_after_break).to_string(),
                    frame
                        .gap_before
                        .map(|gap| micros(gap).to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    frame.slots.len().to_string(),
                    slot_list(&active_slots(&frame.slots)),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, frame) in frames.iter().enumerate() {
                println!(
                    "frame={} start_code=0x{:02X} break={}us mab={}us gap={} slots={} active=[{}]",
                    index,
                    frame.start_code,
                    micros(frame.break_time),
                    micros(frame.mark_after_break),
                    frame
                        .gap_before
                        .map(|gap| format!("{}us", micros(gap)))
                        .unwrap_or_else(|| "-".to_string()),
                    frame.slots.len(),
                    slot_list(&active_slots(&frame.slots)),
                );
            }
        }
        OutputFormat::Raw => {
            for frame in frames {
                print_raw(&[frame.start_code]);
                print_raw(&frame.slots);
            }
        }
    }
}

/// Slots selected from a decoded universe.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Selection {
    Universe {
        #[serde(serialize_with = "serialize_universe")]
        slots: Universe,
    },
    Channel {
        address: u16,
        value: u8,
    },
    Range {
        start: u16,
        values: Vec<u8>,
    },
}

impl Selection {
    fn rows(&self) -> Vec<(u16, u8)> {
        match self {
            Self::Universe { slots } => slots.active().collect(),
            Self::Channel { address, value } => vec![(*address, *value)],
            Self::Range { start, values } => values
                .iter()
                .enumerate()
                .map(|(i, value)| (start + i as u16, *value))
                .collect(),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Self::Universe { slots } => slots.as_slice().to_vec(),
            Self::Channel { value, .. } => vec![*value],
            Self::Range { values, .. } => values.clone(),
        }
    }
}

fn serialize_universe<S: serde::Serializer>(
    universe: &Universe,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(universe.as_slice())
}

#[derive(Serialize)]
pub struct DecodeReport {
    pub events: usize,
    pub frames_received: u64,
    pub short_frames: u64,
    pub alternate_frames: u64,
    pub link_faults: u64,
    pub final_state: &'static str,
    pub selection: Selection,
}

pub fn print_decode(report: &DecodeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut summary = Table::new();
            summary
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENTS", "FRAMES", "SHORT", "ALTERNATE", "FAULTS", "STATE"])
                .add_row(vec![
                    report.events.to_string(),
                    report.frames_received.to_string(),
                    report.short_frames.to_string(),
                    report.alternate_frames.to_string(),
                    report.link_faults.to_string(),
                    report.final_state.to_string(),
                ]);
            println!("{summary}");

            let mut slots = Table::new();
            slots
                .load_preset(UTF8_FULL)
                .set_header(vec!["ADDRESS", "VALUE"]);
            for (address, value) in report.selection.rows() {
                slots.add_row(vec![address.to_string(), value.to_string()]);
            }
            println!("{slots}");
        }
        OutputFormat::Pretty => {
            println!(
                "events={} frames={} short={} alternate={} faults={} state={}",
                report.events,
                report.frames_received,
                report.short_frames,
                report.alternate_frames,
                report.link_faults,
                report.final_state
            );
            for (address, value) in report.selection.rows() {
                println!("{address}={value}");
            }
        }
        OutputFormat::Raw => print_raw(&report.selection.bytes()),
    }
}

/// Print a flat list of labelled values.
pub fn print_fields<T: Serialize>(value: &T, fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in fields {
                table.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (name, value) in fields {
                println!("{name}: {value}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn micros(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn active_slots(slots: &[u8]) -> BTreeMap<u16, u8> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, value)| **value != 0)
        .map(|(offset, value)| ((offset + 1) as u16, *value))
        .collect()
}

fn slot_list(active: &BTreeMap<u16, u8>) -> String {
    active
        .iter()
        .map(|(address, value)| format!("{address}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
