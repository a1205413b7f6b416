#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

fn dmxlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dmxlink"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("dmxlink should run")
}

fn temp_file(tag: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "dmxlink-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("temp file should be writable");
    path
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn version_prints_package_version() {
    let output = dmxlink(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("dmxlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_reports_each_frame_with_protocol_timing() {
    let output = dmxlink(&["--format", "json", "send", "--set", "6=255", "--frames", "3"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let frames = json_lines(&output);
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame["start_code"], 0);
        assert_eq!(frame["slot_count"], 512);
        assert_eq!(frame["active_slots"]["6"], 255);
        assert!(frame["break_us"].as_u64().unwrap() >= 88);
        assert!(frame["mark_after_break_us"].as_u64().unwrap() >= 12);
        if i > 0 {
            assert!(frame["gap_before_us"].as_u64().unwrap() >= 10_000);
        }
    }
}

#[test]
fn send_start_code_override() {
    let output = dmxlink(&["--format", "json", "send", "--start-code", "0x17", "--frames", "1"]);
    assert!(output.status.success());
    let frames = json_lines(&output);
    assert_eq!(frames[0]["start_code"], 0x17);
    assert_eq!(frames[0]["start_code_name"], "TEXT");
}

#[test]
fn send_out_of_range_address_is_usage_error() {
    let output = dmxlink(&["send", "--set", "513=1", "--frames", "1"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("set channel 513"));
}

#[test]
fn decode_script_rebuilds_universe() {
    let script = temp_file(
        "decode",
        "# one full frame, then a short one\n\
         break\n\
         data 00 10 20 30 00*509\n\
         break\n\
         data 00 aa bb\n\
         break\n",
    );
    let output = dmxlink(&[
        "--format",
        "json",
        "decode",
        script.to_str().unwrap(),
        "--start",
        "1",
        "--count",
        "4",
    ]);
    let _ = std::fs::remove_file(&script);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = &json_lines(&output)[0];
    assert_eq!(report["events"], 5);
    assert_eq!(report["frames_received"], 2);
    assert_eq!(report["short_frames"], 1);
    assert_eq!(report["final_state"], "break-detected");
    assert_eq!(report["selection"]["kind"], "range");
    assert_eq!(report["selection"]["values"], serde_json::json!([0xaa, 0xbb, 0x30, 0]));
}

#[test]
fn decode_fault_keeps_written_slots() {
    let script = temp_file("fault", "break\ndata 00 05 06\nframe-error\ndata 07 07\n");
    let output = dmxlink(&["--format", "json", "decode", script.to_str().unwrap(), "--channel", "2"]);
    let _ = std::fs::remove_file(&script);
    assert!(output.status.success());

    let report = &json_lines(&output)[0];
    assert_eq!(report["link_faults"], 1);
    assert_eq!(report["final_state"], "link-error");
    assert_eq!(report["selection"]["value"], 6);
}

#[test]
fn decode_invalid_script_is_data_invalid() {
    let script = temp_file("bad", "break\ndata zz\n");
    let output = dmxlink(&["decode", script.to_str().unwrap()]);
    let _ = std::fs::remove_file(&script);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2"));
}

#[test]
fn timing_reflects_config_file() {
    let config = temp_file("timing", r#"{ "timing": { "break_us": 176, "inter_frame_gap_ms": 20 } }"#);
    let output = dmxlink(&["--format", "json", "--config", config.to_str().unwrap(), "timing"]);
    let _ = std::fs::remove_file(&config);
    assert!(output.status.success());

    let report = &json_lines(&output)[0];
    assert_eq!(report["break_us"], 176);
    assert_eq!(report["mark_after_break_us"], 20);
    assert_eq!(report["inter_frame_gap_ms"], 20);
    assert_eq!(report["data_us"], 22_572);
}

#[test]
fn timing_below_protocol_minimum_is_usage_error() {
    let output = dmxlink(&["timing", "--break-us", "40"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn malformed_config_is_data_invalid() {
    let config = temp_file("badcfg", "{ not json");
    let output = dmxlink(&["--config", config.to_str().unwrap(), "timing"]);
    let _ = std::fs::remove_file(&config);
    assert_eq!(output.status.code(), Some(60));
}
