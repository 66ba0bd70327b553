use clap::Parser;
use clap::error::ErrorKind;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl hughes::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(args: hughes::Args) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let log_level = args.log_level();
    let output_format = args.output_format();
    let (command, maybe_fake_args) = args.into_command_and_fake_args();
    hughes::run_with_clients_and_log_level(
        command,
        &mut output,
        &FakeTerminalClient,
        maybe_fake_args,
        log_level,
        output_format,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = hughes::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args).await
}

fn json_lines(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is JSON"))
        .collect()
}

fn gen1_frame() -> Vec<u8> {
    let mut frame = vec![0_u8; hughes::GEN1_FRAME_LEN];
    frame[..3].copy_from_slice(&hughes::GEN1_FRAME_HEADER);
    frame[3..7].copy_from_slice(&1_205_000_i32.to_be_bytes());
    frame[31..35].copy_from_slice(&5_998_i32.to_be_bytes());
    frame
}

fn gen1_notifications() -> String {
    let frame = gen1_frame();
    format!("{},{}", hex::encode(&frame[..20]), hex::encode(&frame[20..]))
}

fn gen2_report_packet() -> String {
    let mut body = [0_u8; hughes::DL_REPORT_SINGLE_LEN];
    body[0..4].copy_from_slice(&1_200_000_i32.to_be_bytes());
    body[33] = 0x02;
    let mut packet = hughes::GEN2_MAGIC.to_vec();
    packet.extend_from_slice(&[hughes::GEN2_PROTOCOL_VERSION, 0x09, 0x01, 0x00, 0x22]);
    packet.extend_from_slice(&body);
    packet.extend_from_slice(&hughes::GEN2_TAIL);
    hex::encode(packet)
}

#[tokio::test]
async fn detect_command_prints_classification_json() -> anyhow::Result<()> {
    let stdout = run_with_argv(["hughes", "detect", "WD_E8_0001"]).await?;

    let lines = json_lines(&stdout);
    assert_eq!(1, lines.len());
    assert_eq!(json!("gen2"), lines[0]["generation"]);
    assert_eq!(json!("E8"), lines[0]["model_code"]);
    assert_eq!(json!(true), lines[0]["enhanced"]);
    assert_eq!(json!(true), lines[0]["watchdog_name"]);

    Ok(())
}

#[tokio::test]
async fn decode_command_prints_gen1_reading() -> anyhow::Result<()> {
    let capture = hex::encode(gen1_frame());
    let stdout = run_with_argv(["hughes", "decode", "--generation", "gen1", &capture]).await?;

    assert_eq!(
        vec![json!({
            "update": 1,
            "line": "L1",
            "voltage": 120.5,
            "current": 0.0,
            "power": 0.0,
            "energy": 0.0,
            "frequency": 59.98,
            "error_code": 0,
            "error_text": "OK",
            "relay_on": null,
            "neutral_detection_enabled": null,
            "backlight_level": null,
            "output_voltage": null,
            "boost_active": null,
            "temperature_f": null,
        })],
        json_lines(&stdout)
    );

    Ok(())
}

#[tokio::test]
async fn decode_command_rejects_bad_gen1_header() {
    let mut frame = gen1_frame();
    frame[0] = 0xFF;
    let capture = hex::encode(frame);

    let error = run_with_argv(["hughes", "decode", "--generation", "gen1", &capture])
        .await
        .expect_err("a bad header should fail");

    assert!(
        format!("{error:#}").contains("failed to decode gen1 capture"),
        "unexpected error: {error:#}"
    );
}

#[tokio::test(start_paused = true)]
async fn listen_command_streams_snapshots_until_limit() -> anyhow::Result<()> {
    let notifications = gen1_notifications();
    let stdout = run_with_argv([
        "hughes",
        "--fake",
        "--fake-notifications",
        &notifications,
        "listen",
        "--name",
        "PMD30",
        "--max-updates",
        "1",
    ])
    .await?;

    let lines = json_lines(&stdout);
    let last = lines.last().expect("at least one snapshot");
    assert_eq!(json!(1), last["update_count"]);
    assert_eq!(json!(true), last["connected"]);
    assert_eq!(json!(120.5), last["state"]["line1"]["voltage"]);
    assert_eq!(json!("gen1"), last["state"]["generation"]);
    assert!(last["last_seen_age_ms"].is_u64(), "{last}");
    assert_eq!(json!(true), last["data_healthy"]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn listen_command_renders_pretty_tables() -> anyhow::Result<()> {
    let notifications = gen1_notifications();
    let stdout = run_with_argv([
        "hughes",
        "--output-format",
        "pretty",
        "--fake",
        "--fake-notifications",
        &notifications,
        "listen",
        "--name",
        "PMD30",
        "--max-updates",
        "1",
    ])
    .await?;

    assert!(stdout.contains("Power Watchdog PMD30"), "{stdout}");
    assert!(stdout.contains("120.5 V"), "{stdout}");
    assert!(
        stdout.trim_end().ends_with("Stopped: reached 1 update(s)"),
        "{stdout}"
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn control_command_reports_confirmed_relay_change() -> anyhow::Result<()> {
    let reply = gen2_report_packet();
    let stdout = run_with_argv([
        "hughes",
        "--fake",
        "--fake-command-reply",
        &reply,
        "control",
        "--name",
        "WD_V6_01",
        "relay",
        "off",
    ])
    .await?;

    assert_eq!(
        vec![json!({"action": "relay", "state": "off", "outcome": "confirmed"})],
        json_lines(&stdout)
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn control_command_pretty_output_without_reply_is_unconfirmed() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "hughes",
        "--output-format",
        "pretty",
        "--fake",
        "control",
        "--name",
        "WD_V6_01",
        "backlight",
        "3",
    ])
    .await?;

    assert_eq!("Backlight 3: unconfirmed", stdout.trim_end());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn control_command_fails_for_gen1_device() {
    let error = run_with_argv([
        "hughes",
        "--fake",
        "control",
        "--name",
        "PMD30",
        "reset-energy",
    ])
    .await
    .expect_err("gen1 has no command channel");

    assert_eq!("gen1 devices do not accept commands", format!("{error:#}"));
}

#[tokio::test(start_paused = true)]
async fn control_command_times_out_when_device_never_connects() {
    let error = run_with_argv([
        "hughes",
        "--fake",
        "--fake-connect-failures",
        "100",
        "control",
        "--connect-timeout",
        "30s",
        "--name",
        "WD_V6_01",
        "relay",
        "on",
    ])
    .await
    .expect_err("connection never succeeds");

    assert_eq!("not connected after 30s", format!("{error:#}"));
}

#[test]
fn control_command_rejects_backlight_out_of_range() {
    let result = hughes::Args::try_parse_from([
        "hughes",
        "control",
        "--name",
        "WD_V6_01",
        "backlight",
        "9",
    ]);

    assert_eq!(
        ErrorKind::ValueValidation,
        result.expect_err("9 is out of range").kind()
    );
}
