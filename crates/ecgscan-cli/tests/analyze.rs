use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use std::{error::Error, path::PathBuf};

fn run_analyze(args: &[&str], stdin: &str) -> Result<Value, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("ecgscan");
    cmd.arg("analyze").args(args).write_stdin(stdin);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn empty_request_returns_empty_result() -> Result<(), Box<dyn Error>> {
    let value = run_analyze(&[], "{}")?;
    assert_eq!(
        value,
        json!({
            "filtered_data": {"sampling_rate": 0, "data_points": []},
            "anomalies": []
        })
    );
    Ok(())
}

#[test]
fn malformed_request_reports_error_and_exits_cleanly() -> Result<(), Box<dyn Error>> {
    let value = run_analyze(&["--input", &sample_path("test_data/malformed.json")], "")?;
    let obj = value.as_object().expect("object");
    assert_eq!(obj.len(), 1, "unexpected keys: {:?}", obj.keys());
    let message = obj["error"].as_str().expect("error string");
    assert!(message.starts_with("Invalid JSON payload: "), "{}", message);
    Ok(())
}

#[test]
fn doubled_gap_is_flagged() -> Result<(), Box<dyn Error>> {
    let value = run_analyze(&["--input", &sample_path("test_data/doubled_gap.json")], "")?;
    assert_eq!(value["filtered_data"]["sampling_rate"], json!(100));
    assert_eq!(
        value["filtered_data"]["data_points"]
            .as_array()
            .map(Vec::len),
        Some(850)
    );
    let anomalies = value["anomalies"].as_array().expect("anomalies");
    assert_eq!(anomalies.len(), 1);
    let a = &anomalies[0];
    assert_close(a["start_time"].as_f64().unwrap(), 2.92, 1e-9);
    assert_close(a["end_time"].as_f64().unwrap(), 4.52, 1e-9);
    let score = a["score"].as_f64().unwrap();
    assert!(score > 0.0 && score <= 1.0);
    Ok(())
}

#[test]
fn non_positive_rate_suppresses_anomalies() -> Result<(), Box<dyn Error>> {
    let text = std::fs::read_to_string(sample_path("test_data/doubled_gap.json"))?;
    let mut request: Value = serde_json::from_str(&text)?;
    request["sampling_rate"] = json!(0);
    let value = run_analyze(&[], &request.to_string())?;
    assert_eq!(value["anomalies"], json!([]));
    assert_eq!(
        value["filtered_data"]["data_points"]
            .as_array()
            .map(Vec::len),
        Some(850)
    );
    Ok(())
}

#[test]
fn short_signal_is_echoed_unfiltered() -> Result<(), Box<dyn Error>> {
    let value = run_analyze(&[], r#"{"data_points": [1.5, 2.5, 3.5], "sampling_rate": 250}"#)?;
    assert_eq!(value["filtered_data"]["data_points"], json!([1.5, 2.5, 3.5]));
    assert_eq!(value["anomalies"], json!([]));
    Ok(())
}

#[test]
fn config_file_and_flags_tune_detection() -> Result<(), Box<dyn Error>> {
    let input = sample_path("test_data/doubled_gap.json");
    let config = sample_path("test_data/analyzer.toml");

    let strict = run_analyze(&["--input", &input, "--config", &config], "")?;
    assert_eq!(strict["anomalies"], json!([]));

    let relaxed = run_analyze(
        &["--input", &input, "--config", &config, "--detection-sigma", "2"],
        "",
    )?;
    assert_eq!(relaxed["anomalies"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn non_utf8_stdin_reports_error_and_exits_cleanly() -> Result<(), Box<dyn Error>> {
    let payload: &[u8] = b"{\"data_points\": [1, 2], \"x\": \"\xff\"}";
    let output = cargo_bin_cmd!("ecgscan")
        .arg("analyze")
        .write_stdin(payload)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    let obj = value.as_object().expect("object");
    assert_eq!(obj.len(), 1, "unexpected keys: {:?}", obj.keys());
    let message = obj["error"].as_str().expect("error string");
    assert!(message.starts_with("Invalid JSON payload: "), "{}", message);
    Ok(())
}

#[test]
fn repeated_keys_keep_last_value() -> Result<(), Box<dyn Error>> {
    let value = run_analyze(
        &[],
        r#"{"sampling_rate": 1, "sampling_rate": 100, "data_points": [1, 2, 3]}"#,
    )?;
    assert_eq!(value["filtered_data"]["sampling_rate"], json!(100));
    assert_eq!(value["anomalies"], json!([]));
    Ok(())
}

#[test]
fn invalid_config_fails() {
    let mut cmd = cargo_bin_cmd!("ecgscan");
    cmd.args(["analyze", "--window", "0"]).write_stdin("{}");
    cmd.assert().failure();
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(diff <= tol, "diff {} exceeded tol {} ({} vs {})", diff, tol, a, b);
}

fn sample_path(relative: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative)
        .to_string_lossy()
        .to_string()
}
