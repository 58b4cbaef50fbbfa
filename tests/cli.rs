use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn linear_csv() -> String {
    let mut csv = String::from("Id,x1,x2,x3,y\n");
    for i in 0..40 {
        let t = i as f64;
        let x1 = (t * 0.37).sin() * 3.0;
        let x2 = (t * 0.11).cos() * 2.0 + 0.05 * t;
        let x3 = ((i * 13) % 7) as f64;
        let y = 1.0 + 2.0 * x1 - x2 + 0.5 * x3 + 0.01 * ((i * 31) % 5) as f64;
        csv.push_str(&format!("{},{x1},{x2},{x3},{y}\n", i + 1));
    }
    csv
}

#[test]
fn analyze_prints_metrics_and_writes_artifacts() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("data.csv");
    fs::write(&data_path, linear_csv()).expect("write data");
    let out_dir = tmp.path().join("out");

    let exe = env!("CARGO_BIN_EXE_nimbus");
    let output = Command::new(exe)
        .args([
            "analyze",
            data_path.to_str().expect("path str"),
            "--target",
            "y",
            "--drop",
            "Id",
            "--folds",
            "4",
            "--output-dir",
            out_dir.to_str().expect("path str"),
        ])
        .output()
        .expect("run nimbus cli");

    assert!(output.status.success(), "CLI exited with status {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Linear Regression:"), "stdout: {stdout}");
    assert!(stdout.contains("Mean CV Score"), "stdout: {stdout}");
    assert!(out_dir.join("metrics.tsv").exists(), "metrics.tsv missing");
    assert!(out_dir.join("correlation.tsv").exists(), "correlation.tsv missing");
}

#[test]
fn vif_subcommand_lists_every_feature() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("data.csv");
    fs::write(&data_path, linear_csv()).expect("write data");

    let exe = env!("CARGO_BIN_EXE_nimbus");
    let output = Command::new(exe)
        .args(["vif", data_path.to_str().expect("path str"), "--target", "y"])
        .output()
        .expect("run nimbus cli");

    assert!(output.status.success(), "CLI exited with status {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    for feature in ["Id", "x1", "x2", "x3"] {
        assert!(stdout.contains(feature), "{feature} missing from: {stdout}");
    }
}

#[test]
fn missing_target_column_exits_with_schema_error() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("data.csv");
    fs::write(&data_path, linear_csv()).expect("write data");

    let exe = env!("CARGO_BIN_EXE_nimbus");
    let output = Command::new(exe)
        .args(["analyze", data_path.to_str().expect("path str"), "--target", "PM10"])
        .output()
        .expect("run nimbus cli");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error (schema error)"), "stderr: {stderr}");
}
