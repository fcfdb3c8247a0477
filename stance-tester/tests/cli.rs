use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "stance-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_stance-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    assert!(content.contains("stampede"));
}

#[test]
fn cli_runs_scenarios_with_json_report() {
    let exe = env!("CARGO_BIN_EXE_stance-tester");
    let output_path = temp_path("run");
    let output = Command::new(exe)
        .args([
            "--report",
            "json",
            "--scenarios",
            "codec,stampede,votes",
            "--iterations",
            "2",
            "--concurrency",
            "8",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_path).expect("read output"))
            .expect("json report");
    let names: Vec<_> = report
        .as_array()
        .expect("array")
        .iter()
        .map(|r| r["scenario_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, ["codec", "stampede", "votes"]);
    assert!(report.as_array().unwrap().iter().all(|r| r["passed"] == true));
}

#[test]
fn cli_rejects_missing_corpus() {
    let exe = env!("CARGO_BIN_EXE_stance-tester");
    let output = Command::new(exe)
        .args(["--corpus", "/nonexistent/takes.json", "--iterations", "1"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read corpus"));
}
