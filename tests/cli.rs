use std::process::Command;

fn run_kestrel(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_kestrel"))
        .args(args)
        .output()
        .expect("failed to execute kestrel");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();

    (stdout, stderr, success)
}

#[test]
fn test_list_names_every_stub() {
    let (stdout, stderr, success) = run_kestrel(&["list"]);
    assert!(success, "list should succeed, stderr:\n{}", stderr);
    assert!(stdout.contains("x86_64"));
    assert!(stdout.contains("JSFunctionEntry"));
    assert!(stdout.contains("JSCall"));
    assert!(stdout.contains("CallRuntime"));
}

#[test]
fn test_list_json_is_parseable() {
    let (stdout, stderr, success) = run_kestrel(&["--arch", "aarch64", "list", "--json"]);
    assert!(success, "list --json should succeed, stderr:\n{}", stderr);

    let records: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 5);
    assert!(records
        .iter()
        .any(|r| r["name"] == "PushCallArgsAndDispatch"));
    for r in records {
        assert!(r["size"].as_u64().unwrap() > 0);
    }
}

#[test]
fn test_emit_writes_code_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stubs.bin");
    let (_, stderr, success) = run_kestrel(&[
        "--arch",
        "aarch64",
        "emit",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(success, "emit should succeed, stderr:\n{}", stderr);

    let bytes = std::fs::read(&out).unwrap();
    assert!(!bytes.is_empty());
    // Fixed-width ISA: the buffer holds whole instruction words.
    assert_eq!(bytes.len() % 4, 0);
}

#[test]
fn test_config_file_selects_arch() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("codegen.toml");
    std::fs::write(&config, "arch = \"aarch64\"\n").unwrap();

    let (stdout, _, success) = run_kestrel(&["--config", config.to_str().unwrap(), "list"]);
    assert!(success);
    assert!(stdout.contains("aarch64"));
    assert!(stdout.contains("ResumeRspAndReturn"));
}

#[test]
fn test_missing_config_file_fails() {
    let (_, stderr, success) = run_kestrel(&["--config", "/nonexistent/codegen.toml", "list"]);
    assert!(!success);
    assert!(stderr.contains("failed to read"));
}
