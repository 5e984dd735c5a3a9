use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_qdastored");
    let mut child = Command::new(exe)
        .env_remove("QDASTORE_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn qdastored");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn import_requires_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "project.importXml",
        json!({ "path": fixture_path("interviews_v15.xml") }),
    );
    assert_eq!(error_code(&resp), Some("no_workspace"));
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_counts_and_history_over_ipc() {
    let workspace = temp_dir("qdastore-ipc-import");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "project.importXml",
        json!({ "path": fixture_path("interviews_v15.xml") }),
    );
    let report = &result["report"];
    assert_eq!(report["outcome"], "committed");
    assert_eq!(report["formatVersion"], "1.5");
    assert_eq!(report["imported"]["collection"], 2);
    assert_eq!(report["skipped"]["keywordAssignment"], 1);
    assert_eq!(report["sourceSha256"].as_str().map(str::len), Some(64));

    let counts = request_ok(&mut stdin, &mut reader, "4", "project.counts", json!({}));
    assert_eq!(counts["counts"]["library"], 1);
    assert_eq!(counts["counts"]["clip"], 1);
    assert_eq!(counts["counts"]["transcript"], 2);
    assert_eq!(counts["counts"]["quote"], 0);

    let imports = request_ok(&mut stdin, &mut reader, "5", "project.imports", json!({}));
    let runs = imports["imports"].as_array().expect("imports array");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["sessionId"], report["sessionId"]);

    // Same project again: the library name collides and nothing is written.
    let failed = request(
        &mut stdin,
        &mut reader,
        "6",
        "project.importXml",
        json!({ "path": fixture_path("interviews_v15.xml") }),
    );
    assert_eq!(failed["ok"], false);
    assert_eq!(error_code(&failed), Some("import_persist_failed"));
    assert_eq!(failed["error"]["details"]["report"]["outcome"], "rolledBack");

    let counts = request_ok(&mut stdin, &mut reader, "7", "project.counts", json!({}));
    assert_eq!(counts["counts"]["library"], 1);
    assert_eq!(counts["counts"]["clip"], 1);
    let imports = request_ok(&mut stdin, &mut reader, "8", "project.imports", json!({}));
    assert_eq!(imports["imports"].as_array().map(Vec::len), Some(1));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_params_are_validated() {
    let workspace = temp_dir("qdastore-ipc-params");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(&mut stdin, &mut reader, "2", "project.importXml", json!({}));
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "project.importXml",
        json!({ "path": fixture_path("legacy_v10_latin1.xml"), "legacyCodec": "ebcdic" }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "project.importXml",
        json!({ "path": fixture_path("legacy_v10_latin1.xml"), "confirmLegacy": false }),
    );
    assert_eq!(error_code(&resp), Some("import_declined"));
    assert_eq!(resp["error"]["details"]["report"]["outcome"], "notStarted");

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "project.importXml",
        json!({ "path": workspace.join("missing.xml") }),
    );
    assert_eq!(error_code(&resp), Some("import_read_failed"));

    let resp = request(&mut stdin, &mut reader, "6", "project.frobnicate", json!({}));
    assert_eq!(error_code(&resp), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_config_file_is_picked_up() {
    let workspace = temp_dir("qdastore-ipc-config");
    std::fs::write(
        workspace.join("qdastore.toml"),
        "[import]\naccept_recoverable_issues = false\n",
    )
    .expect("write config");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // The dangling marker is a recoverable issue, which this workspace refuses.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "project.importXml",
        json!({ "path": fixture_path("dangling_link_v15.xml") }),
    );
    assert_eq!(error_code(&resp), Some("import_declined"));

    let resp = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "project.importXml",
        json!({ "path": fixture_path("dangling_link_v15.xml"), "acceptIssues": true }),
    );
    assert_eq!(resp["report"]["issues"].as_array().map(Vec::len), Some(1));

    drop(stdin);
    let _ = child.wait();
}
