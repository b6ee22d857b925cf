use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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

fn spawn_sidecar(cwd: &PathBuf) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .current_dir(cwd)
        .env_remove("STUDENTS_FILE")
        .env_remove("GRADES_FILE")
        .env_remove("GROUPS_FILE")
        .env_remove("STUDENTS_IN_GROUPS_FILE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_of(value: &serde_json::Value) -> (String, u64) {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{value}");
    let error = value.get("error").expect("error object");
    let code = error
        .get("code")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let status = error
        .pointer("/details/httpStatus")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    (code, status)
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["configured"], json!(false));
    assert!(health["result"]["workspacePath"].is_null());

    let selected = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true), "{selected}");
    for name in [
        "students.csv",
        "grades.csv",
        "groups.csv",
        "students_in_groups.csv",
    ] {
        assert!(workspace.join(name).is_file(), "{name} created on select");
    }
    assert_eq!(
        std::fs::read_to_string(workspace.join("students.csv")).expect("students"),
        "id,first_name,last_name,birth_year\n"
    );

    let health = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["result"]["configured"], json!(true));

    let calls = [
        ("students.list", json!({})),
        ("groups.list", json!({})),
        ("students.get", json!({ "studentId": 1 })),
        ("grades.list", json!({ "studentId": 1 })),
        ("groups.get", json!({ "groupId": 1 })),
        ("groups.stats", json!({ "groupId": 1 })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("c{i}"), method, params);
        if resp["ok"] == json!(false) {
            let (code, _) = error_of(&resp);
            assert_ne!(code, "not_implemented", "unexpected unknown method for {method}");
        }
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn errors_carry_codes_and_http_status() {
    let workspace = temp_dir("gradebook-router-errors");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let resp = request(&mut stdin, &mut reader, "1", "students.list", json!({}));
    assert_eq!(error_of(&resp), ("no_workspace".to_string(), 409));

    let resp = request(&mut stdin, &mut reader, "2", "students.explode", json!({}));
    assert_eq!(error_of(&resp), ("not_implemented".to_string(), 501));
    assert_eq!(
        resp["error"]["message"],
        json!("unknown method: students.explode")
    );

    request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(&mut stdin, &mut reader, "4", "students.get", json!({}));
    assert_eq!(error_of(&resp), ("bad_params".to_string(), 400));

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.get",
        json!({ "studentId": "seven" }),
    );
    assert_eq!(error_of(&resp), ("bad_params".to_string(), 400));

    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.get",
        json!({ "studentId": 7 }),
    );
    assert_eq!(error_of(&resp), ("not_found".to_string(), 404));
    assert_eq!(
        resp["error"]["message"],
        json!("student #7 not found, supply a valid id")
    );

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    // The loop keeps serving after a bad line.
    let resp = request(&mut stdin, &mut reader, "7", "health", json!({}));
    assert_eq!(resp["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn select_reports_dangling_references() {
    let workspace = temp_dir("gradebook-router-dangling");
    std::fs::write(
        workspace.join("students.csv"),
        "id,first_name,last_name,birth_year\n1,Ada,Lovelace,2005\n",
    )
    .expect("students");
    std::fs::write(
        workspace.join("grades.csv"),
        "id,subject,grade,date,student_id\n1,Math,5,2024-03-01,9\n",
    )
    .expect("grades");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(error_of(&resp), ("data_integrity".to_string(), 500));

    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health["result"]["configured"], json!(false));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
