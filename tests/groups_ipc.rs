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

fn error_of(value: &serde_json::Value) -> (&str, u64) {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{value}");
    (
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown"),
        value
            .pointer("/error/details/httpStatus")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    )
}

fn member_ids(value: &serde_json::Value) -> Vec<i64> {
    value["students"]
        .as_array()
        .expect("students array")
        .iter()
        .map(|s| s["id"].as_i64().expect("student id"))
        .collect()
}

/// Three students: #1 Math 5 and 4, #2 Math 3, #3 no grades.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, name) in ["Ada", "Bob", "Cyd"].into_iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("seed-s{i}"),
            "students.create",
            json!({ "firstName": name, "lastName": "X", "birthYear": 2005 }),
        );
    }
    for (i, (student, grade)) in [(1, 5), (1, 4), (2, 3)].into_iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("seed-g{i}"),
            "grades.create",
            json!({ "studentId": student, "subject": "Math", "grade": grade, "date": "2024-02-01" }),
        );
    }
}

#[test]
fn group_membership_and_stats() {
    let workspace = temp_dir("gradebook-groups-stats");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    seed(&mut stdin, &mut reader, &workspace);

    let group = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "groups.create",
        json!({ "name": "A1", "students": [1, 2, 2] }),
    );
    assert_eq!(group["id"], json!(1));
    assert_eq!(group["studentsCount"], json!(2));
    assert_eq!(member_ids(&group), vec![1, 2]);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.students.add",
        json!({ "groupId": 1, "studentId": 3 }),
    );
    assert_eq!(member_ids(&added), vec![1, 2, 3]);

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "groups.students.add",
        json!({ "groupId": 1, "studentId": 3 }),
    );
    assert_eq!(error_of(&resp), ("duplicate_relation", 409));

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "groups.stats",
        json!({ "groupId": 1 }),
    );
    let math = &stats["gradesStats"]["Math"];
    assert_eq!(math["gradesCount"], json!(3));
    assert!((math["avg"].as_f64().expect("avg") - 4.0).abs() < 1e-9);
    assert_eq!(math["min"], json!(3));
    assert_eq!(math["max"], json!(5));
    assert!((math["median"].as_f64().expect("median") - 4.0).abs() < 1e-9);

    let top = stats["topThreeStudents"].as_array().expect("top three");
    let ranked: Vec<i64> = top.iter().map(|s| s["id"].as_i64().expect("id")).collect();
    assert_eq!(ranked, vec![1, 2, 3]);
    assert!((top[0]["avgGrade"].as_f64().expect("avg") - 4.5).abs() < 1e-9);
    assert!((top[1]["avgGrade"].as_f64().expect("avg") - 3.0).abs() < 1e-9);
    assert!(top[2]["avgGrade"].is_null());

    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "groups.students.grades",
        json!({ "groupId": 1, "studentId": 1 }),
    );
    assert_eq!(grades["grades"].as_array().map(Vec::len), Some(2));
    assert_eq!(grades["grades"][0]["date"], json!("01.02.2024"));

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "groups.students.remove",
        json!({ "groupId": 1, "studentId": 2 }),
    );
    assert_eq!(removed["removed"], json!(true));
    assert_eq!(member_ids(&removed), vec![1, 3]);

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "groups.students.remove",
        json!({ "groupId": 1, "studentId": 2 }),
    );
    assert_eq!(again["removed"], json!(false));
    assert_eq!(member_ids(&again), vec![1, 3]);

    let resp = request(
        &mut stdin,
        &mut reader,
        "8",
        "groups.students.grades",
        json!({ "groupId": 1, "studentId": 2 }),
    );
    assert_eq!(error_of(&resp), ("not_found", 404));

    let resp = request(
        &mut stdin,
        &mut reader,
        "9",
        "groups.students.add",
        json!({ "groupId": 9, "studentId": 2 }),
    );
    assert_eq!(error_of(&resp), ("not_found", 404));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rename_preconditions_and_group_delete() {
    let workspace = temp_dir("gradebook-groups-lifecycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    seed(&mut stdin, &mut reader, &workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "groups.create",
        json!({ "name": "A1", "students": [1, 3] }),
    );
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.create",
        json!({ "name": "Empty" }),
    );
    assert_eq!(empty["id"], json!(2));
    assert_eq!(empty["studentsCount"], json!(0));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "groups.create",
        json!({ "name": "Ghosts", "students": [1, 99] }),
    );
    assert_eq!(error_of(&resp), ("not_found", 404));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "groups.stats",
        json!({ "groupId": 2 }),
    );
    assert_eq!(error_of(&resp), ("precondition_failed", 400));

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "groups.students.add",
        json!({ "groupId": 2, "studentId": 3 }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "groups.stats",
        json!({ "groupId": 2 }),
    );
    assert_eq!(error_of(&resp), ("precondition_failed", 400));

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "groups.rename",
        json!({ "groupId": 1, "name": "B2, evening" }),
    );
    assert_eq!(renamed["id"], json!(1));
    assert_eq!(renamed["name"], json!("B2, evening"));
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "groups.get",
        json!({ "groupId": 1 }),
    );
    assert_eq!(got["name"], json!("B2, evening"));
    assert_eq!(member_ids(&got), vec![1, 3]);

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "groups.delete",
        json!({ "groupId": 1 }),
    );
    assert_eq!(deleted["deleted"], json!(true));
    let listed = request_ok(&mut stdin, &mut reader, "10", "groups.list", json!({}));
    let ids: Vec<i64> = listed["groups"]
        .as_array()
        .expect("groups")
        .iter()
        .map(|g| g["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids, vec![2]);
    assert_eq!(
        std::fs::read_to_string(workspace.join("students_in_groups.csv")).expect("membership"),
        "student_id,group_id\n3,2\n"
    );

    // Students and grades survive a group delete.
    let students = request_ok(&mut stdin, &mut reader, "11", "students.list", json!({}));
    assert_eq!(students["students"].as_array().map(Vec::len), Some(3));
    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "grades.list",
        json!({ "studentId": 1 }),
    );
    assert_eq!(grades["gradesCount"], json!(2));

    let resp = request(
        &mut stdin,
        &mut reader,
        "13",
        "groups.rename",
        json!({ "groupId": 1, "name": "Gone" }),
    );
    assert_eq!(error_of(&resp), ("not_found", 404));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
