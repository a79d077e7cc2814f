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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_aulad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn aulad");
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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn expect_ok(value: &serde_json::Value, what: &str) -> serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        what,
        value
    );
    value.get("result").cloned().unwrap_or(json!({}))
}

struct Fixture {
    class_id: String,
    period_id: String,
    students: Vec<String>,
}

fn setup(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
    names: &[(&str, &str)],
) -> Fixture {
    let r = request(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    expect_ok(&r, "workspace.select");

    let r = request(
        stdin,
        reader,
        "s2",
        "classes.create",
        json!({ "name": "3A", "subject": "Matemáticas" }),
    );
    let class_id = expect_ok(&r, "classes.create")["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    let mut students = Vec::new();
    for (i, (first, last)) in names.iter().enumerate() {
        let r = request(
            stdin,
            reader,
            &format!("s3-{}", i),
            "students.create",
            json!({
                "classId": class_id,
                "firstName": first,
                "lastName": last,
                "ci": format!("10{}", i)
            }),
        );
        students.push(
            expect_ok(&r, "students.create")["studentId"]
                .as_str()
                .expect("studentId")
                .to_string(),
        );
    }

    let r = request(
        stdin,
        reader,
        "s4",
        "periods.create",
        json!({
            "classId": class_id,
            "number": 2,
            "year": 2026,
            "periodType": "bimester",
            "startDate": "2026-04-01",
            "endDate": "2026-06-30"
        }),
    );
    let period_id = expect_ok(&r, "periods.create")["periodId"]
        .as_str()
        .expect("periodId")
        .to_string();

    Fixture {
        class_id,
        period_id,
        students,
    }
}

fn stamp_day(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    fx: &Fixture,
    id: &str,
    date: &str,
    statuses: &[&str],
) {
    let entries: Vec<serde_json::Value> = fx
        .students
        .iter()
        .zip(statuses)
        .map(|(student_id, status)| json!({ "studentId": student_id, "status": status }))
        .collect();
    let r = request(
        stdin,
        reader,
        id,
        "attendance.bulkUpsert",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "date": date,
            "entries": entries
        }),
    );
    expect_ok(&r, "attendance.bulkUpsert");
}

#[test]
fn attendance_save_stats_and_thresholds() {
    let workspace = temp_dir("aula-attendance-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(
        &mut stdin,
        &mut reader,
        &workspace,
        &[("Ana", "Lopez"), ("Juan", "Perez"), ("Marco", "Diaz")],
    );

    // Ten school days. Ana: all present. Juan: 8 present, 1 late, 1 absent.
    // Marco: 6 present, 4 absent.
    for day in 1..=10 {
        let juan = match day {
            1 => "late",
            2 => "absent",
            _ => "present",
        };
        let marco = if day <= 4 { "absent" } else { "present" };
        stamp_day(
            &mut stdin,
            &mut reader,
            &fx,
            &format!("d{}", day),
            &format!("2026-04-{:02}", day),
            &["present", juan, marco],
        );
    }

    let r = request(
        &mut stdin,
        &mut reader,
        "v1",
        "attendance.stats",
        json!({ "classId": fx.class_id, "periodId": fx.period_id }),
    );
    let result = expect_ok(&r, "attendance.stats");
    let rows = result["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);

    // Default order is by student name ascending.
    assert_eq!(rows[0]["studentName"], "Ana Lopez");
    assert_eq!(rows[0]["presentCount"], 10);
    assert_eq!(rows[0]["percentage"], 100.0);
    assert_eq!(rows[0]["label"], "Excelente");
    assert_eq!(rows[0]["tier"], "success");

    assert_eq!(rows[1]["studentName"], "Juan Perez");
    assert_eq!(rows[1]["presentCount"], 8);
    assert_eq!(rows[1]["lateCount"], 1);
    assert_eq!(rows[1]["absentCount"], 1);
    assert_eq!(rows[1]["totalDays"], 10);
    // 8/10 falls in the warning band.
    assert_eq!(rows[1]["percentage"], 80.0);
    assert_eq!(rows[1]["label"], "Regular");

    assert_eq!(rows[2]["studentName"], "Marco Diaz");
    assert_eq!(rows[2]["percentage"], 60.0);
    assert_eq!(rows[2]["label"], "Deficiente");
    assert_eq!(rows[2]["tier"], "error");

    let summary = &result["summary"];
    assert_eq!(summary["studentCount"], 3);
    assert_eq!(summary["below85"], 2);
    assert_eq!(summary["below70"], 1);
    assert_eq!(summary["averagePercentage"], 80.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn attendance_search_and_sort_shape_the_view() {
    let workspace = temp_dir("aula-attendance-view");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(
        &mut stdin,
        &mut reader,
        &workspace,
        &[("Ana", "Lopez"), ("Juan", "Perez"), ("Marco", "Diaz")],
    );

    stamp_day(
        &mut stdin,
        &mut reader,
        &fx,
        "d1",
        "2026-04-06",
        &["present", "absent", "late"],
    );

    // Case-insensitive substring: "an" matches Ana Lopez and Juan Perez.
    let r = request(
        &mut stdin,
        &mut reader,
        "v1",
        "attendance.stats",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "search": "an"
        }),
    );
    let rows = expect_ok(&r, "attendance.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    let names: Vec<&str> = rows
        .iter()
        .map(|r| r["studentName"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ana Lopez", "Juan Perez"]);

    // Descending percentage puts the present student first.
    let r = request(
        &mut stdin,
        &mut reader,
        "v2",
        "attendance.stats",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "sortKey": "percentage",
            "sortDir": "desc"
        }),
    );
    let rows = expect_ok(&r, "attendance.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert_eq!(rows[0]["studentName"], "Ana Lopez");
    assert_eq!(rows[2]["percentage"], 0.0);

    // Unknown sort keys are rejected with the accepted token list.
    let r = request(
        &mut stdin,
        &mut reader,
        "v3",
        "attendance.stats",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "sortKey": "shoeSize"
        }),
    );
    assert_eq!(r["ok"], false);
    assert_eq!(r["error"]["code"], "bad_params");
    assert!(r["error"]["details"]["allowed"].is_array());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn attendance_rejects_bad_dates_and_unknown_status() {
    let workspace = temp_dir("aula-attendance-reject");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, &workspace, &[("Ana", "Lopez")]);

    // Outside the period's [start, end] range.
    let r = request(
        &mut stdin,
        &mut reader,
        "r1",
        "attendance.bulkUpsert",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "date": "2026-07-15",
            "entries": [{ "studentId": fx.students[0], "status": "present" }]
        }),
    );
    assert_eq!(r["ok"], false);
    assert_eq!(r["error"]["code"], "bad_params");
    assert_eq!(r["error"]["details"]["startDate"], "2026-04-01");
    assert_eq!(r["error"]["details"]["endDate"], "2026-06-30");

    // Unknown wire token is rejected at the boundary with the allowed set,
    // and the failed write leaves no record behind.
    let r = request(
        &mut stdin,
        &mut reader,
        "r2",
        "attendance.bulkUpsert",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "date": "2026-04-10",
            "entries": [{ "studentId": fx.students[0], "status": "presente" }]
        }),
    );
    assert_eq!(r["ok"], false);
    let errors = r["error"]["details"]["errors"].as_array().expect("errors");
    assert_eq!(errors[0]["field"], "status");
    assert_eq!(errors[0]["allowed"], json!(["present", "absent", "late"]));

    let r = request(
        &mut stdin,
        &mut reader,
        "r3",
        "attendance.stats",
        json!({ "classId": fx.class_id, "periodId": fx.period_id }),
    );
    let rows = expect_ok(&r, "attendance.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert!(rows.is_empty(), "rejected save must not create records");

    // Reading a day with no records reports the default status for everyone.
    let r = request(
        &mut stdin,
        &mut reader,
        "r4",
        "attendance.dayOpen",
        json!({
            "classId": fx.class_id,
            "periodId": fx.period_id,
            "date": "2026-04-10"
        }),
    );
    let rows = expect_ok(&r, "attendance.dayOpen")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert_eq!(rows[0]["status"], "present");
    assert_eq!(rows[0]["hasRecord"], false);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
