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
    periods: Vec<String>,
    students: Vec<String>,
}

fn setup(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
    period_count: usize,
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
        json!({ "name": "5B", "subject": "Física" }),
    );
    let class_id = expect_ok(&r, "classes.create")["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    let mut students = Vec::new();
    for (i, (first, last)) in [("Ana", "Lopez"), ("Juan", "Perez")].iter().enumerate() {
        let r = request(
            stdin,
            reader,
            &format!("s3-{}", i),
            "students.create",
            json!({
                "classId": class_id,
                "firstName": first,
                "lastName": last
            }),
        );
        students.push(
            expect_ok(&r, "students.create")["studentId"]
                .as_str()
                .expect("studentId")
                .to_string(),
        );
    }

    let mut periods = Vec::new();
    for n in 1..=period_count {
        let r = request(
            stdin,
            reader,
            &format!("s4-{}", n),
            "periods.create",
            json!({
                "classId": class_id,
                "number": n,
                "year": 2026,
                "periodType": "trimester",
                "startDate": format!("2026-{:02}-01", n * 3),
                "endDate": format!("2026-{:02}-28", n * 3 + 2)
            }),
        );
        periods.push(
            expect_ok(&r, "periods.create")["periodId"]
                .as_str()
                .expect("periodId")
                .to_string(),
        );
    }

    Fixture {
        class_id,
        periods,
        students,
    }
}

#[test]
fn grade_totals_status_and_labels() {
    let workspace = temp_dir("aula-grades-totals");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, &workspace, 1);

    // Ana: perfect components. Juan: everything zero.
    let r = request(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.bulkUpsert",
        json!({
            "classId": fx.class_id,
            "periodId": fx.periods[0],
            "grades": [
                {
                    "studentId": fx.students[0],
                    "ser": 5, "saber": 45, "hacer": 40, "decidir": 5, "autoevaluacion": 5
                },
                {
                    "studentId": fx.students[1],
                    "ser": 0, "saber": 0, "hacer": 0, "decidir": 0, "autoevaluacion": 0
                }
            ]
        }),
    );
    expect_ok(&r, "grades.bulkUpsert");

    let r = request(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.stats",
        json!({
            "classId": fx.class_id,
            "periodId": fx.periods[0],
            "sortKey": "studentName"
        }),
    );
    let result = expect_ok(&r, "grades.stats");
    let rows = result["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0]["studentName"], "Ana Lopez");
    assert_eq!(rows[0]["total"], 100.0);
    assert_eq!(rows[0]["status"], "approved");
    assert_eq!(rows[0]["label"], "Excelente");

    assert_eq!(rows[1]["studentName"], "Juan Perez");
    assert_eq!(rows[1]["total"], 0.0);
    assert_eq!(rows[1]["status"], "failed");
    assert_eq!(rows[1]["label"], "Insuficiente");

    assert_eq!(result["summary"]["approvedCount"], 1);
    assert_eq!(result["summary"]["failedCount"], 1);
    assert_eq!(result["summary"]["averageTotal"], 50.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grade_component_bounds_are_enforced_per_field() {
    let workspace = temp_dir("aula-grades-bounds");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, &workspace, 1);

    let r = request(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.bulkUpsert",
        json!({
            "classId": fx.class_id,
            "periodId": fx.periods[0],
            "grades": [{
                "studentId": fx.students[0],
                "ser": 5, "saber": 46, "hacer": 40, "decidir": 5, "autoevaluacion": 5
            }]
        }),
    );
    assert_eq!(r["ok"], false);
    assert_eq!(r["error"]["code"], "bad_params");
    let errors = r["error"]["details"]["errors"].as_array().expect("errors");
    assert_eq!(errors[0]["field"], "saber");
    assert_eq!(errors[0]["min"], 0.0);
    assert_eq!(errors[0]["max"], 45.0);

    // The rejected batch wrote nothing.
    let r = request(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.stats",
        json!({ "classId": fx.class_id, "periodId": fx.periods[0] }),
    );
    let rows = expect_ok(&r, "grades.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert!(rows.is_empty());

    // Boundary value 51 passes; 50.9 fails.
    let r = request(
        &mut stdin,
        &mut reader,
        "g3",
        "grades.bulkUpsert",
        json!({
            "classId": fx.class_id,
            "periodId": fx.periods[0],
            "grades": [
                {
                    "studentId": fx.students[0],
                    "ser": 5, "saber": 41, "hacer": 0, "decidir": 5, "autoevaluacion": 0
                },
                {
                    "studentId": fx.students[1],
                    "ser": 5, "saber": 40.9, "hacer": 0, "decidir": 5, "autoevaluacion": 0
                }
            ]
        }),
    );
    expect_ok(&r, "grades.bulkUpsert");

    let r = request(
        &mut stdin,
        &mut reader,
        "g4",
        "grades.stats",
        json!({
            "classId": fx.class_id,
            "periodId": fx.periods[0],
            "sortKey": "studentName"
        }),
    );
    let rows = expect_ok(&r, "grades.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert_eq!(rows[0]["total"], 51.0);
    assert_eq!(rows[0]["status"], "approved");
    assert_eq!(rows[1]["total"], 50.9);
    assert_eq!(rows[1]["status"], "failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn final_grades_average_contributing_periods() {
    let workspace = temp_dir("aula-grades-final");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, &workspace, 2);

    // Ana scores 80 then 90; Juan scores 40 in the first period only.
    for (i, &(period, ana_saber, juan)) in [
        (&fx.periods[0], 30.0, true),
        (&fx.periods[1], 40.0, false),
    ]
    .iter()
    .enumerate()
    {
        let mut grades = vec![json!({
            "studentId": fx.students[0],
            "ser": 5, "saber": ana_saber, "hacer": 40, "decidir": 5, "autoevaluacion": 0
        })];
        if juan {
            grades.push(json!({
                "studentId": fx.students[1],
                "ser": 0, "saber": 40, "hacer": 0, "decidir": 0, "autoevaluacion": 0
            }));
        }
        let r = request(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "grades.bulkUpsert",
            json!({
                "classId": fx.class_id,
                "periodId": period,
                "grades": grades
            }),
        );
        expect_ok(&r, "grades.bulkUpsert");
    }

    let r = request(
        &mut stdin,
        &mut reader,
        "f1",
        "finalGrades.list",
        json!({ "classId": fx.class_id }),
    );
    let result = expect_ok(&r, "finalGrades.list");
    let rows = result["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);

    // Default sort is final score descending.
    assert_eq!(rows[0]["studentName"], "Ana Lopez");
    assert_eq!(rows[0]["finalScore"], 85.0);
    assert_eq!(rows[0]["finalStatus"], "approved");
    assert_eq!(rows[0]["periodsCount"], 2);
    let lines = rows[0]["periodGrades"].as_array().expect("periodGrades");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["number"], 1);
    assert_eq!(lines[0]["total"], 80.0);
    assert_eq!(lines[1]["total"], 90.0);

    assert_eq!(rows[1]["studentName"], "Juan Perez");
    assert_eq!(rows[1]["finalScore"], 40.0);
    assert_eq!(rows[1]["finalStatus"], "failed");
    assert_eq!(rows[1]["periodsCount"], 1);

    assert_eq!(result["summary"]["approvedCount"], 1);
    assert_eq!(result["summary"]["failedCount"], 1);

    // Status filter narrows before search/sort.
    let r = request(
        &mut stdin,
        &mut reader,
        "f2",
        "finalGrades.list",
        json!({ "classId": fx.class_id, "statusFilter": "failed" }),
    );
    let rows = expect_ok(&r, "finalGrades.list")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentName"], "Juan Perez");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
