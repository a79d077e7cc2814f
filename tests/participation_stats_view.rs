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

#[test]
fn participation_levels_average_and_rank_sort() {
    let workspace = temp_dir("aula-participation-view");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let r = request(
        &mut stdin,
        &mut reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    expect_ok(&r, "workspace.select");

    let r = request(
        &mut stdin,
        &mut reader,
        "s2",
        "classes.create",
        json!({ "name": "2C", "subject": "Lenguaje" }),
    );
    let class_id = expect_ok(&r, "classes.create")["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    let mut students = Vec::new();
    for (i, (first, last)) in [("Ana", "Lopez"), ("Juan", "Perez"), ("Marco", "Diaz")]
        .iter()
        .enumerate()
    {
        let r = request(
            &mut stdin,
            &mut reader,
            &format!("s3-{}", i),
            "students.create",
            json!({ "classId": class_id, "firstName": first, "lastName": last }),
        );
        students.push(
            expect_ok(&r, "students.create")["studentId"]
                .as_str()
                .expect("studentId")
                .to_string(),
        );
    }

    let r = request(
        &mut stdin,
        &mut reader,
        "s4",
        "periods.create",
        json!({
            "classId": class_id,
            "number": 1,
            "year": 2026,
            "periodType": "trimester",
            "startDate": "2026-02-01",
            "endDate": "2026-05-31"
        }),
    );
    let period_id = expect_ok(&r, "periods.create")["periodId"]
        .as_str()
        .expect("periodId")
        .to_string();

    // Four days. Ana: always high. Juan: two medium, two low.
    // Marco: always low.
    let days = [
        ("2026-02-02", ["high", "medium", "low"]),
        ("2026-02-03", ["high", "medium", "low"]),
        ("2026-02-04", ["high", "low", "low"]),
        ("2026-02-05", ["high", "low", "low"]),
    ];
    for (i, (date, levels)) in days.iter().enumerate() {
        let entries: Vec<serde_json::Value> = students
            .iter()
            .zip(levels.iter())
            .map(|(student_id, level)| json!({ "studentId": student_id, "level": level }))
            .collect();
        let r = request(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            "participation.bulkUpsert",
            json!({
                "classId": class_id,
                "periodId": period_id,
                "date": date,
                "entries": entries
            }),
        );
        expect_ok(&r, "participation.bulkUpsert");
    }

    let r = request(
        &mut stdin,
        &mut reader,
        "v1",
        "participation.stats",
        json!({ "classId": class_id, "periodId": period_id }),
    );
    let result = expect_ok(&r, "participation.stats");
    let rows = result["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0]["studentName"], "Ana Lopez");
    assert_eq!(rows[0]["highCount"], 4);
    assert_eq!(rows[0]["averageScore"], 3.0);
    assert_eq!(rows[0]["averageLevel"], "Alta");
    assert_eq!(rows[0]["tier"], "success");

    // Juan: ranks (2+2+1+1)/4 = 1.5, the lower edge of Media.
    assert_eq!(rows[1]["studentName"], "Juan Perez");
    assert_eq!(rows[1]["mediumCount"], 2);
    assert_eq!(rows[1]["lowCount"], 2);
    assert_eq!(rows[1]["averageScore"], 1.5);
    assert_eq!(rows[1]["averageLevel"], "Media");

    assert_eq!(rows[2]["studentName"], "Marco Diaz");
    assert_eq!(rows[2]["averageScore"], 1.0);
    assert_eq!(rows[2]["averageLevel"], "Baja");
    assert_eq!(rows[2]["tier"], "error");

    let summary = &result["summary"];
    assert_eq!(summary["altaCount"], 1);
    assert_eq!(summary["mediaCount"], 1);
    assert_eq!(summary["bajaCount"], 1);

    // Sorting by the categorical level compares ranks, not label text:
    // ascending puts Baja first and Alta last.
    let r = request(
        &mut stdin,
        &mut reader,
        "v2",
        "participation.stats",
        json!({
            "classId": class_id,
            "periodId": period_id,
            "sortKey": "averageLevel",
            "sortDir": "asc"
        }),
    );
    let rows = expect_ok(&r, "participation.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    let levels: Vec<&str> = rows
        .iter()
        .map(|r| r["averageLevel"].as_str().unwrap())
        .collect();
    assert_eq!(levels, vec!["Baja", "Media", "Alta"]);

    // Identifier substring search matches the student id field.
    let r = request(
        &mut stdin,
        &mut reader,
        "v3",
        "participation.stats",
        json!({
            "classId": class_id,
            "periodId": period_id,
            "search": students[2]
        }),
    );
    let rows = expect_ok(&r, "participation.stats")["rows"]
        .as_array()
        .expect("rows")
        .clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentName"], "Marco Diaz");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
