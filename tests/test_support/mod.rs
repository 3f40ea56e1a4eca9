#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Returns the error object of a failed call.
    pub fn request_err(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().expect("error object")
    }

    pub fn open_workspace(&mut self, prefix: &str) -> PathBuf {
        let workspace = temp_dir(prefix);
        self.request_ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        workspace
    }
}

pub fn str_field(v: &Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, v))
        .to_string()
}

/// Owner, class JSS1 A, subject Mathematics assigned to it.
pub struct School {
    pub owner: String,
    pub class_id: String,
    pub subject_id: String,
    pub assignment_id: String,
}

pub fn seed_school(sc: &mut Sidecar) -> School {
    let owner = str_field(
        &sc.request_ok("owners.create", json!({ "name": "Mrs Ade" })),
        "/ownerId",
    );
    let class_id = str_field(
        &sc.request_ok(
            "classes.create",
            json!({ "ownerId": owner, "name": "JSS1", "batch": "A" }),
        ),
        "/class/id",
    );
    let subject_id = str_field(
        &sc.request_ok(
            "subjects.create",
            json!({ "ownerId": owner, "name": "Mathematics" }),
        ),
        "/subject/id",
    );
    let assignment_id = str_field(
        &sc.request_ok(
            "subjects.assign",
            json!({ "ownerId": owner, "subjectId": subject_id, "classId": class_id }),
        ),
        "/assignment/id",
    );
    School {
        owner,
        class_id,
        subject_id,
        assignment_id,
    }
}

impl School {
    pub fn student(&self, sc: &mut Sidecar, name: &str) -> String {
        str_field(
            &sc.request_ok(
                "students.create",
                json!({ "ownerId": self.owner, "classId": self.class_id, "name": name }),
            ),
            "/student/id",
        )
    }

    pub fn assessment(&self, sc: &mut Sidecar, extra: Value) -> Value {
        let mut params = json!({
            "ownerId": self.owner,
            "subjectAssignmentId": self.assignment_id,
            "term": "First",
            "type": "Test",
            "number": 1,
            "totalScore": 100
        });
        if let (Some(base), Some(more)) = (params.as_object_mut(), extra.as_object()) {
            for (k, v) in more {
                base.insert(k.clone(), v.clone());
            }
        }
        sc.request_ok("assessments.create", params)
    }

    pub fn save(&self, sc: &mut Sidecar, student: &str, assessment: &str, score: i64) -> Value {
        sc.request_ok(
            "entries.save",
            json!({
                "ownerId": self.owner,
                "studentId": student,
                "assessmentId": assessment,
                "score": score
            }),
        )
    }
}
