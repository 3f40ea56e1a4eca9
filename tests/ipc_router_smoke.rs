mod test_support;

use serde_json::json;
use test_support::{seed_school, spawn_sidecar, str_field};

#[test]
fn health_reports_version_before_and_after_workspace_select() {
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert!(health["workspacePath"].is_null());

    let workspace = sc.open_workspace("gradebookd-smoke-health");
    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["workspacePath"], &*workspace.to_string_lossy());
    assert!(workspace.join("gradebook.sqlite3").is_file());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn protocol_errors_use_stable_codes() {
    let mut sc = spawn_sidecar();

    let bad = sc.send_line("{not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    let e = sc.request_err("owners.create", json!({ "name": "Mrs Ade" }));
    assert_eq!(e["code"], "no_workspace");

    let e = sc.request_err("nope.method", json!({}));
    assert_eq!(e["code"], "not_implemented");

    let workspace = sc.open_workspace("gradebookd-smoke-errors");
    let e = sc.request_err("classes.list", json!({ "ownerId": "ghost" }));
    assert_eq!(e["code"], "not_found");
    assert_eq!(e["details"]["ownerId"], "ghost");

    let e = sc.request_err("owners.create", json!({ "name": "  " }));
    assert_eq!(e["code"], "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn every_handler_family_is_routed() {
    let mut sc = spawn_sidecar();
    let workspace = sc.open_workspace("gradebookd-smoke-router");
    let school = seed_school(&mut sc);
    let ada = school.student(&mut sc, "Ada");
    let created = school.assessment(&mut sc, json!({}));
    let assessment_id = str_field(&created, "/assessment/id");
    school.save(&mut sc, &ada, &assessment_id, 40);

    let owner = json!(school.owner);
    let calls = [
        ("classes.list", json!({ "ownerId": owner })),
        ("students.list", json!({ "ownerId": owner })),
        ("subjects.list", json!({ "ownerId": owner })),
        ("subjects.assignments", json!({ "ownerId": owner })),
        ("assessments.list", json!({ "ownerId": owner })),
        ("assessments.get", json!({ "ownerId": owner, "assessmentId": assessment_id })),
        ("entries.list", json!({ "ownerId": owner, "assessmentId": assessment_id })),
        (
            "entries.missingStudents",
            json!({ "ownerId": owner, "assessmentId": assessment_id }),
        ),
        ("logic.validate", json!({ "expression": "@1 + @2" })),
        (
            "reports.build",
            json!({
                "ownerId": owner,
                "subjectAssignmentId": school.assignment_id,
                "className": "JSS1"
            }),
        ),
        ("search", json!({ "ownerId": owner, "query": "ada" })),
        ("setup.get", json!({})),
    ];
    for (method, params) in calls {
        sc.request_ok(method, params);
    }

    let classes = sc.request_ok("classes.list", json!({ "ownerId": owner }));
    assert_eq!(classes["classes"][0]["label"], "JSS1 A");
    assert_eq!(classes["classes"][0]["studentCount"], 1);

    let _ = std::fs::remove_dir_all(workspace);
}
