//! Class groups, students, subjects and subject assignments.

use crate::ipc::helpers::{
    optional_str, require_db, require_owner, required_str, respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{GradebookStore, SqliteStore};
use serde_json::json;

fn handle_classes_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let name = required_str(&req.params, "name")?;
    let batch = required_str(&req.params, "batch")?;
    let class = store.create_class_group(owner, name, batch)?;
    Ok(json!({ "class": class }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let classes = store.list_class_groups(owner)?;
    let counts = classes
        .iter()
        .map(|c| store.find_students(owner, &c.id).map(|s| s.len()))
        .collect::<Result<Vec<_>, _>>()?;
    let rows: Vec<_> = classes
        .iter()
        .zip(counts)
        .map(|(c, n)| {
            json!({
                "id": c.id,
                "name": c.name,
                "batch": c.batch,
                "label": c.to_string(),
                "studentCount": n
            })
        })
        .collect();
    Ok(json!({ "classes": rows }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let class_id = required_str(&req.params, "classId")?;
    let name = required_str(&req.params, "name")?;
    let student = store.create_student(owner, class_id, name)?;
    Ok(json!({ "student": student }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let students = match optional_str(&req.params, "classId") {
        Some(class_id) => store.find_students(owner, class_id)?,
        None => store.list_students(owner)?,
    };
    Ok(json!({ "students": students }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let name = required_str(&req.params, "name")?;
    let subject = store.create_subject(owner, name)?;
    Ok(json!({ "subject": subject }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    Ok(json!({ "subjects": store.list_subjects(owner)? }))
}

fn handle_subjects_assign(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let class_id = required_str(&req.params, "classId")?;
    let assignment = store.assign_subject(owner, subject_id, class_id)?;
    Ok(json!({ "assignment": assignment }))
}

fn handle_subjects_assignments(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    Ok(json!({ "assignments": store.list_subject_assignments(owner)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.create" => handle_classes_create(state, req),
        "classes.list" => handle_classes_list(state, req),
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.assign" => handle_subjects_assign(state, req),
        "subjects.assignments" => handle_subjects_assignments(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
