use crate::error::GradeResult;
use crate::ipc::helpers::{require_db, require_owner, required_str, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssessmentFilter, ClassGroup, Student};
use crate::store::{GradebookStore, SqliteStore};
use serde_json::{json, Value};

use super::assessments::assessment_json;

struct SearchResults {
    assessments: Vec<Value>,
    students: Vec<Student>,
    classes: Vec<ClassGroup>,
}

/// Case-insensitive substring match within one owner's data.
fn search_all(store: &SqliteStore<'_>, owner: &str, query: &str) -> GradeResult<SearchResults> {
    let needle = query.to_lowercase();
    let hit = |s: &str| s.to_lowercase().contains(&needle);

    let assessments = store
        .find_assessments(owner, &AssessmentFilter::default())?
        .iter()
        .filter(|a| hit(&a.label()))
        .map(assessment_json)
        .collect();
    let students = store
        .list_students(owner)?
        .into_iter()
        .filter(|s| hit(&s.name))
        .collect();
    let classes = store
        .list_class_groups(owner)?
        .into_iter()
        .filter(|c| hit(&c.name))
        .collect();
    Ok(SearchResults {
        assessments,
        students,
        classes,
    })
}

fn handle_search(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let query = required_str(&req.params, "query")?;
    let found = search_all(&store, owner, query)?;
    Ok(json!({
        "assessments": found.assessments,
        "students": found.students,
        "classes": found.classes
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "search" => Some(respond(req, handle_search(state, req))),
        _ => None,
    }
}
