use crate::config;
use crate::error::GradeError;
use crate::ipc::helpers::{
    optional_bool, optional_i64, optional_str, require_db, require_owner, required_i64,
    required_str, respond, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle::EntryManager;
use crate::logic;
use crate::model::{Assessment, AssessmentFilter, AssessmentKind, Term};
use crate::store::{GradebookStore, SqliteStore};
use serde_json::{json, Value};

pub fn assessment_json(a: &Assessment) -> Value {
    let mut v = json!(a);
    v["label"] = Value::from(a.label());
    v
}

fn parse_term(params: &Value, key: &str) -> Result<Option<Term>, HandlerErr> {
    match optional_str(params, key) {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => Term::parse(s)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown term: {}", s))),
    }
}

fn parse_kind(params: &Value, key: &str) -> Result<Option<AssessmentKind>, HandlerErr> {
    match optional_str(params, key) {
        None => Ok(None),
        Some(s) => AssessmentKind::parse(s)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown assessment type: {}", s))),
    }
}

/// Optional string that may be explicitly cleared with `null` or `""`.
fn parse_logic(params: &Value) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get("logic") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(None)),
        Some(Value::String(s)) => {
            logic::validate(s)?;
            Ok(Some(Some(s.trim().to_string())))
        }
        Some(_) => Err(HandlerErr::bad_params("logic must be a string")),
    }
}

fn check_shape(a: &Assessment) -> Result<(), HandlerErr> {
    if a.total_score <= 0 {
        return Err(HandlerErr::bad_params("totalScore must be greater than 0"));
    }
    if a.number < 0 {
        return Err(HandlerErr::bad_params("number must not be negative"));
    }
    Ok(())
}

pub(super) fn load_assessment(
    store: &SqliteStore<'_>,
    owner: &str,
    params: &Value,
) -> Result<Assessment, HandlerErr> {
    let id = required_str(params, "assessmentId")?;
    Ok(store
        .find_assessment(owner, id)?
        .ok_or_else(|| GradeError::AssessmentNotFound(id.to_string()))?)
}

/// Runs entry creation after a save when the assessment asks for it.
fn auto_create(
    conn: &rusqlite::Connection,
    store: &SqliteStore<'_>,
    owner: &str,
    a: &Assessment,
) -> Result<Value, HandlerErr> {
    if !(a.has_logic() && a.auto_create_entries) {
        return Ok(Value::Null);
    }
    let settings = config::logic_settings(conn)?;
    let summary = EntryManager::new(store, owner, settings).create_entries_for_assessment(a)?;
    Ok(json!(summary))
}

fn handle_assessments_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let p = &req.params;
    let owner = require_owner(&store, p)?;

    let assignment_id = required_str(p, "subjectAssignmentId")?;
    let assignment = store
        .find_subject_assignment(owner, assignment_id)?
        .ok_or_else(|| GradeError::NotFound("subject assignment".into()))?;
    let term = parse_term(p, "term")?.ok_or_else(|| HandlerErr::bad_params("missing term"))?;
    let kind = parse_kind(p, "type")?.ok_or_else(|| HandlerErr::bad_params("missing type"))?;

    let draft = Assessment {
        id: String::new(),
        term,
        subject_assignment_id: assignment.id.clone(),
        subject_id: assignment.subject_id.clone(),
        class_id: optional_str(p, "classId")
            .unwrap_or(assignment.class_id.as_str())
            .to_string(),
        kind,
        number: required_i64(p, "number")?,
        total_score: required_i64(p, "totalScore")?,
        logic: parse_logic(p)?.flatten(),
        auto_create_entries: optional_bool(p, "autoCreateEntries")?.unwrap_or(false),
        show_in_report: optional_bool(p, "showInReport")?.unwrap_or(true),
    };
    check_shape(&draft)?;

    let created = store.insert_assessment(owner, &draft)?;
    tracing::info!(assessment = %created.label(), id = %created.id, "assessment created");
    let entries = auto_create(conn, &store, owner, &created)?;
    Ok(json!({ "assessment": assessment_json(&created), "entries": entries }))
}

fn handle_assessments_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let mut a = load_assessment(&store, owner, p)?;

    if let Some(term) = parse_term(p, "term")? {
        a.term = term;
    }
    if let Some(kind) = parse_kind(p, "type")? {
        a.kind = kind;
    }
    if let Some(n) = optional_i64(p, "number")? {
        a.number = n;
    }
    if let Some(t) = optional_i64(p, "totalScore")? {
        a.total_score = t;
    }
    if let Some(logic) = parse_logic(p)? {
        a.logic = logic;
    }
    if let Some(b) = optional_bool(p, "autoCreateEntries")? {
        a.auto_create_entries = b;
    }
    if let Some(b) = optional_bool(p, "showInReport")? {
        a.show_in_report = b;
    }
    check_shape(&a)?;

    store.update_assessment(owner, &a)?;
    let entries = auto_create(conn, &store, owner, &a)?;
    Ok(json!({ "assessment": assessment_json(&a), "entries": entries }))
}

fn handle_assessments_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let a = load_assessment(&store, owner, &req.params)?;
    Ok(json!({ "assessment": assessment_json(&a) }))
}

fn handle_assessments_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let filter = AssessmentFilter {
        term: parse_term(p, "term")?,
        kind: parse_kind(p, "type")?,
        subject_assignment_id: optional_str(p, "subjectAssignmentId").map(str::to_string),
        class_ids: optional_str(p, "classId").map(|c| vec![c.to_string()]),
        ..AssessmentFilter::default()
    };
    let mut list = store.find_assessments(owner, &filter)?;
    list.sort_by_key(Assessment::column_order);
    let rows: Vec<Value> = list.iter().map(assessment_json).collect();
    Ok(json!({ "assessments": rows }))
}

fn handle_assessments_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let id = required_str(&req.params, "assessmentId")?;
    let removed = store.delete_assessment(owner, id)?;
    Ok(json!({ "ok": true, "entriesRemoved": removed }))
}

fn handle_assessments_recalculate(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let owner = require_owner(&store, &req.params)?;
    let a = load_assessment(&store, owner, &req.params)?;
    let settings = config::logic_settings(conn)?;
    let summary = EntryManager::new(&store, owner, settings).recalculate_assessment(&a)?;
    Ok(json!(summary))
}

fn handle_assessments_create_entries(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let owner = require_owner(&store, &req.params)?;
    let a = load_assessment(&store, owner, &req.params)?;
    let settings = config::logic_settings(conn)?;
    let summary = EntryManager::new(&store, owner, settings).create_entries_for_assessment(&a)?;
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessments.create" => handle_assessments_create(state, req),
        "assessments.update" => handle_assessments_update(state, req),
        "assessments.get" => handle_assessments_get(state, req),
        "assessments.list" => handle_assessments_list(state, req),
        "assessments.delete" => handle_assessments_delete(state, req),
        "assessments.recalculate" => handle_assessments_recalculate(state, req),
        "assessments.createEntries" => handle_assessments_create_entries(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
