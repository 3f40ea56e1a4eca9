use crate::config::{self, RecomputePolicy};
use crate::ipc::helpers::{
    optional_i64, optional_str, require_db, require_owner, required_str, respond, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle::EntryManager;
use crate::model::{ScoreEntry, Student};
use crate::store::{GradebookStore, SqliteStore};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::assessments::load_assessment;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScoreOp {
    Eq,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoreFilter {
    op: ScoreOp,
    score: i64,
}

impl ScoreFilter {
    fn parse(v: &Value) -> Result<Option<Self>, HandlerErr> {
        if v.is_null() {
            return Ok(None);
        }
        let op = match v.get("operator").and_then(|o| o.as_str()).map(str::trim) {
            Some("=") => ScoreOp::Eq,
            Some(">") => ScoreOp::Gt,
            Some("<") => ScoreOp::Lt,
            _ => return Err(HandlerErr::bad_params("filter.operator must be one of: =, >, <")),
        };
        let score = v
            .get("score")
            .and_then(|s| s.as_i64())
            .ok_or_else(|| HandlerErr::bad_params("filter.score must be an integer"))?;
        Ok(Some(Self { op, score }))
    }

    fn matches(self, score: i64) -> bool {
        match self.op {
            ScoreOp::Eq => score == self.score,
            ScoreOp::Gt => score > self.score,
            ScoreOp::Lt => score < self.score,
        }
    }
}

fn filter_entries<'a>(
    rows: Vec<(ScoreEntry, &'a Student)>,
    filter: Option<ScoreFilter>,
    sort: Option<&str>,
) -> Vec<(ScoreEntry, &'a Student)> {
    let mut rows: Vec<_> = rows
        .into_iter()
        .filter(|(e, _)| filter.map(|f| f.matches(e.score)).unwrap_or(true))
        .collect();
    match sort {
        Some("alpha") => rows.sort_by(|a, b| a.1.name.cmp(&b.1.name)),
        Some("score") => rows.sort_by(|a, b| b.0.score.cmp(&a.0.score)),
        _ => {}
    }
    rows
}

fn handle_entries_save(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let student_id = required_str(p, "studentId")?;
    let assessment_id = required_str(p, "assessmentId")?;
    let manual = optional_i64(p, "score")?;

    let settings = config::logic_settings(conn)?;
    let policy = match optional_str(p, "policy") {
        Some(s) => RecomputePolicy::parse(s).ok_or_else(|| {
            HandlerErr::bad_params("policy must be one of: keep_previous, reject")
        })?,
        None => settings.recompute_failure_policy,
    };

    let saved = EntryManager::new(&store, owner, settings).save_score_entry(
        student_id,
        assessment_id,
        manual,
        policy,
    )?;
    Ok(json!({
        "entry": saved.entry,
        "outcome": saved.outcome.to_json()
    }))
}

fn handle_entries_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let a = load_assessment(&store, owner, p)?;
    let filter = ScoreFilter::parse(p.get("filter").unwrap_or(&Value::Null))?;
    let sort = optional_str(p, "sort");
    if let Some(s) = sort {
        if s != "alpha" && s != "score" {
            return Err(HandlerErr::bad_params("sort must be one of: alpha, score"));
        }
    }

    let students = store.find_students(owner, &a.class_id)?;
    let by_id: HashMap<&str, &Student> = students.iter().map(|s| (s.id.as_str(), s)).collect();
    let entries = store.find_score_entries(owner, std::slice::from_ref(&a.id))?;
    let rows: Vec<(ScoreEntry, &Student)> = entries
        .into_iter()
        .filter_map(|e| by_id.get(e.student_id.as_str()).map(|s| (e, *s)))
        .collect();

    let out: Vec<Value> = filter_entries(rows, filter, sort)
        .into_iter()
        .map(|(e, s)| {
            json!({
                "id": e.id,
                "studentId": e.student_id,
                "studentName": s.name,
                "assessmentId": e.assessment_id,
                "score": e.score,
                "totalScore": a.total_score
            })
        })
        .collect();
    Ok(json!({ "entries": out }))
}

fn handle_entries_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let entry_id = required_str(&req.params, "entryId")?;
    store.delete_score_entry(owner, entry_id)?;
    Ok(json!({ "ok": true }))
}

fn handle_entries_missing_students(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = SqliteStore::new(require_db(state)?);
    let owner = require_owner(&store, &req.params)?;
    let a = load_assessment(&store, owner, &req.params)?;
    let entries = store.find_score_entries(owner, std::slice::from_ref(&a.id))?;
    let missing: Vec<Student> = store
        .find_students(owner, &a.class_id)?
        .into_iter()
        .filter(|s| !entries.iter().any(|e| e.student_id == s.id))
        .collect();
    Ok(json!({ "students": missing }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "entries.save" => handle_entries_save(state, req),
        "entries.list" => handle_entries_list(state, req),
        "entries.delete" => handle_entries_delete(state, req),
        "entries.missingStudents" => handle_entries_missing_students(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
