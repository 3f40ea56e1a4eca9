use crate::config;
use crate::error::GradeError;
use crate::ipc::helpers::{
    optional_str, require_db, require_owner, required_str, respond, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::logic;
use crate::store::{GradebookStore, SqliteStore};
use serde_json::json;

fn handle_logic_validate(_state: &mut AppState, req: &Request) -> HandlerResult {
    let expression = req
        .params
        .get("expression")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing expression"))?;
    match logic::validate(expression) {
        Ok(expr) => {
            let refs: Vec<String> = expr.references().iter().map(|r| r.to_string()).collect();
            Ok(json!({ "valid": true, "references": refs }))
        }
        Err(e) => Ok(json!({
            "valid": false,
            "error": { "code": e.code(), "message": e.to_string() }
        })),
    }
}

/// Computes a score without saving it; `logic` may override the stored one.
fn handle_logic_evaluate(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let student_id = required_str(p, "studentId")?;
    let assessment_id = required_str(p, "assessmentId")?;

    let mut assessment = store
        .find_assessment(owner, assessment_id)?
        .ok_or_else(|| GradeError::AssessmentNotFound(assessment_id.to_string()))?;
    if store.find_student(owner, student_id)?.is_none() {
        return Err(GradeError::NotFound("student".into()).into());
    }
    if let Some(logic) = optional_str(p, "logic") {
        assessment.logic = Some(logic.to_string());
    }

    let settings = config::logic_settings(conn)?;
    let score = logic::evaluate_for_student(
        &store,
        owner,
        student_id,
        &assessment,
        settings.max_reference_depth,
    )?;
    Ok(json!({
        "score": score,
        "totalScore": assessment.total_score,
        "inRange": (0..=assessment.total_score).contains(&score)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "logic.validate" => handle_logic_validate(state, req),
        "logic.evaluate" => handle_logic_evaluate(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
