use crate::config::{self, SortOrder};
use crate::ipc::helpers::{
    optional_bool, optional_str, require_db, require_owner, required_str, respond, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssessmentKind, Term};
use crate::report::{self, ReportRequest, Sheet, SummaryRequest, TabularOutput};
use crate::store::SqliteStore;
use serde_json::{json, Value};
use std::path::PathBuf;

fn parse_term(params: &Value) -> Result<Option<Term>, HandlerErr> {
    match optional_str(params, "term") {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("none") => Ok(None),
        Some(s) => Term::parse(s)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown term: {}", s))),
    }
}

fn parse_sort(params: &Value, default: SortOrder) -> SortOrder {
    optional_str(params, "sortOrder")
        .map(SortOrder::parse)
        .unwrap_or(default)
}

fn build(state: &AppState, req: &Request) -> Result<TabularOutput, HandlerErr> {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let settings = config::report_settings(conn)?;

    let request = ReportRequest {
        subject_assignment_id: required_str(p, "subjectAssignmentId")?,
        class_name: required_str(p, "className")?,
        batch: optional_str(p, "batch"),
        term: parse_term(p)?,
        sort: parse_sort(p, settings.default_sort_order),
        include_hidden: optional_bool(p, "includeHidden")?
            .unwrap_or(settings.include_hidden_assessments),
    };
    Ok(report::build_report(&store, owner, &request)?)
}

fn handle_reports_build(state: &mut AppState, req: &Request) -> HandlerResult {
    let out = build(state, req)?;
    Ok(json!(out))
}

fn handle_reports_sheet(state: &mut AppState, req: &Request) -> HandlerResult {
    let out = build(state, req)?;
    Ok(json!(Sheet::from_report(&out)))
}

fn handle_reports_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let sheet = Sheet::from_report(&build(state, req)?);

    let io_err = |e: std::io::Error| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": out_path.to_string_lossy() })),
    };
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(&out_path, sheet.to_csv()).map_err(io_err)?;
    tracing::info!(path = %out_path.display(), rows = sheet.rows.len(), "report exported");

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "rowsExported": sheet.rows.len()
    }))
}

fn handle_reports_student_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let p = &req.params;
    let owner = require_owner(&store, p)?;
    let settings = config::report_settings(conn)?;

    let kind = match optional_str(p, "type") {
        Some(s) => Some(
            AssessmentKind::parse(s)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown assessment type: {}", s)))?,
        ),
        None => None,
    };
    let request = SummaryRequest {
        class_name: required_str(p, "className")?,
        batch: optional_str(p, "batch"),
        subject_id: optional_str(p, "subjectId").filter(|s| !s.eq_ignore_ascii_case("all")),
        term: parse_term(p)?,
        kind,
        sort: parse_sort(p, settings.default_sort_order),
    };
    let rows = report::student_summary(&store, owner, &request)?;
    Ok(json!({ "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.build" => handle_reports_build(state, req),
        "reports.sheet" => handle_reports_sheet(state, req),
        "reports.exportCsv" => handle_reports_export_csv(state, req),
        "reports.studentSummary" => handle_reports_student_summary(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
