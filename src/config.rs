//! Process and workspace configuration.
//!
//! Workspace settings live in the `settings` table as one JSON object per
//! section. Reads start from the section defaults and apply the stored
//! object on top; updates are validated field by field before being saved.

use crate::db;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

pub const LOG_ENV: &str = "GRADEBOOKD_LOG";
pub const WORKSPACE_ENV: &str = "GRADEBOOKD_WORKSPACE";
pub const DEFAULT_LOG_FILTER: &str = "gradebookd=info";

/// Environment-level settings read once at start-up.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub log_filter: Option<String>,
    pub workspace: Option<PathBuf>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            log_filter: non_empty(LOG_ENV).or_else(|| non_empty("RUST_LOG")),
            workspace: non_empty(WORKSPACE_ENV).map(PathBuf::from),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Logic,
    Reports,
}

pub const SECTIONS: [SetupSection; 2] = [SetupSection::Logic, SetupSection::Reports];

impl SetupSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "logic" => Some(Self::Logic),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Logic => "logic",
            Self::Reports => "reports",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Logic => "setup.logic",
            Self::Reports => "setup.reports",
        }
    }
}

/// What a save does when an assessment's logic cannot be computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecomputePolicy {
    KeepPrevious,
    Reject,
}

impl RecomputePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep_previous" => Some(Self::KeepPrevious),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepPrevious => "keep_previous",
            Self::Reject => "reject",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than `desc` sorts by name.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogicSettings {
    pub max_reference_depth: usize,
    pub recompute_failure_policy: RecomputePolicy,
}

impl Default for LogicSettings {
    fn default() -> Self {
        Self {
            max_reference_depth: crate::logic::DEFAULT_MAX_REFERENCE_DEPTH,
            recompute_failure_policy: RecomputePolicy::KeepPrevious,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportSettings {
    pub default_sort_order: SortOrder,
    pub include_hidden_assessments: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            default_sort_order: SortOrder::Asc,
            include_hidden_assessments: false,
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Logic => {
            let d = LogicSettings::default();
            json!({
                "maxReferenceDepth": d.max_reference_depth,
                "recomputeFailurePolicy": d.recompute_failure_policy.as_str()
            })
        }
        SetupSection::Reports => {
            let d = ReportSettings::default();
            json!({
                "defaultSortOrder": d.default_sort_order.as_str(),
                "includeHiddenAssessments": d.include_hidden_assessments
            })
        }
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_choice(v: &Value, key: &str, choices: &[&str]) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim()
        .to_ascii_lowercase();
    if !choices.contains(&s.as_str()) {
        return Err(format!("{} must be one of: {}", key, choices.join(", ")));
    }
    Ok(s)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Logic => match k.as_str() {
                "maxReferenceDepth" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 64)?));
                }
                "recomputeFailurePolicy" => {
                    let p = parse_choice(v, k, &["keep_previous", "reject"])?;
                    obj.insert(k.clone(), Value::String(p));
                }
                _ => return Err(format!("unknown logic field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "defaultSortOrder" => {
                    let s = parse_choice(v, k, &["asc", "desc"])?;
                    obj.insert(k.clone(), Value::String(s));
                }
                "includeHiddenAssessments" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values fall back to defaults.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), %msg, "ignoring stored setup values");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

/// Validates `patch` against the stored section and saves the result.
pub fn update_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, section.key(), &current)?;
    Ok(Ok(current))
}

pub fn logic_settings(conn: &rusqlite::Connection) -> anyhow::Result<LogicSettings> {
    let v = load_section(conn, SetupSection::Logic)?;
    let d = LogicSettings::default();
    Ok(LogicSettings {
        max_reference_depth: v
            .get("maxReferenceDepth")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(d.max_reference_depth),
        recompute_failure_policy: v
            .get("recomputeFailurePolicy")
            .and_then(|v| v.as_str())
            .and_then(RecomputePolicy::parse)
            .unwrap_or(d.recompute_failure_policy),
    })
}

pub fn report_settings(conn: &rusqlite::Connection) -> anyhow::Result<ReportSettings> {
    let v = load_section(conn, SetupSection::Reports)?;
    Ok(ReportSettings {
        default_sort_order: v
            .get("defaultSortOrder")
            .and_then(|v| v.as_str())
            .map(SortOrder::parse)
            .unwrap_or(SortOrder::Asc),
        include_hidden_assessments: v
            .get("includeHiddenAssessments")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn defaults_apply_without_stored_values() {
        let conn = db::open_in_memory().expect("db");
        assert_eq!(logic_settings(&conn).expect("logic"), LogicSettings::default());
        assert_eq!(report_settings(&conn).expect("reports"), ReportSettings::default());
    }

    #[test]
    fn update_validates_and_persists() {
        let conn = db::open_in_memory().expect("db");
        let saved = update_section(
            &conn,
            SetupSection::Logic,
            &patch(json!({ "maxReferenceDepth": 4, "recomputeFailurePolicy": "REJECT" })),
        )
        .expect("update")
        .expect("valid patch");
        assert_eq!(saved["recomputeFailurePolicy"], "reject");
        let logic = logic_settings(&conn).expect("logic");
        assert_eq!(logic.max_reference_depth, 4);
        assert_eq!(logic.recompute_failure_policy, RecomputePolicy::Reject);
    }

    #[test]
    fn update_rejects_bad_fields() {
        let conn = db::open_in_memory().expect("db");
        for bad in [
            json!({ "maxReferenceDepth": 0 }),
            json!({ "maxReferenceDepth": 65 }),
            json!({ "recomputeFailurePolicy": "clamp" }),
            json!({ "unknown": 1 }),
        ] {
            let res = update_section(&conn, SetupSection::Logic, &patch(bad)).expect("update");
            assert!(res.is_err());
        }
        let res = update_section(
            &conn,
            SetupSection::Reports,
            &patch(json!({ "includeHiddenAssessments": "yes" })),
        )
        .expect("update");
        assert!(res.is_err());
        assert_eq!(logic_settings(&conn).expect("logic"), LogicSettings::default());
    }

    #[test]
    fn sort_order_parse_defaults_to_ascending() {
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("name"), SortOrder::Asc);
    }
}
