use serde_json::json;
use thiserror::Error;

pub type GradeResult<T> = Result<T, GradeError>;

/// Errors raised by the gradebook core. `code()` is the stable wire code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    #[error("reference {token} not found: {reason}")]
    ReferenceNotFound { token: String, reason: String },

    #[error("reference {token} matches {matches} assessments")]
    AmbiguousReference { token: String, matches: usize },

    #[error("cyclic reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("invalid logic expression: {0}")]
    InvalidLogicExpression(String),

    #[error("score {score} out of range 0..={total_score}")]
    ScoreOutOfRange { score: i64, total_score: i64 },

    #[error("assessment not found: {0}")]
    AssessmentNotFound(String),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GradeError {
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::ReferenceNotFound { .. } => "reference_not_found",
            GradeError::AmbiguousReference { .. } => "ambiguous_reference",
            GradeError::CyclicReference { .. } => "cyclic_reference",
            GradeError::InvalidLogicExpression(_) => "invalid_logic",
            GradeError::ScoreOutOfRange { .. } => "score_out_of_range",
            GradeError::AssessmentNotFound(_) => "assessment_not_found",
            GradeError::ClassNotFound(_) => "class_not_found",
            GradeError::NotFound(_) => "not_found",
            GradeError::BadParams(_) => "bad_params",
            GradeError::Conflict(_) => "conflict",
            GradeError::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GradeError::ReferenceNotFound { token, .. } => Some(json!({ "token": token })),
            GradeError::AmbiguousReference { token, matches } => {
                Some(json!({ "token": token, "matches": matches }))
            }
            GradeError::CyclicReference { chain } => Some(json!({ "chain": chain })),
            GradeError::ScoreOutOfRange { score, total_score } => {
                Some(json!({ "score": score, "totalScore": total_score }))
            }
            _ => None,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        GradeError::InvalidLogicExpression(msg.into())
    }
}

impl From<rusqlite::Error> for GradeError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(f, msg) = &e {
            if f.code == rusqlite::ErrorCode::ConstraintViolation {
                return GradeError::Conflict(
                    msg.clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                );
            }
        }
        GradeError::Storage(e.to_string())
    }
}
