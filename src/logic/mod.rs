//! The derived-score expression language.
//!
//! `avg(@Test:1, @Test:2) * 0.3 + @Exam:1 * 0.7` is tokenized, parsed into an
//! [`parser::Expr`] tree and evaluated by walking it. References are
//! resolved through a [`eval::ReferenceValues`] implementation; for stored
//! data that is [`reference::StoreResolver`].

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod reference;

use crate::error::{GradeError, GradeResult};
use crate::model::Assessment;
use crate::store::GradebookStore;

pub use eval::round_to;
pub use parser::{parse, Expr};
pub use reference::StoreResolver;

pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 16;

/// Syntax-only check run before an assessment with logic is stored.
pub fn validate(logic: &str) -> GradeResult<Expr> {
    parse(logic)
}

/// Computes `assessment`'s logic for one student.
pub fn evaluate_for_student(
    store: &dyn GradebookStore,
    owner: &str,
    student_id: &str,
    assessment: &Assessment,
    max_depth: usize,
) -> GradeResult<i64> {
    let logic = assessment
        .logic
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| GradeError::invalid(format!("{} has no logic", assessment.label())))?;
    let mut resolver = StoreResolver::new(store, owner, student_id, assessment, max_depth);
    eval::evaluate(logic, &mut resolver)
}
