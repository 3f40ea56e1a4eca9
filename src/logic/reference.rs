//! Resolves `@...` references against the store for one student.
//!
//! The resolver keeps the chain of assessments currently being evaluated.
//! A reference to an assessment already on that chain, or a chain longer
//! than the configured depth, fails with `CyclicReference` instead of
//! recursing further.

use super::eval::{evaluate_tree, round_score, ReferenceValues};
use super::parser::{parse, Reference};
use crate::error::{GradeError, GradeResult};
use crate::model::{Assessment, AssessmentFilter};
use crate::store::GradebookStore;

pub struct StoreResolver<'s> {
    store: &'s dyn GradebookStore,
    owner: &'s str,
    student_id: &'s str,
    chain: Vec<Assessment>,
    max_depth: usize,
}

impl<'s> StoreResolver<'s> {
    /// `root` is the assessment whose logic is being evaluated.
    pub fn new(
        store: &'s dyn GradebookStore,
        owner: &'s str,
        student_id: &'s str,
        root: &Assessment,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            owner,
            student_id,
            chain: vec![root.clone()],
            max_depth: max_depth.max(1),
        }
    }

    fn context(&self) -> GradeResult<&Assessment> {
        self.chain
            .last()
            .ok_or_else(|| GradeError::invalid("reference evaluated without an assessment"))
    }

    fn chain_with(&self, target: &Assessment) -> Vec<String> {
        self.chain
            .iter()
            .map(Assessment::label)
            .chain(std::iter::once(target.label()))
            .collect()
    }

    fn filter_for(&self, reference: &Reference) -> GradeResult<AssessmentFilter> {
        let ctx = self.context()?;
        let mut filter = AssessmentFilter {
            term: Some(reference.term.unwrap_or(ctx.term)),
            kind: Some(reference.kind.unwrap_or(ctx.kind)),
            number: Some(reference.number),
            class_ids: Some(vec![ctx.class_id.clone()]),
            ..AssessmentFilter::default()
        };

        match &reference.subject {
            None => filter.subject_assignment_id = Some(ctx.subject_assignment_id.clone()),
            Some(name) => {
                let subject = match self.store.find_subject_by_name(self.owner, name)? {
                    Some(s) => Some(s),
                    None if name.contains('_') => self
                        .store
                        .find_subject_by_name(self.owner, &name.replace('_', " "))?,
                    None => None,
                };
                let subject = subject.ok_or_else(|| GradeError::ReferenceNotFound {
                    token: reference.to_string(),
                    reason: format!("no subject named '{}'", name),
                })?;
                filter.subject_id = Some(subject.id);
            }
        }
        Ok(filter)
    }

    /// The single assessment a reference names.
    pub fn target(&self, reference: &Reference) -> GradeResult<Assessment> {
        let filter = self.filter_for(reference)?;
        let mut found = self.store.find_assessments(self.owner, &filter)?;
        match found.len() {
            0 => Err(GradeError::ReferenceNotFound {
                token: reference.to_string(),
                reason: "no matching assessment".into(),
            }),
            1 => Ok(found.remove(0)),
            n => Err(GradeError::AmbiguousReference {
                token: reference.to_string(),
                matches: n,
            }),
        }
    }

    fn evaluate_nested(&mut self, target: Assessment, logic: &str) -> GradeResult<f64> {
        if self.chain.len() >= self.max_depth {
            return Err(GradeError::CyclicReference {
                chain: self.chain_with(&target),
            });
        }
        let expr = parse(logic)?;
        self.chain.push(target);
        let value = evaluate_tree(&expr, self);
        self.chain.pop();
        Ok(round_score(value?) as f64)
    }
}

impl ReferenceValues for StoreResolver<'_> {
    fn value_of(&mut self, reference: &Reference) -> GradeResult<f64> {
        let target = self.target(reference)?;
        if self.chain.iter().any(|a| a.id == target.id) {
            return Err(GradeError::CyclicReference {
                chain: self.chain_with(&target),
            });
        }

        let entry = self
            .store
            .find_score_entry(self.owner, self.student_id, &target.id)?
            .ok_or_else(|| GradeError::ReferenceNotFound {
                token: reference.to_string(),
                reason: format!("student has no score for {}", target.label()),
            })?;

        match target.logic.clone().filter(|l| !l.trim().is_empty()) {
            Some(logic) => self.evaluate_nested(target, &logic),
            None => Ok(entry.score as f64),
        }
    }
}
