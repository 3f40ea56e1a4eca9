//! Creation and recomputation of score entries.
//!
//! Batch operations walk the students of a class one at a time and fold the
//! results into a summary; one student's failure is recorded and the batch
//! carries on.

use crate::config::{LogicSettings, RecomputePolicy};
use crate::error::{GradeError, GradeResult};
use crate::logic;
use crate::model::{Assessment, ScoreEntry};
use crate::store::GradebookStore;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFailure {
    pub student_id: String,
    pub code: String,
    pub message: String,
}

impl EntryFailure {
    fn new(student_id: &str, e: &GradeError) -> Self {
        Self {
            student_id: student_id.to_string(),
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: Vec<EntryFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecalcSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: Vec<EntryFailure>,
}

/// How the stored score of a saved entry was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Manual(i64),
    Computed(i64),
    ComputationFailed {
        error: GradeError,
        previous: Option<i64>,
    },
}

impl SaveOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            SaveOutcome::Manual(v) => json!({ "kind": "manual", "score": v }),
            SaveOutcome::Computed(v) => json!({ "kind": "computed", "score": v }),
            SaveOutcome::ComputationFailed { error, previous } => json!({
                "kind": "computationFailed",
                "previous": previous,
                "warning": { "code": error.code(), "message": error.to_string() }
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedEntry {
    pub entry: ScoreEntry,
    pub outcome: SaveOutcome,
}

pub fn check_range(score: i64, total_score: i64) -> GradeResult<i64> {
    if (0..=total_score).contains(&score) {
        Ok(score)
    } else {
        Err(GradeError::ScoreOutOfRange { score, total_score })
    }
}

pub struct EntryManager<'s> {
    store: &'s dyn GradebookStore,
    owner: &'s str,
    settings: LogicSettings,
}

impl<'s> EntryManager<'s> {
    pub fn new(store: &'s dyn GradebookStore, owner: &'s str, settings: LogicSettings) -> Self {
        Self {
            store,
            owner,
            settings,
        }
    }

    fn compute(&self, student_id: &str, assessment: &Assessment) -> GradeResult<i64> {
        let value = logic::evaluate_for_student(
            self.store,
            self.owner,
            student_id,
            assessment,
            self.settings.max_reference_depth,
        )?;
        check_range(value, assessment.total_score)
    }

    /// One entry per student of the class that does not have one yet.
    pub fn create_entries_for_assessment(
        &self,
        assessment: &Assessment,
    ) -> GradeResult<CreateSummary> {
        let students = self.store.find_students(self.owner, &assessment.class_id)?;
        let mut summary = CreateSummary::default();
        for student in &students {
            let existing = self
                .store
                .find_score_entry(self.owner, &student.id, &assessment.id);
            if let Ok(Some(_)) = existing {
                summary.skipped += 1;
                continue;
            }
            let score = existing.and_then(|_| {
                if assessment.has_logic() {
                    self.compute(&student.id, assessment)
                } else {
                    Ok(0)
                }
            });
            let inserted = score.and_then(|score| {
                self.store
                    .insert_score_entry(self.owner, &student.id, &assessment.id, score)
            });
            match inserted {
                Ok(_) => summary.created += 1,
                Err(e) => {
                    warn!(
                        assessment = %assessment.label(),
                        student = %student.name,
                        code = e.code(),
                        "entry creation failed: {}",
                        e
                    );
                    summary.failed.push(EntryFailure::new(&student.id, &e));
                }
            }
        }
        info!(
            assessment = %assessment.label(),
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "created score entries"
        );
        Ok(summary)
    }

    /// Re-evaluates logic for every existing entry of `assessment`.
    pub fn recalculate_assessment(&self, assessment: &Assessment) -> GradeResult<RecalcSummary> {
        if !assessment.has_logic() {
            return Ok(RecalcSummary::default());
        }
        let entries = self
            .store
            .find_score_entries(self.owner, std::slice::from_ref(&assessment.id))?;
        let summary = entries.iter().fold(RecalcSummary::default(), |mut acc, entry| {
            let result = self.compute(&entry.student_id, assessment).and_then(|score| {
                if score == entry.score {
                    Ok(false)
                } else {
                    self.store
                        .update_score_entry_score(self.owner, &entry.id, score)
                        .map(|_| true)
                }
            });
            match result {
                Ok(true) => acc.updated += 1,
                Ok(false) => acc.unchanged += 1,
                Err(e) => {
                    warn!(
                        assessment = %assessment.label(),
                        student_id = %entry.student_id,
                        code = e.code(),
                        "recalculation failed: {}",
                        e
                    );
                    acc.failed.push(EntryFailure::new(&entry.student_id, &e));
                }
            }
            acc
        });
        info!(
            assessment = %assessment.label(),
            updated = summary.updated,
            unchanged = summary.unchanged,
            failed = summary.failed.len(),
            "recalculated score entries"
        );
        Ok(summary)
    }

    /// Creates or updates one entry. Logic, when present, overrides `manual`.
    pub fn save_score_entry(
        &self,
        student_id: &str,
        assessment_id: &str,
        manual: Option<i64>,
        policy: RecomputePolicy,
    ) -> GradeResult<SavedEntry> {
        let assessment = self
            .store
            .find_assessment(self.owner, assessment_id)?
            .ok_or_else(|| GradeError::AssessmentNotFound(assessment_id.to_string()))?;
        let student = self
            .store
            .find_student(self.owner, student_id)?
            .ok_or_else(|| GradeError::NotFound("student".into()))?;
        if student.class_id != assessment.class_id {
            return Err(GradeError::BadParams(
                "student is not in the assessment's class".into(),
            ));
        }
        let existing = self
            .store
            .find_score_entry(self.owner, student_id, assessment_id)?;

        let (score, outcome) = if assessment.has_logic() {
            match self.compute(student_id, &assessment) {
                Ok(v) => (v, SaveOutcome::Computed(v)),
                Err(e) if policy == RecomputePolicy::Reject => return Err(e),
                Err(e) => {
                    let previous = existing.as_ref().map(|en| en.score);
                    let fallback = match previous {
                        Some(p) => p,
                        None => match manual {
                            Some(m) => check_range(m, assessment.total_score)?,
                            None => 0,
                        },
                    };
                    warn!(
                        assessment = %assessment.label(),
                        student = %student.name,
                        code = e.code(),
                        "keeping previous score after failed computation: {}",
                        e
                    );
                    (
                        fallback,
                        SaveOutcome::ComputationFailed { error: e, previous },
                    )
                }
            }
        } else {
            let m = manual.ok_or_else(|| GradeError::BadParams("missing score".into()))?;
            let v = check_range(m, assessment.total_score)?;
            (v, SaveOutcome::Manual(v))
        };

        let entry = match existing {
            Some(mut en) => {
                if en.score != score {
                    self.store
                        .update_score_entry_score(self.owner, &en.id, score)?;
                    en.score = score;
                }
                en
            }
            None => self
                .store
                .insert_score_entry(self.owner, student_id, assessment_id, score)?,
        };
        Ok(SavedEntry { entry, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::model::{AssessmentKind, Term};

    fn manager<'a>(store: &'a dyn GradebookStore, f: &'a Fixture) -> EntryManager<'a> {
        EntryManager::new(store, &f.owner, LogicSettings::default())
    }

    #[test]
    fn creates_one_entry_per_student_and_is_idempotent() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let bayo = f.student("Bayo");
        let t1 = f.test(1, None);
        let t2 = f.test(2, None);
        f.score(&ada, &t1, 40);
        f.score(&ada, &t2, 35);
        f.score(&bayo, &t1, 20);
        f.score(&bayo, &t2, 10);
        let total = f.test(3, Some("@1 + @2"));

        let store = f.store();
        let m = manager(&store, &f);
        let first = m.create_entries_for_assessment(&total).expect("create");
        assert_eq!(first.created, 2);
        assert!(first.failed.is_empty());
        assert_eq!(f.stored_score(&ada, &total), Some(75));
        assert_eq!(f.stored_score(&bayo, &total), Some(30));

        let second = m.create_entries_for_assessment(&total).expect("create again");
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 2);
    }

    #[test]
    fn plain_assessment_gets_zero_scores() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t1 = f.test(1, None);
        let store = f.store();
        let summary = manager(&store, &f)
            .create_entries_for_assessment(&t1)
            .expect("create");
        assert_eq!(summary.created, 1);
        assert_eq!(f.stored_score(&ada, &t1), Some(0));
    }

    #[test]
    fn lookup_failures_are_collected_per_student() {
        let f = Fixture::new();
        f.student("Ada");
        f.student("Bayo");
        let t1 = f.test(1, None);
        f.conn
            .execute("DROP TABLE score_entries", [])
            .expect("drop entries");

        let store = f.store();
        let summary = manager(&store, &f)
            .create_entries_for_assessment(&t1)
            .expect("batch completes");
        assert_eq!(summary.created, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.failed.iter().all(|e| e.code == "db_query_failed"));
    }

    #[test]
    fn failures_are_collected_without_aborting() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let bayo = f.student("Bayo");
        let chi = f.student("Chi");
        let t1 = f.test(1, None);
        f.score(&ada, &t1, 50);
        f.score(&chi, &t1, 90);
        let doubled = f.assessment(Term::First, AssessmentKind::Notes, 1, 100, Some("@Test:1 * 2"));

        let store = f.store();
        let summary = manager(&store, &f)
            .create_entries_for_assessment(&doubled)
            .expect("create");
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failed.len(), 2);
        let codes: Vec<(&str, &str)> = summary
            .failed
            .iter()
            .map(|x| (x.student_id.as_str(), x.code.as_str()))
            .collect();
        assert!(codes.contains(&(bayo.id.as_str(), "reference_not_found")));
        assert!(codes.contains(&(chi.id.as_str(), "score_out_of_range")));
        assert_eq!(f.stored_score(&ada, &doubled), Some(100));
        assert_eq!(f.stored_score(&chi, &doubled), None);
    }

    #[test]
    fn recalculate_picks_up_edited_logic() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t1 = f.test(1, None);
        f.score(&ada, &t1, 30);
        let mut derived = f.test(2, Some("@1"));
        let store = f.store();
        let m = manager(&store, &f);
        m.create_entries_for_assessment(&derived).expect("create");
        assert_eq!(f.stored_score(&ada, &derived), Some(30));

        derived.logic = Some("@1 + 5".into());
        store.update_assessment(&f.owner, &derived).expect("update");
        assert_eq!(f.stored_score(&ada, &derived), Some(30));

        let summary = m.recalculate_assessment(&derived).expect("recalc");
        assert_eq!(summary.updated, 1);
        assert_eq!(f.stored_score(&ada, &derived), Some(35));

        let again = m.recalculate_assessment(&derived).expect("recalc");
        assert_eq!(again.unchanged, 1);
        assert_eq!(again.updated, 0);
    }

    #[test]
    fn recalculate_without_logic_is_a_no_op() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t1 = f.test(1, None);
        f.score(&ada, &t1, 30);
        let store = f.store();
        let summary = manager(&store, &f).recalculate_assessment(&t1).expect("recalc");
        assert_eq!(summary, RecalcSummary::default());
    }

    #[test]
    fn manual_save_enforces_range() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t1 = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        let store = f.store();
        let m = manager(&store, &f);

        let saved = m
            .save_score_entry(&ada.id, &t1.id, Some(20), RecomputePolicy::KeepPrevious)
            .expect("save");
        assert_eq!(saved.outcome, SaveOutcome::Manual(20));

        for bad in [21, -1] {
            let e = m
                .save_score_entry(&ada.id, &t1.id, Some(bad), RecomputePolicy::KeepPrevious)
                .expect_err("out of range");
            assert_eq!(
                e,
                GradeError::ScoreOutOfRange {
                    score: bad,
                    total_score: 20
                }
            );
        }
        assert_eq!(f.stored_score(&ada, &t1), Some(20));
    }

    #[test]
    fn computed_value_overrides_manual_score() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t1 = f.test(1, None);
        f.score(&ada, &t1, 44);
        let t2 = f.test(2, Some("@1 / 2"));
        let store = f.store();
        let saved = manager(&store, &f)
            .save_score_entry(&ada.id, &t2.id, Some(99), RecomputePolicy::KeepPrevious)
            .expect("save");
        assert_eq!(saved.outcome, SaveOutcome::Computed(22));
        assert_eq!(saved.entry.score, 22);
    }

    #[test]
    fn failed_computation_follows_policy() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t2 = f.test(2, Some("@1 + 1"));
        f.score(&ada, &t2, 12);
        let store = f.store();
        let m = manager(&store, &f);

        let saved = m
            .save_score_entry(&ada.id, &t2.id, None, RecomputePolicy::KeepPrevious)
            .expect("save");
        match saved.outcome {
            SaveOutcome::ComputationFailed { error, previous } => {
                assert_eq!(error.code(), "reference_not_found");
                assert_eq!(previous, Some(12));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(saved.entry.score, 12);

        let e = m
            .save_score_entry(&ada.id, &t2.id, None, RecomputePolicy::Reject)
            .expect_err("reject");
        assert_eq!(e.code(), "reference_not_found");
    }

    #[test]
    fn student_from_another_class_is_rejected() {
        let f = Fixture::new();
        let store = f.store();
        let other = store.create_class_group(&f.owner, "JSS1", "B").expect("class");
        let stranger = f.student_in(&other, "Dami");
        let t1 = f.test(1, None);
        let e = manager(&store, &f)
            .save_score_entry(&stranger.id, &t1.id, Some(1), RecomputePolicy::KeepPrevious)
            .expect_err("wrong class");
        assert_eq!(e.code(), "bad_params");
    }
}
