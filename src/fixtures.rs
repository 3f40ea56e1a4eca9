//! In-memory gradebook used by unit tests.

use crate::db;
use crate::model::{
    Assessment, AssessmentKind, ClassGroup, ScoreEntry, Student, Subject, SubjectAssignment, Term,
};
use crate::store::{GradebookStore, SqliteStore};
use rusqlite::Connection;

pub struct Fixture {
    pub conn: Connection,
    pub owner: String,
    pub class: ClassGroup,
    pub subject: Subject,
    pub assignment: SubjectAssignment,
}

impl Fixture {
    pub fn new() -> Self {
        let conn = db::open_in_memory().expect("open db");
        let store = SqliteStore::new(&conn);
        let owner = store.create_owner("Mrs Ade").expect("owner");
        let class = store.create_class_group(&owner, "JSS1", "A").expect("class");
        let subject = store.create_subject(&owner, "Mathematics").expect("subject");
        let assignment = store
            .assign_subject(&owner, &subject.id, &class.id)
            .expect("assign");
        Self {
            conn,
            owner,
            class,
            subject,
            assignment,
        }
    }

    pub fn store(&self) -> SqliteStore<'_> {
        SqliteStore::new(&self.conn)
    }

    pub fn student(&self, name: &str) -> Student {
        self.store()
            .create_student(&self.owner, &self.class.id, name)
            .expect("student")
    }

    pub fn student_in(&self, class: &ClassGroup, name: &str) -> Student {
        self.store()
            .create_student(&self.owner, &class.id, name)
            .expect("student")
    }

    pub fn draft(
        &self,
        term: Term,
        kind: AssessmentKind,
        number: i64,
        total_score: i64,
        logic: Option<&str>,
    ) -> Assessment {
        Assessment {
            id: String::new(),
            term,
            subject_assignment_id: self.assignment.id.clone(),
            subject_id: self.subject.id.clone(),
            class_id: self.class.id.clone(),
            kind,
            number,
            total_score,
            logic: logic.map(str::to_string),
            auto_create_entries: false,
            show_in_report: true,
        }
    }

    pub fn assessment(
        &self,
        term: Term,
        kind: AssessmentKind,
        number: i64,
        total_score: i64,
        logic: Option<&str>,
    ) -> Assessment {
        let draft = self.draft(term, kind, number, total_score, logic);
        self.store()
            .insert_assessment(&self.owner, &draft)
            .expect("assessment")
    }

    pub fn test(&self, number: i64, logic: Option<&str>) -> Assessment {
        self.assessment(Term::First, AssessmentKind::Test, number, 100, logic)
    }

    pub fn score(&self, student: &Student, assessment: &Assessment, score: i64) -> ScoreEntry {
        self.store()
            .insert_score_entry(&self.owner, &student.id, &assessment.id, score)
            .expect("score entry")
    }

    pub fn stored_score(&self, student: &Student, assessment: &Assessment) -> Option<i64> {
        self.store()
            .find_score_entry(&self.owner, &student.id, &assessment.id)
            .expect("find entry")
            .map(|e| e.score)
    }
}
