//! Data access for the gradebook core.
//!
//! Every read and write takes the owner id explicitly; rows belonging to a
//! different owner are invisible and behave as "not found".

use crate::error::{GradeError, GradeResult};
use crate::model::{
    Assessment, AssessmentFilter, AssessmentKind, ClassGroup, ScoreEntry, Student, Subject,
    SubjectAssignment, Term,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

/// Read access plus the two score writes the lifecycle manager performs.
pub trait GradebookStore {
    fn find_assessment(&self, owner: &str, assessment_id: &str) -> GradeResult<Option<Assessment>>;

    fn find_assessments(&self, owner: &str, filter: &AssessmentFilter)
        -> GradeResult<Vec<Assessment>>;

    fn find_score_entry(
        &self,
        owner: &str,
        student_id: &str,
        assessment_id: &str,
    ) -> GradeResult<Option<ScoreEntry>>;

    fn find_score_entries(&self, owner: &str, assessment_ids: &[String])
        -> GradeResult<Vec<ScoreEntry>>;

    /// Students of one class group, ordered by name.
    fn find_students(&self, owner: &str, class_id: &str) -> GradeResult<Vec<Student>>;

    fn find_student(&self, owner: &str, student_id: &str) -> GradeResult<Option<Student>>;

    fn find_student_by_name(
        &self,
        owner: &str,
        class_id: &str,
        name: &str,
    ) -> GradeResult<Option<Student>>;

    fn find_subject(&self, owner: &str, subject_id: &str) -> GradeResult<Option<Subject>>;

    fn find_subject_by_name(&self, owner: &str, name: &str) -> GradeResult<Option<Subject>>;

    fn find_subject_assignment(
        &self,
        owner: &str,
        assignment_id: &str,
    ) -> GradeResult<Option<SubjectAssignment>>;

    fn find_class_group(&self, owner: &str, class_id: &str) -> GradeResult<Option<ClassGroup>>;

    /// Class groups by exact name, optionally narrowed to one batch.
    fn find_class_groups(
        &self,
        owner: &str,
        name: &str,
        batch: Option<&str>,
    ) -> GradeResult<Vec<ClassGroup>>;

    fn insert_score_entry(
        &self,
        owner: &str,
        student_id: &str,
        assessment_id: &str,
        score: i64,
    ) -> GradeResult<ScoreEntry>;

    fn update_score_entry_score(&self, owner: &str, entry_id: &str, score: i64)
        -> GradeResult<()>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

const ASSESSMENT_COLUMNS: &str = "a.id, a.term, a.subject_assignment_id, sa.subject_id, a.class_id,
     a.kind, a.number, a.total_score, a.logic, a.auto_create_entries, a.show_in_report";

struct AssessmentRow {
    id: String,
    term: String,
    subject_assignment_id: String,
    subject_id: String,
    class_id: String,
    kind: String,
    number: i64,
    total_score: i64,
    logic: Option<String>,
    auto_create_entries: bool,
    show_in_report: bool,
}

fn assessment_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AssessmentRow> {
    Ok(AssessmentRow {
        id: r.get(0)?,
        term: r.get(1)?,
        subject_assignment_id: r.get(2)?,
        subject_id: r.get(3)?,
        class_id: r.get(4)?,
        kind: r.get(5)?,
        number: r.get(6)?,
        total_score: r.get(7)?,
        logic: r.get(8)?,
        auto_create_entries: r.get::<_, i64>(9)? != 0,
        show_in_report: r.get::<_, i64>(10)? != 0,
    })
}

impl AssessmentRow {
    fn into_assessment(self) -> GradeResult<Assessment> {
        let term = Term::parse(&self.term)
            .ok_or_else(|| GradeError::Storage(format!("bad term value: {}", self.term)))?;
        let kind = AssessmentKind::parse(&self.kind)
            .ok_or_else(|| GradeError::Storage(format!("bad assessment kind: {}", self.kind)))?;
        Ok(Assessment {
            id: self.id,
            term,
            subject_assignment_id: self.subject_assignment_id,
            subject_id: self.subject_id,
            class_id: self.class_id,
            kind,
            number: self.number,
            total_score: self.total_score,
            logic: self.logic,
            auto_create_entries: self.auto_create_entries,
            show_in_report: self.show_in_report,
        })
    }
}

fn score_entry_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreEntry> {
    Ok(ScoreEntry {
        id: r.get(0)?,
        student_id: r.get(1)?,
        assessment_id: r.get(2)?,
        score: r.get(3)?,
    })
}

fn student_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        class_id: r.get(2)?,
    })
}

fn class_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ClassGroup> {
    Ok(ClassGroup {
        id: r.get(0)?,
        name: r.get(1)?,
        batch: r.get(2)?,
    })
}

fn now_text() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn owner_exists(&self, owner: &str) -> GradeResult<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM owners WHERE id = ?", [owner], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some())
    }

    pub fn create_owner(&self, name: &str) -> GradeResult<String> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO owners(id, name, created_at) VALUES(?, ?, ?)",
            (&id, name, now_text()),
        )?;
        Ok(id)
    }

    pub fn create_class_group(
        &self,
        owner: &str,
        name: &str,
        batch: &str,
    ) -> GradeResult<ClassGroup> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO classes(id, owner_id, name, batch) VALUES(?, ?, ?, ?)",
            (&id, owner, name, batch),
        )?;
        Ok(ClassGroup {
            id,
            name: name.to_string(),
            batch: batch.to_string(),
        })
    }

    pub fn list_class_groups(&self, owner: &str) -> GradeResult<Vec<ClassGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, batch FROM classes WHERE owner_id = ? ORDER BY name, batch",
        )?;
        let rows = stmt
            .query_map([owner], class_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    pub fn create_student(&self, owner: &str, class_id: &str, name: &str) -> GradeResult<Student> {
        if self.find_class_group(owner, class_id)?.is_none() {
            return Err(GradeError::ClassNotFound(class_id.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO students(id, owner_id, class_id, name) VALUES(?, ?, ?, ?)",
            (&id, owner, class_id, name),
        )?;
        Ok(Student {
            id,
            name: name.to_string(),
            class_id: class_id.to_string(),
        })
    }

    pub fn create_subject(&self, owner: &str, name: &str) -> GradeResult<Subject> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO subjects(id, owner_id, name) VALUES(?, ?, ?)",
            (&id, owner, name),
        )?;
        Ok(Subject {
            id,
            name: name.to_string(),
        })
    }

    pub fn list_subjects(&self, owner: &str) -> GradeResult<Vec<Subject>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM subjects WHERE owner_id = ? ORDER BY name")?;
        let rows = stmt
            .query_map([owner], |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    pub fn assign_subject(
        &self,
        owner: &str,
        subject_id: &str,
        class_id: &str,
    ) -> GradeResult<SubjectAssignment> {
        if self.find_subject(owner, subject_id)?.is_none() {
            return Err(GradeError::NotFound("subject".into()));
        }
        if self.find_class_group(owner, class_id)?.is_none() {
            return Err(GradeError::ClassNotFound(class_id.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO subject_assignments(id, owner_id, subject_id, class_id) VALUES(?, ?, ?, ?)",
            (&id, owner, subject_id, class_id),
        )?;
        Ok(SubjectAssignment {
            id,
            subject_id: subject_id.to_string(),
            class_id: class_id.to_string(),
        })
    }

    pub fn list_subject_assignments(&self, owner: &str) -> GradeResult<Vec<SubjectAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, class_id FROM subject_assignments WHERE owner_id = ? ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([owner], |r| {
                Ok(SubjectAssignment {
                    id: r.get(0)?,
                    subject_id: r.get(1)?,
                    class_id: r.get(2)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    /// Inserts the assessment; `id` and `subject_id` on the input are ignored.
    pub fn insert_assessment(&self, owner: &str, a: &Assessment) -> GradeResult<Assessment> {
        let assignment = self
            .find_subject_assignment(owner, &a.subject_assignment_id)?
            .ok_or_else(|| GradeError::NotFound("subject assignment".into()))?;
        if assignment.class_id != a.class_id {
            return Err(GradeError::BadParams(
                "assessment class must match the subject assignment class".into(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO assessments(
               id, owner_id, term, subject_assignment_id, class_id, kind, number,
               total_score, logic, auto_create_entries, show_in_report, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                &id,
                owner,
                a.term.as_str(),
                &a.subject_assignment_id,
                &a.class_id,
                a.kind.as_str(),
                a.number,
                a.total_score,
                a.logic.as_deref(),
                a.auto_create_entries as i64,
                a.show_in_report as i64,
                now_text(),
            ],
        )?;
        self.find_assessment(owner, &id)?
            .ok_or_else(|| GradeError::AssessmentNotFound(id))
    }

    /// Updates the editable fields. Existing entries are not recomputed here,
    /// but a total below any stored score is refused.
    pub fn update_assessment(&self, owner: &str, a: &Assessment) -> GradeResult<()> {
        let highest: Option<i64> = self.conn.query_row(
            "SELECT MAX(score) FROM score_entries WHERE assessment_id = ? AND owner_id = ?",
            (&a.id, owner),
            |r| r.get(0),
        )?;
        if let Some(score) = highest.filter(|s| *s > a.total_score) {
            return Err(GradeError::ScoreOutOfRange {
                score,
                total_score: a.total_score,
            });
        }
        let changed = self.conn.execute(
            "UPDATE assessments
             SET term = ?, kind = ?, number = ?, total_score = ?, logic = ?,
                 auto_create_entries = ?, show_in_report = ?
             WHERE id = ? AND owner_id = ?",
            rusqlite::params![
                a.term.as_str(),
                a.kind.as_str(),
                a.number,
                a.total_score,
                a.logic.as_deref(),
                a.auto_create_entries as i64,
                a.show_in_report as i64,
                &a.id,
                owner,
            ],
        )?;
        if changed == 0 {
            return Err(GradeError::AssessmentNotFound(a.id.clone()));
        }
        Ok(())
    }

    pub fn delete_assessment(&self, owner: &str, assessment_id: &str) -> GradeResult<usize> {
        if self.find_assessment(owner, assessment_id)?.is_none() {
            return Err(GradeError::AssessmentNotFound(assessment_id.to_string()));
        }
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM score_entries WHERE assessment_id = ? AND owner_id = ?",
            (assessment_id, owner),
        )?;
        tx.execute(
            "DELETE FROM assessments WHERE id = ? AND owner_id = ?",
            (assessment_id, owner),
        )?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn delete_score_entry(&self, owner: &str, entry_id: &str) -> GradeResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM score_entries WHERE id = ? AND owner_id = ?",
            (entry_id, owner),
        )?;
        if changed == 0 {
            return Err(GradeError::NotFound("score entry".into()));
        }
        Ok(())
    }

    pub fn list_students(&self, owner: &str) -> GradeResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, class_id FROM students WHERE owner_id = ? ORDER BY name",
        )?;
        let rows = stmt
            .query_map([owner], student_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }
}

impl GradebookStore for SqliteStore<'_> {
    fn find_assessment(&self, owner: &str, assessment_id: &str) -> GradeResult<Option<Assessment>> {
        let sql = format!(
            "SELECT {}
             FROM assessments a
             JOIN subject_assignments sa ON sa.id = a.subject_assignment_id
             WHERE a.owner_id = ? AND a.id = ?",
            ASSESSMENT_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, (owner, assessment_id), assessment_row)
            .optional()?;
        row.map(AssessmentRow::into_assessment).transpose()
    }

    fn find_assessments(
        &self,
        owner: &str,
        filter: &AssessmentFilter,
    ) -> GradeResult<Vec<Assessment>> {
        let mut clauses: Vec<String> = vec!["a.owner_id = ?".into()];
        let mut bind: Vec<Value> = vec![Value::Text(owner.to_string())];

        if let Some(term) = filter.term {
            clauses.push("a.term = ?".into());
            bind.push(Value::Text(term.as_str().to_string()));
        }
        if let Some(id) = &filter.subject_assignment_id {
            clauses.push("a.subject_assignment_id = ?".into());
            bind.push(Value::Text(id.clone()));
        }
        if let Some(id) = &filter.subject_id {
            clauses.push("sa.subject_id = ?".into());
            bind.push(Value::Text(id.clone()));
        }
        if let Some(class_ids) = &filter.class_ids {
            if class_ids.is_empty() {
                return Ok(Vec::new());
            }
            clauses.push(format!("a.class_id IN ({})", placeholders(class_ids.len())));
            bind.extend(class_ids.iter().map(|id| Value::Text(id.clone())));
        }
        if let Some(kind) = filter.kind {
            clauses.push("a.kind = ?".into());
            bind.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(number) = filter.number {
            clauses.push("a.number = ?".into());
            bind.push(Value::Integer(number));
        }
        if filter.only_in_report {
            clauses.push("a.show_in_report = 1".into());
        }

        let sql = format!(
            "SELECT {}
             FROM assessments a
             JOIN subject_assignments sa ON sa.id = a.subject_assignment_id
             WHERE {}
             ORDER BY a.rowid",
            ASSESSMENT_COLUMNS,
            clauses.join(" AND ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind), assessment_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        rows.into_iter().map(AssessmentRow::into_assessment).collect()
    }

    fn find_score_entry(
        &self,
        owner: &str,
        student_id: &str,
        assessment_id: &str,
    ) -> GradeResult<Option<ScoreEntry>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, student_id, assessment_id, score
                 FROM score_entries
                 WHERE owner_id = ? AND student_id = ? AND assessment_id = ?",
                (owner, student_id, assessment_id),
                score_entry_row,
            )
            .optional()?)
    }

    fn find_score_entries(
        &self,
        owner: &str,
        assessment_ids: &[String],
    ) -> GradeResult<Vec<ScoreEntry>> {
        if assessment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, student_id, assessment_id, score
             FROM score_entries
             WHERE owner_id = ? AND assessment_id IN ({})
             ORDER BY rowid",
            placeholders(assessment_ids.len())
        );
        let mut bind: Vec<Value> = Vec::with_capacity(assessment_ids.len() + 1);
        bind.push(Value::Text(owner.to_string()));
        bind.extend(assessment_ids.iter().map(|id| Value::Text(id.clone())));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind), score_entry_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    fn find_students(&self, owner: &str, class_id: &str) -> GradeResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, class_id FROM students
             WHERE owner_id = ? AND class_id = ?
             ORDER BY name",
        )?;
        let rows = stmt
            .query_map((owner, class_id), student_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    fn find_student(&self, owner: &str, student_id: &str) -> GradeResult<Option<Student>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, class_id FROM students WHERE owner_id = ? AND id = ?",
                (owner, student_id),
                student_row,
            )
            .optional()?)
    }

    fn find_student_by_name(
        &self,
        owner: &str,
        class_id: &str,
        name: &str,
    ) -> GradeResult<Option<Student>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, class_id FROM students
                 WHERE owner_id = ? AND class_id = ? AND name = ?",
                (owner, class_id, name),
                student_row,
            )
            .optional()?)
    }

    fn find_subject(&self, owner: &str, subject_id: &str) -> GradeResult<Option<Subject>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM subjects WHERE owner_id = ? AND id = ?",
                (owner, subject_id),
                |r| {
                    Ok(Subject {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_subject_by_name(&self, owner: &str, name: &str) -> GradeResult<Option<Subject>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM subjects WHERE owner_id = ? AND name = ?",
                (owner, name),
                |r| {
                    Ok(Subject {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_subject_assignment(
        &self,
        owner: &str,
        assignment_id: &str,
    ) -> GradeResult<Option<SubjectAssignment>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, subject_id, class_id FROM subject_assignments
                 WHERE owner_id = ? AND id = ?",
                (owner, assignment_id),
                |r| {
                    Ok(SubjectAssignment {
                        id: r.get(0)?,
                        subject_id: r.get(1)?,
                        class_id: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_class_group(&self, owner: &str, class_id: &str) -> GradeResult<Option<ClassGroup>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, batch FROM classes WHERE owner_id = ? AND id = ?",
                (owner, class_id),
                class_row,
            )
            .optional()?)
    }

    fn find_class_groups(
        &self,
        owner: &str,
        name: &str,
        batch: Option<&str>,
    ) -> GradeResult<Vec<ClassGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, batch FROM classes
             WHERE owner_id = ? AND name = ? AND (?3 IS NULL OR batch = ?3)
             ORDER BY batch",
        )?;
        let rows = stmt
            .query_map((owner, name, batch), class_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    fn insert_score_entry(
        &self,
        owner: &str,
        student_id: &str,
        assessment_id: &str,
        score: i64,
    ) -> GradeResult<ScoreEntry> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO score_entries(id, owner_id, student_id, assessment_id, score, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&id, owner, student_id, assessment_id, score, now_text()),
        )?;
        Ok(ScoreEntry {
            id,
            student_id: student_id.to_string(),
            assessment_id: assessment_id.to_string(),
            score,
        })
    }

    fn update_score_entry_score(&self, owner: &str, entry_id: &str, score: i64) -> GradeResult<()> {
        let changed = self.conn.execute(
            "UPDATE score_entries SET score = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
            (score, now_text(), entry_id, owner),
        )?;
        if changed == 0 {
            return Err(GradeError::NotFound("score entry".into()));
        }
        Ok(())
    }
}
