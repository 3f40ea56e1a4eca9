use serde::{Deserialize, Serialize};
use std::fmt;

pub const TERMS: [Term; 3] = [Term::First, Term::Second, Term::Third];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub fn as_str(self) -> &'static str {
        match self {
            Term::First => "First",
            Term::Second => "Second",
            Term::Third => "Third",
        }
    }

    /// Display title used in report headers, e.g. "First Term".
    pub fn title(self) -> &'static str {
        match self {
            Term::First => "First Term",
            Term::Second => "Second Term",
            Term::Third => "Third Term",
        }
    }

    /// Accepts `First`, `first_term`, `First Term`, `FirstTerm` or `1`.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim().to_ascii_lowercase().replace(['_', ' '], "");
        let t = t.strip_suffix("term").unwrap_or(&t);
        match t {
            "first" | "1" => Some(Term::First),
            "second" | "2" => Some(Term::Second),
            "third" | "3" => Some(Term::Third),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssessmentKind {
    Test,
    Assignment,
    Notes,
    Exam,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Test => "Test",
            AssessmentKind::Assignment => "Assignment",
            AssessmentKind::Notes => "Notes",
            AssessmentKind::Exam => "Exam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Some(AssessmentKind::Test),
            "assignment" => Some(AssessmentKind::Assignment),
            "notes" => Some(AssessmentKind::Notes),
            "exam" => Some(AssessmentKind::Exam),
            _ => None,
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub name: String,
    pub batch: String,
}

impl fmt::Display for ClassGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.batch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAssignment {
    pub id: String,
    pub subject_id: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub term: Term,
    pub subject_assignment_id: String,
    pub subject_id: String,
    pub class_id: String,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub number: i64,
    pub total_score: i64,
    pub logic: Option<String>,
    pub auto_create_entries: bool,
    pub show_in_report: bool,
}

impl Assessment {
    pub fn has_logic(&self) -> bool {
        self.logic
            .as_deref()
            .map(|l| !l.trim().is_empty())
            .unwrap_or(false)
    }

    /// Human label, e.g. "First Term Test 1".
    pub fn label(&self) -> String {
        format!("{} {} {}", self.term.title(), self.kind, self.number)
    }

    /// Report ordering: term, then Test/Assignment/Notes/Exam, then number.
    pub fn column_order(&self) -> (Term, AssessmentKind, i64) {
        (self.term, self.kind, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub id: String,
    pub student_id: String,
    pub assessment_id: String,
    pub score: i64,
}

/// Criteria for `GradebookStore::find_assessments`. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct AssessmentFilter {
    pub term: Option<Term>,
    pub subject_assignment_id: Option<String>,
    pub subject_id: Option<String>,
    pub class_ids: Option<Vec<String>>,
    pub kind: Option<AssessmentKind>,
    pub number: Option<i64>,
    pub only_in_report: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_parse_accepts_common_spellings() {
        assert_eq!(Term::parse("First"), Some(Term::First));
        assert_eq!(Term::parse("second_term"), Some(Term::Second));
        assert_eq!(Term::parse("Third Term"), Some(Term::Third));
        assert_eq!(Term::parse("ThirdTerm"), Some(Term::Third));
        assert_eq!(Term::parse("2"), Some(Term::Second));
        assert_eq!(Term::parse("Fourth"), None);
    }

    #[test]
    fn kind_order_puts_exam_last() {
        let mut kinds = vec![
            AssessmentKind::Exam,
            AssessmentKind::Notes,
            AssessmentKind::Test,
            AssessmentKind::Assignment,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                AssessmentKind::Test,
                AssessmentKind::Assignment,
                AssessmentKind::Notes,
                AssessmentKind::Exam
            ]
        );
    }
}
