use crate::model::{AssessmentKind, Term};
use serde::Serialize;

/// One assessment column inside a term group, e.g. `Test 2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnKey {
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub number: i64,
    pub label: String,
}

impl ColumnKey {
    pub fn new(kind: AssessmentKind, number: i64) -> Self {
        Self {
            kind,
            number,
            label: format!("{} {}", kind, number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermHeader {
    pub term: Term,
    pub title: String,
    pub columns: Vec<ColumnKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermTotalLabels {
    pub term: Term,
    pub test_total: String,
    pub total_score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub count: String,
    pub name: String,
    pub terms: Vec<TermHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_totals: Option<Vec<TermTotalLabels>>,
    pub total: String,
    pub total_available: String,
    pub percentage: String,
}

impl Header {
    pub fn new(terms: Vec<TermHeader>, with_subtotals: bool) -> Self {
        let term_totals = with_subtotals.then(|| {
            terms
                .iter()
                .map(|t| TermTotalLabels {
                    term: t.term,
                    test_total: format!("{} Test Total", t.title),
                    total_score: format!("{} Total Score", t.title),
                })
                .collect()
        });
        Self {
            count: "S/N".into(),
            name: "Student".into(),
            terms,
            term_totals,
            total: "Total Score".into(),
            total_available: "Total Available Score".into(),
            percentage: "Percentage".into(),
        }
    }
}

/// A score cell; `score` is `None` when the student has no entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub number: i64,
    pub score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermCells {
    pub term: Term,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermTotals {
    pub term: Term,
    pub test_total: i64,
    pub total_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub student_id: String,
    pub name: String,
    pub class_id: String,
    pub batch: String,
    pub terms: Vec<TermCells>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_totals: Option<Vec<TermTotals>>,
    pub total_score: i64,
    pub total_available_score: i64,
    pub percentage: f64,
}

impl StudentRow {
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.terms.iter().flat_map(|t| t.cells.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularOutput {
    pub header: Header,
    pub rows: Vec<StudentRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,
    pub all_batches: bool,
}

impl TabularOutput {
    pub fn has_subtotals(&self) -> bool {
        self.header.term_totals.is_some()
    }
}
