//! Pivots flat score entries into one row per student with per-term
//! columns, subtotals, totals and a percentage.

use super::tabular::{
    Cell, ColumnKey, Header, StudentRow, TabularOutput, TermCells, TermHeader, TermTotals,
};
use crate::config::SortOrder;
use crate::error::{GradeError, GradeResult};
use crate::logic::round_to;
use crate::model::{Assessment, AssessmentFilter, AssessmentKind, ClassGroup, Student, Term, TERMS};
use crate::store::GradebookStore;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReportRequest<'a> {
    pub subject_assignment_id: &'a str,
    pub class_name: &'a str,
    /// `None`, empty or `All` covers every batch of the class.
    pub batch: Option<&'a str>,
    /// `None` covers all three terms and turns on per-term subtotals.
    pub term: Option<Term>,
    pub sort: SortOrder,
    pub include_hidden: bool,
}

pub fn batch_filter(batch: Option<&str>) -> Option<&str> {
    batch
        .map(str::trim)
        .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case("all"))
}

pub fn resolve_class_groups(
    store: &dyn GradebookStore,
    owner: &str,
    class_name: &str,
    batch: Option<&str>,
) -> GradeResult<Vec<ClassGroup>> {
    let batch = batch_filter(batch);
    let groups = store.find_class_groups(owner, class_name, batch)?;
    if groups.is_empty() {
        let label = match batch {
            Some(b) => format!("{} {}", class_name, b),
            None => class_name.to_string(),
        };
        return Err(GradeError::ClassNotFound(label));
    }
    Ok(groups)
}

type AssessmentKey = (String, Term, AssessmentKind, i64);

fn term_headers(terms: &[Term], assessments: &[Assessment]) -> Vec<TermHeader> {
    terms
        .iter()
        .map(|&term| {
            let mut seen = HashSet::new();
            let columns = assessments
                .iter()
                .filter(|a| a.term == term)
                .filter(|a| seen.insert((a.kind, a.number)))
                .map(|a| ColumnKey::new(a.kind, a.number))
                .collect();
            TermHeader {
                term,
                title: term.title().to_string(),
                columns,
            }
        })
        .collect()
}

fn percentage(total: i64, available: i64) -> f64 {
    if available > 0 {
        round_to(total as f64 / available as f64 * 100.0, 2)
    } else {
        0.0
    }
}

pub fn sort_rows(rows: &mut [StudentRow], sort: SortOrder) {
    match sort {
        SortOrder::Desc => rows.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.batch.cmp(&b.batch))
        }),
        SortOrder::Asc => {
            rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.batch.cmp(&b.batch)))
        }
    }
}

pub fn build_report(
    store: &dyn GradebookStore,
    owner: &str,
    req: &ReportRequest<'_>,
) -> GradeResult<TabularOutput> {
    let groups = resolve_class_groups(store, owner, req.class_name, req.batch)?;
    let assignment = store
        .find_subject_assignment(owner, req.subject_assignment_id)?
        .ok_or_else(|| GradeError::NotFound("subject assignment".into()))?;

    let filter = AssessmentFilter {
        term: req.term,
        subject_id: Some(assignment.subject_id.clone()),
        class_ids: Some(groups.iter().map(|g| g.id.clone()).collect()),
        only_in_report: !req.include_hidden,
        ..AssessmentFilter::default()
    };
    let mut assessments = store.find_assessments(owner, &filter)?;
    assessments.sort_by_key(Assessment::column_order);

    let ids: Vec<String> = assessments.iter().map(|a| a.id.clone()).collect();
    let entries = store.find_score_entries(owner, &ids)?;
    let scores: HashMap<(&str, &str), i64> = entries
        .iter()
        .map(|e| ((e.student_id.as_str(), e.assessment_id.as_str()), e.score))
        .collect();
    let with_entries: HashSet<&str> = entries.iter().map(|e| e.student_id.as_str()).collect();

    let terms: Vec<Term> = match req.term {
        Some(t) => vec![t],
        None => TERMS.to_vec(),
    };
    let headers = term_headers(&terms, &assessments);
    let with_subtotals = req.term.is_none();

    let by_key: HashMap<AssessmentKey, &Assessment> = assessments
        .iter()
        .map(|a| ((a.class_id.clone(), a.term, a.kind, a.number), a))
        .collect();

    let mut rows = Vec::new();
    for group in &groups {
        let students: Vec<Student> = store
            .find_students(owner, &group.id)?
            .into_iter()
            .filter(|s| with_entries.contains(s.id.as_str()))
            .collect();

        for student in students {
            let mut total_score = 0;
            let mut total_available = 0;
            let mut term_cells = Vec::with_capacity(headers.len());
            let mut term_totals = Vec::with_capacity(headers.len());

            for header in &headers {
                let mut test_total = 0;
                let mut term_total = 0;
                let cells = header
                    .columns
                    .iter()
                    .map(|col| {
                        let key = (group.id.clone(), header.term, col.kind, col.number);
                        let assessment = by_key.get(&key);
                        let score = assessment.and_then(|a| {
                            scores.get(&(student.id.as_str(), a.id.as_str())).copied()
                        });
                        if let (Some(a), Some(s)) = (assessment, score) {
                            total_score += s;
                            total_available += a.total_score;
                            term_total += s;
                            if a.kind != AssessmentKind::Exam {
                                test_total += s;
                            }
                        }
                        Cell {
                            kind: col.kind,
                            number: col.number,
                            score,
                        }
                    })
                    .collect();
                term_cells.push(TermCells {
                    term: header.term,
                    cells,
                });
                term_totals.push(TermTotals {
                    term: header.term,
                    test_total,
                    total_score: term_total,
                });
            }

            rows.push(StudentRow {
                student_id: student.id,
                name: student.name,
                class_id: group.id.clone(),
                batch: group.batch.clone(),
                terms: term_cells,
                term_totals: with_subtotals.then_some(term_totals),
                total_score,
                total_available_score: total_available,
                percentage: percentage(total_score, total_available),
            });
        }
    }
    sort_rows(&mut rows, req.sort);

    let out = TabularOutput {
        header: Header::new(headers, with_subtotals),
        rows,
        term: req.term,
        all_batches: batch_filter(req.batch).is_none(),
    };
    debug!(
        class = req.class_name,
        assessments = assessments.len(),
        rows = out.rows.len(),
        subtotals = out.has_subtotals(),
        "built report"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    fn request<'a>(f: &'a Fixture, term: Option<Term>, sort: SortOrder) -> ReportRequest<'a> {
        ReportRequest {
            subject_assignment_id: &f.assignment.id,
            class_name: "JSS1",
            batch: Some("All"),
            term,
            sort,
            include_hidden: false,
        }
    }

    #[test]
    fn missing_entry_is_excluded_from_totals_only() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let bayo = f.student("Bayo");
        let t1 = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        let exam = f.assessment(Term::First, AssessmentKind::Exam, 1, 60, None);
        let t2 = f.assessment(Term::Second, AssessmentKind::Test, 1, 20, None);
        f.score(&ada, &t1, 15);
        f.score(&ada, &exam, 45);
        f.score(&ada, &t2, 10);
        f.score(&bayo, &t1, 12);
        f.score(&bayo, &t2, 18);

        let store = f.store();
        let report = build_report(&store, &f.owner, &request(&f, None, SortOrder::Asc))
            .expect("report");
        assert_eq!(report.rows.len(), 2);
        assert!(report.all_batches);

        let bayo_row = &report.rows[1];
        assert_eq!(bayo_row.name, "Bayo");
        assert_eq!(bayo_row.total_score, 30);
        assert_eq!(bayo_row.total_available_score, 40);
        assert_eq!(bayo_row.percentage, 75.0);
        let first: Vec<Option<i64>> = bayo_row.terms[0].cells.iter().map(|c| c.score).collect();
        assert_eq!(first, vec![Some(12), None]);

        let ada_row = &report.rows[0];
        assert_eq!(ada_row.total_score, 70);
        assert_eq!(ada_row.total_available_score, 100);
        assert_eq!(ada_row.percentage, 70.0);
        let totals = ada_row.term_totals.as_ref().expect("subtotals");
        assert_eq!(totals[0].test_total, 15);
        assert_eq!(totals[0].total_score, 60);
        assert_eq!(totals[1].total_score, 10);
        assert_eq!(totals[2].total_score, 0);
    }

    #[test]
    fn desc_sort_orders_by_total() {
        let f = Fixture::new();
        let t1 = f.test(1, None);
        for (name, score) in [("Ada", 70), ("Bayo", 95), ("Chi", 82)] {
            let s = f.student(name);
            f.score(&s, &t1, score);
        }
        let store = f.store();
        let report = build_report(&store, &f.owner, &request(&f, None, SortOrder::Desc))
            .expect("report");
        let totals: Vec<i64> = report.rows.iter().map(|r| r.total_score).collect();
        assert_eq!(totals, vec![95, 82, 70]);

        let asc = build_report(&store, &f.owner, &request(&f, None, SortOrder::Asc))

            .expect("report");
        let names: Vec<&str> = asc.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Bayo", "Chi"]);
    }

    #[test]
    fn header_orders_columns_and_keeps_empty_terms() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let exam = f.assessment(Term::First, AssessmentKind::Exam, 1, 60, None);
        let t2 = f.assessment(Term::First, AssessmentKind::Test, 2, 20, None);
        let asg = f.assessment(Term::First, AssessmentKind::Assignment, 1, 10, None);
        let t1 = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        for a in [&exam, &t2, &asg, &t1] {
            f.score(&ada, a, 5);
        }
        let store = f.store();
        let report = build_report(&store, &f.owner, &request(&f, None, SortOrder::Asc))
            .expect("report");
        let labels: Vec<&str> = report.header.terms[0]
            .columns
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Test 1", "Test 2", "Assignment 1", "Exam 1"]);
        assert_eq!(report.header.terms.len(), 3);
        assert!(report.header.terms[1].columns.is_empty());
        assert!(report.header.terms[2].columns.is_empty());
        assert_eq!(
            report.header.term_totals.as_ref().expect("labels")[0].test_total,
            "First Term Test Total"
        );
        for row in &report.rows {
            assert_eq!(row.cells().count(), 4);
        }
    }

    #[test]
    fn term_filter_drops_subtotals_and_other_terms() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let first = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        let second = f.assessment(Term::Second, AssessmentKind::Test, 1, 20, None);
        f.score(&ada, &first, 10);
        f.score(&ada, &second, 20);
        let store = f.store();
        let report = build_report(
            &store,
            &f.owner,
            &request(&f, Some(Term::Second), SortOrder::Asc),
        )
        .expect("report");
        assert!(!report.has_subtotals());
        assert_eq!(report.header.terms.len(), 1);
        assert_eq!(report.header.terms[0].term, Term::Second);
        let row = &report.rows[0];
        assert!(row.term_totals.is_none());
        assert_eq!(row.total_score, 20);
        assert_eq!(row.percentage, 100.0);

        let json = serde_json::to_value(&report).expect("json");
        assert!(json["header"].get("termTotals").is_none());
        assert!(json["rows"][0].get("termTotals").is_none());
    }

    #[test]
    fn students_without_entries_are_omitted() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let _bayo = f.student("Bayo");
        let t1 = f.test(1, None);
        f.score(&ada, &t1, 10);
        let store = f.store();
        let report = build_report(&store, &f.owner, &request(&f, None, SortOrder::Asc))
            .expect("report");
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].name, "Ada");
    }

    #[test]
    fn batches_are_separate_rows_and_filterable() {
        let f = Fixture::new();
        let store = f.store();
        let b = store.create_class_group(&f.owner, "JSS1", "B").expect("class");
        let sa_b = store
            .assign_subject(&f.owner, &f.subject.id, &b.id)
            .expect("assign");
        let mut draft = f.draft(Term::First, AssessmentKind::Test, 1, 20, None);
        draft.subject_assignment_id = sa_b.id;
        draft.class_id = b.id.clone();
        let t_b = store.insert_assessment(&f.owner, &draft).expect("insert");
        let ada_b = f.student_in(&b, "Ada");
        f.score(&ada_b, &t_b, 8);
        let ada = f.student("Ada");
        let t1 = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        f.score(&ada, &t1, 16);

        let all = build_report(&store, &f.owner, &request(&f, None, SortOrder::Asc))

            .expect("report");
        let rows: Vec<(&str, i64)> = all
            .rows
            .iter()
            .map(|r| (r.batch.as_str(), r.total_score))
            .collect();
        assert_eq!(rows, vec![("A", 16), ("B", 8)]);
        assert_eq!(all.header.terms[0].columns.len(), 1);

        let mut only_b = request(&f, None, SortOrder::Asc);
        only_b.batch = Some("B");
        let report = build_report(&store, &f.owner, &only_b).expect("report");
        assert!(!report.all_batches);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].batch, "B");
    }

    #[test]
    fn hidden_assessments_are_left_out_by_default() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let mut draft = f.draft(Term::First, AssessmentKind::Notes, 1, 10, None);
        draft.show_in_report = false;
        let hidden = f.store().insert_assessment(&f.owner, &draft).expect("insert");
        let t1 = f.test(1, None);
        f.score(&ada, &hidden, 10);
        f.score(&ada, &t1, 50);
        let store = f.store();
        let report = build_report(&store, &f.owner, &request(&f, None, SortOrder::Asc))
            .expect("report");
        assert_eq!(report.rows[0].total_score, 50);

        let mut with_hidden = request(&f, None, SortOrder::Asc);
        with_hidden.include_hidden = true;
        let report = build_report(&store, &f.owner, &with_hidden).expect("report");
        assert_eq!(report.rows[0].total_score, 60);
    }

    #[test]
    fn percentage_stays_within_bounds() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 40), 0.0);
        assert_eq!(percentage(40, 40), 100.0);
    }

    #[test]
    fn unknown_class_is_an_error() {
        let f = Fixture::new();
        let store = f.store();
        let mut req = request(&f, None, SortOrder::Asc);
        req.class_name = "SS3";
        assert!(matches!(
            build_report(&store, &f.owner, &req),
            Err(GradeError::ClassNotFound(_))
        ));
        req.class_name = "JSS1";
        req.batch = Some("Z");
        assert!(matches!(
            build_report(&store, &f.owner, &req),
            Err(GradeError::ClassNotFound(_))
        ));
    }
}
