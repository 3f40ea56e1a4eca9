use super::aggregate::resolve_class_groups;
use crate::config::SortOrder;
use crate::error::{GradeError, GradeResult};
use crate::logic::round_to;
use crate::model::{Assessment, AssessmentFilter, AssessmentKind, Student, Term};
use crate::store::GradebookStore;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct SummaryRequest<'a> {
    pub class_name: &'a str,
    pub batch: Option<&'a str>,
    /// `None` summarises every subject taught to the class.
    pub subject_id: Option<&'a str>,
    pub term: Option<Term>,
    pub kind: Option<AssessmentKind>,
    pub sort: SortOrder,
}

/// One student's average over the entries of one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub student_id: String,
    pub student_name: String,
    pub batch: String,
    pub subject_id: String,
    pub subject_name: String,
    pub average_score: f64,
    pub average_percentage: f64,
    pub total_records: usize,
}

#[derive(Default)]
struct Acc {
    scores: Vec<f64>,
    percentages: Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn student_summary(
    store: &dyn GradebookStore,
    owner: &str,
    req: &SummaryRequest<'_>,
) -> GradeResult<Vec<SubjectSummary>> {
    let groups = resolve_class_groups(store, owner, req.class_name, req.batch)?;
    let subject_name = |id: &str| -> GradeResult<String> {
        store
            .find_subject(owner, id)?
            .map(|s| s.name)
            .ok_or_else(|| GradeError::NotFound("subject".into()))
    };
    if let Some(id) = req.subject_id {
        subject_name(id)?;
    }

    let filter = AssessmentFilter {
        term: req.term,
        kind: req.kind,
        subject_id: req.subject_id.map(str::to_string),
        class_ids: Some(groups.iter().map(|g| g.id.clone()).collect()),
        ..AssessmentFilter::default()
    };
    let assessments = store.find_assessments(owner, &filter)?;
    let by_id: HashMap<&str, &Assessment> =
        assessments.iter().map(|a| (a.id.as_str(), a)).collect();
    let ids: Vec<String> = assessments.iter().map(|a| a.id.clone()).collect();

    let mut grouped: BTreeMap<(String, String), Acc> = BTreeMap::new();
    for entry in store.find_score_entries(owner, &ids)? {
        let Some(a) = by_id.get(entry.assessment_id.as_str()) else {
            continue;
        };
        let acc = grouped
            .entry((entry.student_id.clone(), a.subject_id.clone()))
            .or_default();
        acc.scores.push(entry.score as f64);
        if a.total_score > 0 {
            acc.percentages
                .push(entry.score as f64 / a.total_score as f64 * 100.0);
        }
    }

    let mut students: HashMap<String, (Student, String)> = HashMap::new();
    for g in &groups {
        for s in store.find_students(owner, &g.id)? {
            students.insert(s.id.clone(), (s, g.batch.clone()));
        }
    }
    let mut names: HashMap<String, String> = HashMap::new();

    let mut out = Vec::with_capacity(grouped.len());
    for ((student_id, subject_id), acc) in grouped {
        let Some((student, batch)) = students.get(&student_id) else {
            continue;
        };
        let subject = match names.get(&subject_id) {
            Some(n) => n.clone(),
            None => {
                let n = subject_name(&subject_id)?;
                names.insert(subject_id.clone(), n.clone());
                n
            }
        };
        out.push(SubjectSummary {
            student_id,
            student_name: student.name.clone(),
            batch: batch.clone(),
            subject_id,
            subject_name: subject,
            average_score: round_to(mean(&acc.scores), 2),
            average_percentage: round_to(mean(&acc.percentages), 2),
            total_records: acc.scores.len(),
        });
    }

    match req.sort {
        SortOrder::Desc => out.sort_by(|a, b| {
            b.average_percentage
                .total_cmp(&a.average_percentage)
                .then_with(|| a.student_name.cmp(&b.student_name))
        }),
        SortOrder::Asc => out.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then_with(|| a.subject_name.cmp(&b.subject_name))
        }),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    fn request(sort: SortOrder) -> SummaryRequest<'static> {
        SummaryRequest {
            class_name: "JSS1",
            batch: None,
            subject_id: None,
            term: None,
            kind: None,
            sort,
        }
    }

    #[test]
    fn averages_scores_and_percentages_per_subject() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let bayo = f.student("Bayo");
        let t1 = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        let exam = f.assessment(Term::First, AssessmentKind::Exam, 1, 60, None);
        f.score(&ada, &t1, 10);
        f.score(&ada, &exam, 60);
        f.score(&bayo, &t1, 20);

        let store = f.store();
        let rows = student_summary(&store, &f.owner, &request(SortOrder::Asc)).expect("summary");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student_name, "Ada");
        assert_eq!(rows[0].subject_name, "Mathematics");
        assert_eq!(rows[0].average_score, 35.0);
        assert_eq!(rows[0].average_percentage, 75.0);
        assert_eq!(rows[0].total_records, 2);

        let desc = student_summary(&store, &f.owner, &request(SortOrder::Desc)).expect("summary");
        assert_eq!(desc[0].student_name, "Bayo");
        assert_eq!(desc[0].average_percentage, 100.0);
    }

    #[test]
    fn kind_filter_narrows_entries() {
        let f = Fixture::new();
        let ada = f.student("Ada");
        let t1 = f.assessment(Term::First, AssessmentKind::Test, 1, 20, None);
        let exam = f.assessment(Term::First, AssessmentKind::Exam, 1, 60, None);
        f.score(&ada, &t1, 10);
        f.score(&ada, &exam, 30);
        let store = f.store();
        let mut req = request(SortOrder::Asc);
        req.kind = Some(AssessmentKind::Exam);
        let rows = student_summary(&store, &f.owner, &req).expect("summary");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].average_score, 30.0);
        assert_eq!(rows[0].average_percentage, 50.0);
    }

    #[test]
    fn unknown_subject_is_not_found() {
        let f = Fixture::new();
        let store = f.store();
        let mut req = request(SortOrder::Asc);
        req.subject_id = Some("missing");
        assert!(matches!(
            student_summary(&store, &f.owner, &req),
            Err(GradeError::NotFound(_))
        ));
    }
}
