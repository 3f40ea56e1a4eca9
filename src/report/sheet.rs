//! Flat spreadsheet view of a report: one header row, one row per student.

use super::tabular::TabularOutput;
use serde::Serialize;
use serde_json::Value;

/// A run of header cells that belong together, e.g. one term's columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderSpan {
    pub label: String,
    pub span: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub groups: Vec<HeaderSpan>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    pub fn from_report(report: &TabularOutput) -> Self {
        let mut groups = vec![HeaderSpan {
            label: String::new(),
            span: 2,
        }];
        let mut header = vec![report.header.count.clone(), report.header.name.clone()];

        for term in &report.header.terms {
            if term.columns.is_empty() {
                continue;
            }
            groups.push(HeaderSpan {
                label: term.title.clone(),
                span: term.columns.len(),
            });
            header.extend(
                term.columns
                    .iter()
                    .map(|c| format!("{} {}", term.title, c.label)),
            );
        }

        if let Some(labels) = &report.header.term_totals {
            groups.push(HeaderSpan {
                label: "Term Totals".into(),
                span: labels.len() * 2,
            });
            for l in labels {
                header.push(l.test_total.clone());
                header.push(l.total_score.clone());
            }
        }

        groups.push(HeaderSpan {
            label: String::new(),
            span: 3,
        });
        header.push(report.header.total.clone());
        header.push(report.header.total_available.clone());
        header.push(report.header.percentage.clone());

        let rows = report
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let mut out: Vec<Value> = vec![
                    Value::from(idx + 1),
                    Value::from(format!("{} ({})", row.name, row.batch)),
                ];
                out.extend(row.cells().map(|c| match c.score {
                    Some(s) => Value::from(s),
                    None => Value::Null,
                }));
                if let Some(totals) = &row.term_totals {
                    for t in totals {
                        out.push(Value::from(t.test_total));
                        out.push(Value::from(t.total_score));
                    }
                }
                out.push(Value::from(row.total_score));
                out.push(Value::from(row.total_available_score));
                out.push(Value::from(row.percentage));
                out
            })
            .collect();

        Self {
            groups,
            header,
            rows,
        }
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        push_record(&mut csv, self.header.iter().map(|h| csv_quote(h)));
        for row in &self.rows {
            push_record(&mut csv, row.iter().map(csv_cell));
        }
        csv
    }
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    out.push_str(&fields.collect::<Vec<_>>().join(","));
    out.push('\n');
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => csv_quote(s),
        other => other.to_string(),
    }
}
