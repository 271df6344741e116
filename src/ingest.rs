use std::io::Read;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::{EnrollmentRecord, FeeRecord, FeeState};

const CREDIT_KEYS: &[&str] = &["credits", "courseCredits", "course_credits"];
const GRADE_KEYS: &[&str] = &["grade"];
const COURSE_CODE_KEYS: &[&str] = &["courseCode", "course_code"];
const COURSE_NAME_KEYS: &[&str] = &["courseName", "course_name"];
const FEE_ID_KEYS: &[&str] = &["feeId", "fee_id", "id"];
const AMOUNT_KEYS: &[&str] = &["amount"];
const STATUS_KEYS: &[&str] = &["status"];
const DUE_DATE_KEYS: &[&str] = &["dueDate", "due_date"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON array of records, got {0}")]
    NotAnArray(&'static str),
    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
}

pub fn enrollments_from_json(payload: &str) -> Result<Vec<EnrollmentRecord>, IngestError> {
    let rows = json_rows(payload)?;
    Ok(rows.iter().map(enrollment_from_fields).collect())
}

pub fn fees_from_json(payload: &str) -> Result<Vec<FeeRecord>, IngestError> {
    let rows = json_rows(payload)?;
    Ok(rows.iter().map(fee_from_fields).collect())
}

pub fn enrollments_from_csv<R: Read>(reader: R) -> Result<Vec<EnrollmentRecord>, IngestError> {
    let rows = csv_rows(reader)?;
    Ok(rows.iter().map(enrollment_from_fields).collect())
}

pub fn fees_from_csv<R: Read>(reader: R) -> Result<Vec<FeeRecord>, IngestError> {
    let rows = csv_rows(reader)?;
    Ok(rows.iter().map(fee_from_fields).collect())
}

pub fn enrollment_from_fields(fields: &Map<String, Value>) -> EnrollmentRecord {
    EnrollmentRecord {
        credits: first_present(fields, CREDIT_KEYS).map_or(0.0, coerce_number),
        grade: first_present(fields, GRADE_KEYS).and_then(coerce_text),
        course_code: first_present(fields, COURSE_CODE_KEYS).and_then(coerce_text),
        course_name: first_present(fields, COURSE_NAME_KEYS).and_then(coerce_text),
    }
}

/// Credits to store for a course: only a present, positive value counts.
/// Missing, empty or unreadable credit cells give `None` so stored course
/// credits are left alone.
pub fn course_credits(fields: &Map<String, Value>) -> Option<f64> {
    first_present(fields, CREDIT_KEYS)
        .map(coerce_number)
        .filter(|credits| *credits > 0.0)
}

pub fn fee_from_fields(fields: &Map<String, Value>) -> FeeRecord {
    let status = first_present(fields, STATUS_KEYS)
        .and_then(coerce_text)
        .unwrap_or_default();

    FeeRecord {
        fee_id: first_present(fields, FEE_ID_KEYS).and_then(|value| {
            let number = coerce_number(value);
            (number.fract() == 0.0 && number > 0.0).then_some(number as i64)
        }),
        amount: first_present(fields, AMOUNT_KEYS).map_or(0.0, coerce_number),
        status: FeeState::parse(&status),
        due_date: first_present(fields, DUE_DATE_KEYS)
            .and_then(coerce_text)
            .unwrap_or_default(),
    }
}

pub fn text_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(fields, keys).and_then(coerce_text)
}

/// First alias that is present and non-null. An unparseable value still
/// wins over later aliases.
fn first_present<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find(|value| !value.is_null())
}

/// Numeric coercion for loosely typed payload fields. Anything that cannot
/// be read as a finite number becomes 0.
pub fn coerce_number(value: &Value) -> f64 {
    let number = match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                0.0
            } else {
                text.parse::<f64>().unwrap_or(0.0)
            }
        }
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn json_rows(payload: &str) -> Result<Vec<Map<String, Value>>, IngestError> {
    let value: Value = serde_json::from_str(payload)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => return Err(IngestError::NotAnArray("an object")),
        Value::Null => return Err(IngestError::NotAnArray("null")),
        _ => return Err(IngestError::NotAnArray("a scalar")),
    };

    let total = items.len();
    let rows: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(fields) => Some(fields),
            _ => None,
        })
        .collect();

    if rows.len() < total {
        debug!(skipped = total - rows.len(), "skipped non-object payload entries");
    }
    Ok(rows)
}

// Empty CSV cells are treated as absent so the next alias column is tried.
pub fn csv_rows<R: Read>(reader: R) -> Result<Vec<Map<String, Value>>, IngestError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(header, cell)| (header.trim().to_string(), Value::String(cell.to_string())))
            .collect();
        rows.push(fields);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credit_aliases_are_checked_in_priority_order() {
        let payload = json!([
            {"credits": 3, "courseCredits": 5, "grade": "A"},
            {"courseCredits": "4", "course_credits": 9, "grade": "B"},
            {"course_credits": 2, "grade": null},
            {"credits": null, "course_credits": 1.5, "grade": "C"}
        ])
        .to_string();

        let records = enrollments_from_json(&payload).unwrap();
        let credits: Vec<f64> = records.iter().map(|r| r.credits).collect();
        assert_eq!(credits, vec![3.0, 4.0, 2.0, 1.5]);
        assert_eq!(records[2].grade, None);
    }

    #[test]
    fn unparseable_credits_do_not_fall_through() {
        let payload = json!([{"credits": "three", "courseCredits": 3, "grade": "A"}]).to_string();
        let records = enrollments_from_json(&payload).unwrap();
        assert_eq!(records[0].credits, 0.0);
    }

    #[test]
    fn coercion_matches_loose_payloads() {
        assert_eq!(coerce_number(&json!(" 2.5 ")), 2.5);
        assert_eq!(coerce_number(&json!("")), 0.0);
        assert_eq!(coerce_number(&json!(true)), 1.0);
        assert_eq!(coerce_number(&json!([1])), 0.0);
        assert_eq!(coerce_number(&json!("1e999")), 0.0);
    }

    #[test]
    fn fee_fields_resolve_aliases() {
        let payload = json!([
            {"feeId": 7, "amount": "1200.50", "status": "Pending", "dueDate": "2024-08-01"},
            {"fee_id": 8, "amount": null, "status": "Paid", "due_date": "2024-07-01"},
            {"amount": 10}
        ])
        .to_string();

        let fees = fees_from_json(&payload).unwrap();
        assert_eq!(fees[0].fee_id, Some(7));
        assert_eq!(fees[0].amount, 1200.5);
        assert_eq!(fees[0].status, FeeState::Pending);
        assert_eq!(fees[1].amount, 0.0);
        assert_eq!(fees[1].due_date, "2024-07-01");
        assert_eq!(fees[2].status, FeeState::Other(String::new()));
        assert_eq!(fees[2].due_date, "");
    }

    #[test]
    fn non_array_payloads_are_rejected() {
        assert!(matches!(
            fees_from_json(r#"{"error": "not found"}"#),
            Err(IngestError::NotAnArray(_))
        ));
        assert!(matches!(fees_from_json("<html>"), Err(IngestError::Json(_))));
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let records = enrollments_from_json(r#"[1, "x", {"credits": 3, "grade": "A"}]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].grade.as_deref(), Some("A"));
    }

    #[test]
    fn csv_headers_use_the_same_aliases() {
        let data = "course_code,course_credits,credits,grade\nCS101,4,,A\nMA201,3,2,\n";
        let records = enrollments_from_csv(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].credits, 4.0);
        assert_eq!(records[0].course_code.as_deref(), Some("CS101"));
        assert_eq!(records[1].credits, 2.0);
        assert_eq!(records[1].grade, None);
    }

    #[test]
    fn course_credits_ignore_missing_and_unreadable_cells() {
        let data = "student_id,course_code,grade\nS-1002,CS101,A\n";
        let rows = csv_rows(data.as_bytes()).unwrap();
        assert_eq!(course_credits(&rows[0]), None);

        let data = "student_id,course_code,credits,grade\nS-1,CS101,,A\nS-1,CS101,four,A\nS-1,CS101,0,A\nS-1,CS101,4,A\n";
        let rows = csv_rows(data.as_bytes()).unwrap();
        let credits: Vec<Option<f64>> = rows.iter().map(course_credits).collect();
        assert_eq!(credits, vec![None, None, None, Some(4.0)]);
    }

    #[test]
    fn fee_csv_reads_rows() {
        let data = "amount,status,dueDate\n500,Overdue,2024-01-10\n250,Paid,2023-12-01\n";
        let fees = fees_from_csv(data.as_bytes()).unwrap();
        assert_eq!(fees.len(), 2);
        assert_eq!(fees[0].status, FeeState::Overdue);
        assert_eq!(fees[1].amount, 250.0);
    }
}
