use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::grades;
use crate::models::{
    EnrollmentRecord, FeeRecord, FeeState, FeeSummary, FeeSummaryStatus, GpaResult, GpaStanding,
    StudentProfile, StudentSummary,
};

pub fn compute_gpa(enrollments: &[EnrollmentRecord]) -> GpaResult {
    let mut total_points = 0.0;
    let mut total_credits_for_gpa = 0.0;
    let mut credits_earned = 0.0;

    for record in enrollments {
        let credits = record.credits;
        if credits.is_nan() || credits <= 0.0 {
            continue;
        }

        let grade = record.grade.as_deref();
        if grades::earns_credit(grade) {
            credits_earned += credits;
        }

        let points = grades::points_for(grade);
        total_points += points * credits;
        if points > 0.0 {
            total_credits_for_gpa += credits;
        }
    }

    GpaResult {
        gpa: if total_credits_for_gpa > 0.0 {
            Some(total_points / total_credits_for_gpa)
        } else {
            None
        },
        credits_earned,
    }
}

pub fn gpa_standing(gpa: Option<f64>) -> GpaStanding {
    match gpa {
        None => GpaStanding::Unrated,
        Some(value) if value >= 3.5 => GpaStanding::Excellent,
        Some(value) if value >= 3.0 => GpaStanding::Consistent,
        Some(value) if value >= 2.0 => GpaStanding::NeedsImprovement,
        Some(_) => GpaStanding::BelowAverage,
    }
}

pub fn summarize_fees(fees: &[FeeRecord]) -> FeeSummary {
    let mut pending: Vec<&FeeRecord> = fees.iter().filter(|fee| fee.is_pending()).collect();
    let total_pending: f64 = pending.iter().map(|fee| fee.amount).sum();

    pending.sort_by(|a, b| compare_due_dates(&a.due_date, &b.due_date));
    let next_due_date = pending.first().map(|fee| fee.due_date.clone());

    let status = if fees.iter().any(|fee| fee.status == FeeState::Overdue) {
        FeeSummaryStatus::Overdue
    } else if fees.iter().any(|fee| fee.status == FeeState::Pending) || total_pending > 0.0 {
        FeeSummaryStatus::Outstanding
    } else {
        FeeSummaryStatus::Paid
    };

    FeeSummary {
        total_pending,
        next_due_date,
        status,
    }
}

/// Summarizes a fee fetch that may have failed. A failure becomes the
/// `ERROR` summary instead of propagating.
pub fn summarize_fee_feed<E>(feed: Result<Vec<FeeRecord>, E>) -> FeeSummary
where
    E: std::fmt::Display,
{
    match feed {
        Ok(fees) => summarize_fees(&fees),
        Err(err) => {
            warn!(error = %err, "fee records unavailable, reporting ERROR status");
            FeeSummary::error()
        }
    }
}

/// The paid fee with the most recent due date.
pub fn last_payment(fees: &[FeeRecord]) -> Option<&FeeRecord> {
    let mut paid: Vec<&FeeRecord> = fees
        .iter()
        .filter(|fee| fee.status == FeeState::Paid)
        .collect();
    paid.sort_by(|a, b| compare_due_dates_desc(&a.due_date, &b.due_date));
    paid.first().copied()
}

pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|stamp| stamp.date())
}

// Unparseable dates order after every real date in both orderings.
fn compare_due_dates(a: &str, b: &str) -> Ordering {
    match (parse_due_date(a), parse_due_date(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_due_dates_desc(a: &str, b: &str) -> Ordering {
    match (parse_due_date(a), parse_due_date(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn build_summary(
    student_id: &str,
    profile: Option<StudentProfile>,
    enrollments: Vec<EnrollmentRecord>,
    fees: anyhow::Result<Vec<FeeRecord>>,
) -> StudentSummary {
    let gpa = compute_gpa(&enrollments);
    let standing = gpa_standing(gpa.gpa);
    let last_payment = fees
        .as_ref()
        .ok()
        .and_then(|fees| last_payment(fees).cloned());
    let fees = summarize_fee_feed(fees);

    StudentSummary {
        profile,
        student_id: student_id.to_string(),
        enrollments,
        gpa,
        standing,
        fees,
        last_payment,
    }
}
