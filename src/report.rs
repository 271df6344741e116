use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{FeeSummaryStatus, StudentSummary};
use crate::summary::parse_due_date;

pub const DEFAULT_REQUIRED_CREDITS: f64 = 120.0;

pub fn format_gpa(gpa: Option<f64>) -> String {
    match gpa {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => "N/A".to_string(),
    }
}

pub fn format_credits(credits_earned: f64, required: f64) -> String {
    format!("{}/{}", trim_number(credits_earned), trim_number(required))
}

pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

pub fn format_due_date(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => parse_due_date(raw)
            .map(long_date)
            .unwrap_or_else(|| raw.to_string()),
        None => "N/A".to_string(),
    }
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

pub fn build_report(summary: &StudentSummary, required_credits: f64) -> String {
    let mut output = String::new();
    let name = summary
        .profile
        .as_ref()
        .map(|profile| profile.display_name())
        .unwrap_or_else(|| format!("Student {}", summary.student_id));

    let _ = writeln!(output, "# Student Summary");
    let _ = writeln!(output, "Generated for {} (ID {})", name, summary.student_id);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Profile");

    match &summary.profile {
        Some(profile) => {
            let fields = [
                ("Email", profile.email.as_deref()),
                ("Major", profile.major.as_deref()),
                ("Program", profile.program.as_deref()),
                ("Year", profile.year.as_deref()),
                ("Advisor", profile.advisor.as_deref()),
            ];
            for (label, value) in fields {
                let _ = writeln!(output, "- {}: {}", label, value.unwrap_or("N/A"));
            }
        }
        None => {
            let _ = writeln!(output, "No profile on record.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Academics");
    let _ = writeln!(output, "- GPA: {}", format_gpa(summary.gpa.gpa));
    let _ = writeln!(output, "- Standing: {}", summary.standing.label());
    let _ = writeln!(
        output,
        "- Credits earned: {}",
        format_credits(summary.gpa.credits_earned, required_credits)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Enrollments");

    if summary.enrollments.is_empty() {
        let _ = writeln!(output, "No enrollments found.");
    } else {
        for enrollment in summary.enrollments.iter() {
            let _ = writeln!(
                output,
                "- {}: {} ({} credits)",
                enrollment.course_label(),
                enrollment.grade.as_deref().unwrap_or("N/A"),
                trim_number(enrollment.credits)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fees");
    let _ = writeln!(output, "- Status: {}", summary.fees.status.label());

    if summary.fees.status == FeeSummaryStatus::Error {
        let _ = writeln!(output, "Fee records could not be loaded.");
        return output;
    }

    let _ = writeln!(
        output,
        "- Balance pending: {}",
        format_amount(summary.fees.total_pending)
    );
    let _ = writeln!(
        output,
        "- Next due: {}",
        format_due_date(summary.fees.next_due_date.as_deref())
    );
    let last_payment = summary
        .last_payment
        .as_ref()
        .map(|fee| format_due_date(Some(&fee.due_date)))
        .unwrap_or_else(|| "No payments yet".to_string());
    let _ = writeln!(output, "- Last payment: {}", last_payment);

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentRecord, FeeRecord, StudentProfile};
    use crate::summary::build_summary;

    fn profile() -> StudentProfile {
        StudentProfile {
            id: "S-1001".to_string(),
            first_name: Some("Avery".to_string()),
            last_name: Some("Lee".to_string()),
            email: Some("avery.lee@example.edu".to_string()),
            major: Some("Computer Science".to_string()),
            program: Some("B.Tech".to_string()),
            year: None,
            advisor: None,
        }
    }

    #[test]
    fn formats_match_portal_display() {
        assert_eq!(format_gpa(Some(14.0 / 6.0)), "2.33");
        assert_eq!(format_gpa(None), "N/A");
        assert_eq!(format_credits(7.0, 120.0), "7/120");
        assert_eq!(format_credits(7.5, 120.0), "7.5/120");
        assert_eq!(format_due_date(Some("2024-01-05")), "January 5, 2024");
        assert_eq!(format_due_date(Some("soon")), "soon");
        assert_eq!(format_due_date(None), "N/A");
    }

    #[test]
    fn report_lists_all_sections() {
        let mut course = EnrollmentRecord::new(4.0, Some("A"));
        course.course_name = Some("Programming Fundamentals".to_string());
        let summary = build_summary(
            "S-1001",
            Some(profile()),
            vec![course],
            Ok(vec![
                FeeRecord::new(45000.0, "Paid", "2025-07-15"),
                FeeRecord::new(45000.0, "Pending", "2026-01-15"),
            ]),
        );

        let report = build_report(&summary, DEFAULT_REQUIRED_CREDITS);
        assert!(report.contains("Generated for Avery Lee (ID S-1001)"));
        assert!(report.contains("- GPA: 4.00"));
        assert!(report.contains("- Standing: Excellent performance"));
        assert!(report.contains("- Credits earned: 4/120"));
        assert!(report.contains("- Programming Fundamentals: A (4 credits)"));
        assert!(report.contains("- Status: Outstanding"));
        assert!(report.contains("- Balance pending: 45000.00"));
        assert!(report.contains("- Next due: January 15, 2026"));
        assert!(report.contains("- Last payment: July 15, 2025"));
        assert!(report.contains("- Year: N/A"));
    }

    #[test]
    fn report_marks_unavailable_fees() {
        let summary = build_summary("S-9", None, Vec::new(), Err(anyhow::anyhow!("503")));
        let report = build_report(&summary, DEFAULT_REQUIRED_CREDITS);
        assert!(report.contains("Generated for Student S-9 (ID S-9)"));
        assert!(report.contains("No profile on record."));
        assert!(report.contains("No enrollments found."));
        assert!(report.contains("- GPA: N/A"));
        assert!(report.contains("- Status: Unavailable"));
        assert!(!report.contains("Balance pending"));
    }
}
