use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRecord {
    pub credits: f64,
    pub grade: Option<String>,
    pub course_code: Option<String>,
    pub course_name: Option<String>,
}

impl EnrollmentRecord {
    #[cfg(test)]
    pub fn new(credits: f64, grade: Option<&str>) -> Self {
        Self {
            credits,
            grade: grade.map(str::to_string),
            course_code: None,
            course_name: None,
        }
    }

    pub fn course_label(&self) -> &str {
        self.course_name
            .as_deref()
            .or(self.course_code.as_deref())
            .unwrap_or("Course")
    }
}

/// Payment state of a single fee line. Matching is exact: "paid" is `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FeeState {
    Paid,
    Pending,
    Overdue,
    Other(String),
}

impl FeeState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Paid" => Self::Paid,
            "Pending" => Self::Pending,
            "Overdue" => Self::Overdue,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Paid => "Paid",
            Self::Pending => "Pending",
            Self::Overdue => "Overdue",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeRecord {
    pub fee_id: Option<i64>,
    pub amount: f64,
    pub status: FeeState,
    pub due_date: String,
}

impl FeeRecord {
    #[cfg(test)]
    pub fn new(amount: f64, status: &str, due_date: &str) -> Self {
        Self {
            fee_id: None,
            amount,
            status: FeeState::parse(status),
            due_date: due_date.to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status != FeeState::Paid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpaResult {
    pub gpa: Option<f64>,
    pub credits_earned: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeeSummaryStatus {
    Paid,
    Outstanding,
    Overdue,
    Error,
}

impl FeeSummaryStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Paid => "Paid Up",
            Self::Outstanding => "Outstanding",
            Self::Overdue => "Overdue",
            Self::Error => "Unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeSummary {
    pub total_pending: f64,
    pub next_due_date: Option<String>,
    pub status: FeeSummaryStatus,
}

impl FeeSummary {
    pub fn error() -> Self {
        Self {
            total_pending: 0.0,
            next_due_date: None,
            status: FeeSummaryStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GpaStanding {
    Excellent,
    Consistent,
    NeedsImprovement,
    BelowAverage,
    Unrated,
}

impl GpaStanding {
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent performance",
            Self::Consistent => "Consistent performance",
            Self::NeedsImprovement => "Needs improvement",
            Self::BelowAverage => "Below average",
            Self::Unrated => "No graded courses",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentProfile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub major: Option<String>,
    pub program: Option<String>,
    pub year: Option<String>,
    pub advisor: Option<String>,
}

impl StudentProfile {
    pub fn display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if full.is_empty() {
            format!("Student {}", self.id)
        } else {
            full.to_string()
        }
    }
}

/// Editable student columns. `None` leaves a column untouched on update.
#[derive(Debug, Clone, Default, PartialEq, clap::Args)]
pub struct StudentFields {
    #[arg(long)]
    pub first_name: Option<String>,
    #[arg(long)]
    pub last_name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub major: Option<String>,
    #[arg(long)]
    pub program: Option<String>,
    #[arg(long)]
    pub year: Option<String>,
    #[arg(long)]
    pub advisor: Option<String>,
}

impl StudentFields {
    pub fn is_empty(&self) -> bool {
        [
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.major,
            &self.program,
            &self.year,
            &self.advisor,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildSummary {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl ChildSummary {
    pub fn label(&self) -> String {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if full.is_empty() {
            self.id.clone()
        } else {
            full.to_string()
        }
    }
}

/// Everything a summary or report needs for one student.
#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub profile: Option<StudentProfile>,
    pub student_id: String,
    pub enrollments: Vec<EnrollmentRecord>,
    pub gpa: GpaResult,
    pub standing: GpaStanding,
    pub fees: FeeSummary,
    pub last_payment: Option<FeeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_state_matches_exactly() {
        assert_eq!(FeeState::parse("Paid"), FeeState::Paid);
        assert_eq!(FeeState::parse("Overdue"), FeeState::Overdue);
        assert_eq!(FeeState::parse("paid"), FeeState::Other("paid".to_string()));
        assert_eq!(FeeState::parse("Waived").as_str(), "Waived");
    }

    #[test]
    fn summary_status_serializes_upper_case() {
        let json = serde_json::to_string(&FeeSummaryStatus::Outstanding).unwrap();
        assert_eq!(json, "\"OUTSTANDING\"");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let profile = StudentProfile {
            id: "S-104".to_string(),
            first_name: None,
            last_name: Some(" ".to_string()),
            email: None,
            major: None,
            program: None,
            year: None,
            advisor: None,
        };
        assert_eq!(profile.display_name(), "Student S-104");
    }

    #[test]
    fn student_fields_report_emptiness() {
        assert!(StudentFields::default().is_empty());
        let fields = StudentFields {
            advisor: Some("Dr. Rao".to_string()),
            ..StudentFields::default()
        };
        assert!(!fields.is_empty());
    }
}
