use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod db;
mod grades;
mod ingest;
mod models;
mod report;
mod session;
mod summary;

use models::{EnrollmentRecord, FeeRecord, StudentFields, StudentSummary};
use session::{Role, Session};

#[derive(Parser)]
#[command(name = "portal-summary")]
#[command(about = "GPA and fee status summaries for the student portal", long_about = None)]
struct Cli {
    /// Postgres connection string for the portal records
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(flatten)]
    session: SessionArgs,

    /// Credits required for the degree, shown next to credits earned
    #[arg(long, global = true, default_value_t = report::DEFAULT_REQUIRED_CREDITS)]
    required_credits: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Id of the signed-in user
    #[arg(long, global = true, env = "PORTAL_USER_ID")]
    user_id: Option<String>,
    /// Role of the signed-in user
    #[arg(long, global = true, env = "PORTAL_ROLE", value_enum, ignore_case = true, default_value_t = Role::Student)]
    role: Role,
    /// Child currently selected by a parent
    #[arg(long = "child", global = true, env = "PORTAL_SELECTED_CHILD")]
    selected_child: Option<String>,
}

impl SessionArgs {
    fn into_session(self) -> anyhow::Result<Session> {
        Ok(Session::new(self.user_id, self.role, self.selected_child)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, courses, enrollments and fees
    Seed,
    /// Import enrollments and/or fees from CSV files
    Import {
        #[arg(long)]
        enrollments: Option<PathBuf>,
        #[arg(long)]
        fees: Option<PathBuf>,
    },
    /// List the children linked to the signed-in parent
    Children,
    /// Print GPA, credits and fee status for a student
    Summary {
        #[arg(long)]
        student: Option<String>,
        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a markdown summary report
    Report {
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value = "summary.md")]
        out: PathBuf,
    },
    /// Mark a fee as paid
    Pay {
        #[arg(long)]
        fee_id: i64,
    },
    /// Set a student's grade for a course
    Grade {
        #[arg(long)]
        student: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        grade: String,
    },
    /// List every student
    Students,
    /// Add a student record
    AddStudent {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        fields: StudentFields,
    },
    /// Change the given fields of a student record
    EditStudent {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        fields: StudentFields,
    },
    /// Delete a student with their enrollments and fees
    RemoveStudent {
        #[arg(long)]
        id: String,
    },
    /// Bill a student
    AddFee {
        #[arg(long)]
        student: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "Pending")]
        status: String,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due_date: NaiveDate,
    },
    /// Add a course to the catalog
    AddCourse {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        credits: f64,
    },
    /// Remove a course with no enrollments
    RemoveCourse {
        #[arg(long)]
        code: String,
    },
    /// Summarize exported enrollment and fee payloads (JSON or CSV) without a database
    Inspect {
        #[arg(long)]
        enrollments: PathBuf,
        #[arg(long)]
        fees: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

async fn connect(database_url: Option<&str>) -> anyhow::Result<PgPool> {
    let database_url =
        database_url.context("DATABASE_URL must be set to the portal Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let database_url = cli.database_url;
    let required_credits = cli.required_credits;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(database_url.as_deref()).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(database_url.as_deref()).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { enrollments, fees } => {
            if enrollments.is_none() && fees.is_none() {
                bail!("nothing to import; pass --enrollments and/or --fees");
            }
            let pool = connect(database_url.as_deref()).await?;
            if let Some(path) = enrollments {
                let written = db::import_enrollments_csv(&pool, &path).await?;
                println!("Wrote {written} enrollments from {}.", path.display());
            }
            if let Some(path) = fees {
                let inserted = db::import_fees_csv(&pool, &path).await?;
                println!("Inserted {inserted} fees from {}.", path.display());
            }
        }
        Commands::Children => {
            let session = cli.session.into_session()?;
            if session.role != Role::Parent {
                bail!("only parent sessions have linked children");
            }
            let pool = connect(database_url.as_deref()).await?;
            let children = db::fetch_children(&pool, &session.user_id).await?;
            if children.is_empty() {
                println!("No children linked.");
                return Ok(());
            }
            for child in children {
                let marker = if session.selected_child.as_deref() == Some(child.id.as_str()) {
                    " (selected)"
                } else {
                    ""
                };
                println!("- {} [{}]{}", child.label(), child.id, marker);
            }
        }
        Commands::Summary { student, json } => {
            let session = cli.session.into_session()?;
            let pool = connect(database_url.as_deref()).await?;
            let summary = load_summary(&pool, &session, student.as_deref()).await?;
            emit(&summary, json, required_credits)?;
        }
        Commands::Report { student, out } => {
            let session = cli.session.into_session()?;
            let pool = connect(database_url.as_deref()).await?;
            let summary = load_summary(&pool, &session, student.as_deref()).await?;
            let report = report::build_report(&summary, required_credits);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Pay { fee_id } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            let fee = db::record_payment(&pool, fee_id).await?;
            println!(
                "Fee {} for {} marked as {}.",
                fee_id,
                report::format_amount(fee.amount),
                fee.status.as_str()
            );
        }
        Commands::Grade {
            student,
            course,
            grade,
        } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            let enrollment = db::update_grade(&pool, &student, &course, &grade).await?;
            println!(
                "Grade for {} in {} set to {}.",
                student,
                enrollment.course_label(),
                enrollment.grade.as_deref().unwrap_or("N/A")
            );
        }
        Commands::Students => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            let students = db::list_students(&pool).await?;
            if students.is_empty() {
                println!("No students on record.");
                return Ok(());
            }
            for student in students {
                println!(
                    "- {} [{}] {}",
                    student.display_name(),
                    student.id,
                    student.email.as_deref().unwrap_or("N/A")
                );
            }
        }
        Commands::AddStudent { id, fields } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            let student = db::create_student(&pool, &id, &fields).await?;
            println!("Student {} ({}) created.", student.display_name(), student.id);
        }
        Commands::EditStudent { id, fields } => {
            cli.session.into_session()?.can_edit_student(&id)?;
            let pool = connect(database_url.as_deref()).await?;
            let student = db::update_student(&pool, &id, &fields).await?;
            println!("Student {} ({}) updated.", student.display_name(), student.id);
        }
        Commands::RemoveStudent { id } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            db::delete_student(&pool, &id).await?;
            println!("Student {id} deleted.");
        }
        Commands::AddFee {
            student,
            amount,
            status,
            due_date,
        } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            let fee = db::create_fee(&pool, &student, amount, &status, due_date).await?;
            println!(
                "Fee {} of {} due {} created for {}.",
                fee.fee_id.map_or_else(|| "?".to_string(), |id| id.to_string()),
                report::format_amount(fee.amount),
                report::format_due_date(Some(&fee.due_date)),
                student
            );
        }
        Commands::AddCourse {
            code,
            name,
            credits,
        } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            db::create_course(&pool, &code, &name, credits).await?;
            println!("Course {code} ({name}) created.");
        }
        Commands::RemoveCourse { code } => {
            cli.session.into_session()?.require_admin()?;
            let pool = connect(database_url.as_deref()).await?;
            db::delete_course(&pool, &code).await?;
            println!("Course {code} deleted.");
        }
        Commands::Inspect {
            enrollments,
            fees,
            json,
        } => {
            let summary = inspect_files(&enrollments, &fees)?;
            emit(&summary, json, required_credits)?;
        }
    }

    Ok(())
}

/// Fetches everything for one student. Each section degrades on its own: a
/// missing profile or enrollment list is logged, a fee failure becomes the
/// ERROR fee status.
async fn load_summary(
    pool: &PgPool,
    session: &Session,
    explicit: Option<&str>,
) -> anyhow::Result<StudentSummary> {
    let children = match session.role {
        Role::Parent => db::fetch_children(pool, &session.user_id).await?,
        _ => Vec::new(),
    };
    let student_id = session.target_student(explicit, &children)?;
    info!(student_id = %student_id, role = ?session.role, "loading student summary");

    let (profile, enrollments, fees) = tokio::join!(
        db::fetch_student(pool, &student_id),
        db::fetch_enrollments(pool, &student_id),
        db::fetch_fees(pool, &student_id),
    );

    let profile = profile.unwrap_or_else(|err| {
        warn!(error = %err, "student profile unavailable");
        None
    });
    let enrollments = enrollments.unwrap_or_else(|err| {
        warn!(error = %err, "enrollments unavailable, GPA will show N/A");
        Vec::new()
    });
    debug!(count = enrollments.len(), "enrollments loaded");

    Ok(summary::build_summary(&student_id, profile, enrollments, fees))
}

/// Offline summary of exported payloads. A fee file that cannot be read or
/// parsed becomes the ERROR fee status; a bad enrollment file is an error.
fn inspect_files(enrollments: &Path, fees: &Path) -> anyhow::Result<StudentSummary> {
    let enrollments = load_enrollments_file(enrollments)?;
    Ok(summary::build_summary(
        "offline",
        None,
        enrollments,
        load_fees_file(fees),
    ))
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn load_enrollments_file(path: &Path) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let records = if is_csv(path) {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        ingest::enrollments_from_csv(file)?
    } else {
        let payload = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        ingest::enrollments_from_json(&payload)?
    };
    Ok(records)
}

fn load_fees_file(path: &Path) -> anyhow::Result<Vec<FeeRecord>> {
    let records = if is_csv(path) {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        ingest::fees_from_csv(file)?
    } else {
        let payload = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        ingest::fees_from_json(&payload)?
    };
    Ok(records)
}

fn emit(summary: &StudentSummary, json: bool, required_credits: f64) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let name = summary
        .profile
        .as_ref()
        .map(|profile| profile.display_name())
        .unwrap_or_else(|| format!("Student {}", summary.student_id));

    println!("Summary for {} (ID {}):", name, summary.student_id);
    println!(
        "- GPA {} ({})",
        report::format_gpa(summary.gpa.gpa),
        summary.standing.label()
    );
    println!(
        "- Credits {}",
        report::format_credits(summary.gpa.credits_earned, required_credits)
    );
    println!(
        "- Fees {}: {} pending, next due {}",
        summary.fees.status.label(),
        report::format_amount(summary.fees.total_pending),
        report::format_due_date(summary.fees.next_due_date.as_deref())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use crate::models::FeeSummaryStatus;

    fn write_temp(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{name}", uuid::Uuid::new_v4()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn edit_student_takes_partial_fields() {
        let cli = Cli::try_parse_from([
            "portal-summary",
            "edit-student",
            "--id",
            "S-1001",
            "--major",
            "Physics",
        ])
        .unwrap();
        match cli.command {
            Commands::EditStudent { id, fields } => {
                assert_eq!(id, "S-1001");
                assert_eq!(fields.major.as_deref(), Some("Physics"));
                assert!(fields.first_name.is_none());
            }
            _ => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn inspect_runs_without_a_database() {
        let enrollments = write_temp(
            "enrollments.json",
            r#"[{"credits": 3, "grade": "A"}, {"courseCredits": "4", "grade": "B"}]"#,
        );
        let fees = write_temp("fees.csv", "amount,status,due_date
120,Pending,2024-09-01
");

        let summary = inspect_files(&enrollments, &fees).unwrap();
        assert_eq!(summary.gpa.credits_earned, 7.0);
        assert_eq!(summary.fees.status, FeeSummaryStatus::Outstanding);
        assert_eq!(summary.fees.next_due_date.as_deref(), Some("2024-09-01"));

        let missing = std::env::temp_dir().join(format!("{}-fees.json", uuid::Uuid::new_v4()));
        let summary = inspect_files(&enrollments, &missing).unwrap();
        assert_eq!(summary.fees.status, FeeSummaryStatus::Error);

        std::fs::remove_file(enrollments).ok();
        std::fs::remove_file(fees).ok();
    }
}
