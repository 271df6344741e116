use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ingest;
use crate::models::{
    ChildSummary, EnrollmentRecord, FeeRecord, FeeState, StudentFields, StudentProfile,
};
use crate::summary::parse_due_date;

const STUDENT_ID_KEYS: &[&str] = &["studentId", "student_id"];
const SOURCE_KEY_KEYS: &[&str] = &["sourceKey", "source_key"];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("S-1001", "Avery", "Lee", "avery.lee@example.edu", "Computer Science", "2"),
        ("S-1002", "Jules", "Moreno", "jules.moreno@example.edu", "Mechanical", "3"),
        ("S-1003", "Kiara", "Patel", "kiara.patel@example.edu", "Electronics", "1"),
    ];

    for (id, first, last, email, major, year) in students {
        sqlx::query(
            r#"
            INSERT INTO student_portal.students
            (id, first_name, last_name, email, major, program, year, advisor)
            VALUES ($1, $2, $3, $4, $5, 'B.Tech', $6, 'Dr. Rao')
            ON CONFLICT (id) DO UPDATE
            SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name,
                email = EXCLUDED.email, major = EXCLUDED.major, year = EXCLUDED.year
            "#,
        )
        .bind(id)
        .bind(first)
        .bind(last)
        .bind(email)
        .bind(major)
        .bind(year)
        .execute(pool)
        .await?;
    }

    for child_id in ["S-1001", "S-1003"] {
        sqlx::query(
            r#"
            INSERT INTO student_portal.parent_children (parent_id, child_id)
            VALUES ('P-2001', $1)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(child_id)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        ("CS101", "Programming Fundamentals", 4.0),
        ("MA102", "Linear Algebra", 3.0),
        ("PH103", "Engineering Physics", 3.0),
        ("HS104", "Technical Writing", 2.0),
    ];

    for (code, name, credits) in courses {
        upsert_course(pool, code, Some(name), Some(credits)).await?;
    }

    let enrollments = vec![
        ("S-1001", "CS101", Some("A")),
        ("S-1001", "MA102", Some("B+")),
        ("S-1001", "PH103", Some("F")),
        ("S-1001", "HS104", None),
        ("S-1002", "CS101", Some("B")),
        ("S-1002", "MA102", Some("C")),
        ("S-1003", "CS101", Some("A+")),
    ];

    for (student_id, course_code, grade) in enrollments {
        sqlx::query(
            r#"
            INSERT INTO student_portal.enrollments (student_id, course_code, grade, enrollment_date)
            VALUES ($1, $2, $3, CURRENT_DATE)
            ON CONFLICT (student_id, course_code) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(course_code)
        .bind(grade)
        .execute(pool)
        .await?;
    }

    let fees = vec![
        ("seed-fee-001", "S-1001", 45000.0, "Paid", (2025, 7, 15)),
        ("seed-fee-002", "S-1001", 45000.0, "Pending", (2026, 1, 15)),
        ("seed-fee-003", "S-1002", 12000.0, "Overdue", (2025, 11, 30)),
        ("seed-fee-004", "S-1003", 45000.0, "Paid", (2025, 7, 15)),
    ];

    for (source_key, student_id, amount, status, (year, month, day)) in fees {
        let due_date = NaiveDate::from_ymd_opt(year, month, day).context("invalid date")?;
        insert_fee(pool, student_id, amount, status, Some(due_date), source_key).await?;
    }

    Ok(())
}

pub async fn fetch_student(pool: &PgPool, student_id: &str) -> anyhow::Result<Option<StudentProfile>> {
    let row = sqlx::query(
        r#"
        SELECT id, first_name, last_name, email, major, program, year, advisor
        FROM student_portal.students
        WHERE id = $1
        "#,
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(student_from_row))
}

/// Linked children whose student row still exists.
pub async fn fetch_children(pool: &PgPool, parent_id: &str) -> anyhow::Result<Vec<ChildSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.first_name, s.last_name, s.email
        FROM student_portal.parent_children pc
        JOIN student_portal.students s ON s.id = pc.child_id
        WHERE pc.parent_id = $1
        ORDER BY s.id
        "#,
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?;

    let children: Vec<ChildSummary> = rows
        .into_iter()
        .map(|row| ChildSummary {
            id: row.get("id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
        })
        .collect();

    debug!(parent_id, count = children.len(), "fetched linked children");
    Ok(children)
}

pub async fn fetch_enrollments(
    pool: &PgPool,
    student_id: &str,
) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT e.course_code, c.course_name, c.credits, e.grade
        FROM student_portal.enrollments e
        JOIN student_portal.courses c ON c.course_code = e.course_code
        WHERE e.student_id = $1
        ORDER BY e.enrollment_date DESC NULLS LAST, e.id
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(enrollment_from_row).collect())
}

pub async fn fetch_fees(pool: &PgPool, student_id: &str) -> anyhow::Result<Vec<FeeRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT fee_id, amount, status, due_date
        FROM student_portal.fees
        WHERE student_id = $1
        ORDER BY due_date NULLS LAST, fee_id
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(fee_from_row).collect())
}

pub async fn record_payment(pool: &PgPool, fee_id: i64) -> anyhow::Result<FeeRecord> {
    let row = sqlx::query(
        r#"
        UPDATE student_portal.fees
        SET status = 'Paid'
        WHERE fee_id = $1
        RETURNING fee_id, amount, status, due_date
        "#,
    )
    .bind(fee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| anyhow!("fee record not found with id {fee_id}"))?;

    info!(fee_id, "fee marked as paid");
    Ok(fee_from_row(&row))
}

/// Sets a grade, enrolling the student in the course first when needed.
pub async fn update_grade(
    pool: &PgPool,
    student_id: &str,
    course_code: &str,
    grade: &str,
) -> anyhow::Result<EnrollmentRecord> {
    fetch_student(pool, student_id)
        .await?
        .ok_or_else(|| anyhow!("student not found for id {student_id}"))?;
    sqlx::query("SELECT course_code FROM student_portal.courses WHERE course_code = $1")
        .bind(course_code)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow!("course not found for code {course_code}"))?;

    let row = sqlx::query(
        r#"
        INSERT INTO student_portal.enrollments (student_id, course_code, grade, enrollment_date)
        VALUES ($1, $2, $3, CURRENT_DATE)
        ON CONFLICT (student_id, course_code) DO UPDATE
        SET grade = EXCLUDED.grade
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(student_id)
    .bind(course_code)
    .bind(grade)
    .fetch_one(pool)
    .await?;

    let inserted: bool = row.get("inserted");
    if inserted {
        info!(student_id, course_code, "created enrollment for new grade");
    }

    let row = sqlx::query(
        r#"
        SELECT e.course_code, c.course_name, c.credits, e.grade
        FROM student_portal.enrollments e
        JOIN student_portal.courses c ON c.course_code = e.course_code
        WHERE e.student_id = $1 AND e.course_code = $2
        "#,
    )
    .bind(student_id)
    .bind(course_code)
    .fetch_one(pool)
    .await?;

    Ok(enrollment_from_row(&row))
}

pub async fn list_students(pool: &PgPool) -> anyhow::Result<Vec<StudentProfile>> {
    let rows = sqlx::query(
        r#"
        SELECT id, first_name, last_name, email, major, program, year, advisor
        FROM student_portal.students
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn create_student(
    pool: &PgPool,
    student_id: &str,
    fields: &StudentFields,
) -> anyhow::Result<StudentProfile> {
    let row = sqlx::query(
        r#"
        INSERT INTO student_portal.students
        (id, first_name, last_name, email, major, program, year, advisor)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO NOTHING
        RETURNING id, first_name, last_name, email, major, program, year, advisor
        "#,
    )
    .bind(student_id)
    .bind(fields.first_name.as_deref())
    .bind(fields.last_name.as_deref())
    .bind(fields.email.as_deref())
    .bind(fields.major.as_deref())
    .bind(fields.program.as_deref())
    .bind(fields.year.as_deref())
    .bind(fields.advisor.as_deref())
    .fetch_optional(pool)
    .await
    .context("failed to create student")?
    .ok_or_else(|| anyhow!("student already exists with id {student_id}"))?;

    info!(student_id, "student created");
    Ok(student_from_row(&row))
}

/// Updates only the columns set in `fields`.
pub async fn update_student(
    pool: &PgPool,
    student_id: &str,
    fields: &StudentFields,
) -> anyhow::Result<StudentProfile> {
    if fields.is_empty() {
        bail!("no student fields to update");
    }

    let row = sqlx::query(
        r#"
        UPDATE student_portal.students
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            email = COALESCE($4, email),
            major = COALESCE($5, major),
            program = COALESCE($6, program),
            year = COALESCE($7, year),
            advisor = COALESCE($8, advisor)
        WHERE id = $1
        RETURNING id, first_name, last_name, email, major, program, year, advisor
        "#,
    )
    .bind(student_id)
    .bind(fields.first_name.as_deref())
    .bind(fields.last_name.as_deref())
    .bind(fields.email.as_deref())
    .bind(fields.major.as_deref())
    .bind(fields.program.as_deref())
    .bind(fields.year.as_deref())
    .bind(fields.advisor.as_deref())
    .fetch_optional(pool)
    .await
    .context("failed to update student")?
    .ok_or_else(|| anyhow!("student not found with id {student_id}"))?;

    info!(student_id, "student updated");
    Ok(student_from_row(&row))
}

/// Removes a student along with their enrollments, fees and parent links.
pub async fn delete_student(pool: &PgPool, student_id: &str) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM student_portal.students WHERE id = $1")
        .bind(student_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("student not found with id {student_id}");
    }
    info!(student_id, "student deleted");
    Ok(())
}

pub async fn create_fee(
    pool: &PgPool,
    student_id: &str,
    amount: f64,
    status: &str,
    due_date: NaiveDate,
) -> anyhow::Result<FeeRecord> {
    validate_fee_amount(amount)?;
    fetch_student(pool, student_id)
        .await?
        .ok_or_else(|| anyhow!("student not found for id {student_id}"))?;

    let row = sqlx::query(
        r#"
        INSERT INTO student_portal.fees (student_id, amount, status, due_date)
        VALUES ($1, $2, $3, $4)
        RETURNING fee_id, amount, status, due_date
        "#,
    )
    .bind(student_id)
    .bind(amount)
    .bind(status)
    .bind(due_date)
    .fetch_one(pool)
    .await?;

    let fee = fee_from_row(&row);
    info!(student_id, fee_id = ?fee.fee_id, "fee created");
    Ok(fee)
}

pub async fn create_course(
    pool: &PgPool,
    course_code: &str,
    course_name: &str,
    credits: f64,
) -> anyhow::Result<()> {
    if !(credits.is_finite() && credits > 0.0) {
        bail!("course credits must be a positive number, got {credits}");
    }

    let result = sqlx::query(
        r#"
        INSERT INTO student_portal.courses (course_code, course_name, credits)
        VALUES ($1, $2, $3)
        ON CONFLICT (course_code) DO NOTHING
        "#,
    )
    .bind(course_code)
    .bind(course_name)
    .bind(credits)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("course already exists with code {course_code}");
    }
    info!(course_code, "course created");
    Ok(())
}

/// Courses that still have enrollments are kept.
pub async fn delete_course(pool: &PgPool, course_code: &str) -> anyhow::Result<()> {
    let enrolled: i64 = sqlx::query(
        "SELECT COUNT(*) AS enrolled FROM student_portal.enrollments WHERE course_code = $1",
    )
    .bind(course_code)
    .fetch_one(pool)
    .await?
    .get("enrolled");

    if enrolled > 0 {
        bail!("course {course_code} still has {enrolled} enrollments");
    }

    let result = sqlx::query("DELETE FROM student_portal.courses WHERE course_code = $1")
        .bind(course_code)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("course not found for code {course_code}");
    }
    info!(course_code, "course deleted");
    Ok(())
}

/// Imports enrollment rows (student, course, credits, grade). Returns the
/// number of enrollments written.
pub async fn import_enrollments_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let file = File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = ingest::csv_rows(file)?;
    let mut written = 0usize;

    for fields in rows {
        let Some(student_id) = ingest::text_field(&fields, STUDENT_ID_KEYS) else {
            warn!("skipping enrollment row without a student id");
            continue;
        };
        let record = ingest::enrollment_from_fields(&fields);
        let Some(course_code) = record.course_code.as_deref() else {
            warn!(student_id = %student_id, "skipping enrollment row without a course code");
            continue;
        };

        ensure_student(pool, &student_id).await?;
        upsert_course(
            pool,
            course_code,
            record.course_name.as_deref(),
            ingest::course_credits(&fields),
        )
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO student_portal.enrollments (student_id, course_code, grade, enrollment_date)
            VALUES ($1, $2, $3, CURRENT_DATE)
            ON CONFLICT (student_id, course_code) DO UPDATE
            SET grade = EXCLUDED.grade
            "#,
        )
        .bind(&student_id)
        .bind(course_code)
        .bind(record.grade.as_deref())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }

    Ok(written)
}

/// Imports fee rows. Rows whose source key was already imported are skipped;
/// rows without one get a key derived from their contents.
pub async fn import_fees_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let file = File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = ingest::csv_rows(file)?;
    let mut inserted = 0usize;

    for fields in rows {
        let Some(student_id) = ingest::text_field(&fields, STUDENT_ID_KEYS) else {
            warn!("skipping fee row without a student id");
            continue;
        };
        let fee = ingest::fee_from_fields(&fields);
        let due_date = parse_due_date(&fee.due_date);
        if due_date.is_none() && !fee.due_date.is_empty() {
            warn!(student_id = %student_id, due_date = %fee.due_date, "unreadable due date stored as empty");
        }
        let source_key = ingest::text_field(&fields, SOURCE_KEY_KEYS)
            .unwrap_or_else(|| derived_source_key(&student_id, &fee));

        ensure_student(pool, &student_id).await?;
        if insert_fee(
            pool,
            &student_id,
            fee.amount,
            fee.status.as_str(),
            due_date,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}

async fn ensure_student(pool: &PgPool, student_id: &str) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO student_portal.students (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// `None` credits keep whatever the course already has; a new course
/// starts at 0.
async fn upsert_course(
    pool: &PgPool,
    course_code: &str,
    course_name: Option<&str>,
    credits: Option<f64>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_portal.courses (course_code, course_name, credits)
        VALUES ($1, $2, COALESCE($3, 0))
        ON CONFLICT (course_code) DO UPDATE
        SET course_name = COALESCE(EXCLUDED.course_name, student_portal.courses.course_name),
            credits = COALESCE($3, student_portal.courses.credits)
        "#,
    )
    .bind(course_code)
    .bind(course_name)
    .bind(credits)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_fee(
    pool: &PgPool,
    student_id: &str,
    amount: f64,
    status: &str,
    due_date: Option<NaiveDate>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO student_portal.fees (student_id, amount, status, due_date, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(student_id)
    .bind(amount)
    .bind(status)
    .bind(due_date)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn validate_fee_amount(amount: f64) -> anyhow::Result<()> {
    if !(amount.is_finite() && amount >= 0.0) {
        bail!("fee amount must be a non-negative number, got {amount}");
    }
    Ok(())
}

// Same row contents always map to the same key, so re-imports are skipped.
fn derived_source_key(student_id: &str, fee: &FeeRecord) -> String {
    let contents = format!(
        "{}|{:.2}|{}|{}",
        student_id,
        fee.amount,
        fee.status.as_str(),
        fee.due_date.trim()
    );
    format!(
        "import-{}",
        Uuid::new_v5(&Uuid::NAMESPACE_OID, contents.as_bytes())
    )
}

fn student_from_row(row: &PgRow) -> StudentProfile {
    StudentProfile {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        major: row.get("major"),
        program: row.get("program"),
        year: row.get("year"),
        advisor: row.get("advisor"),
    }
}

fn enrollment_from_row(row: &PgRow) -> EnrollmentRecord {
    let credits: Option<f64> = row.get("credits");
    EnrollmentRecord {
        credits: credits.unwrap_or(0.0),
        grade: row.get("grade"),
        course_code: row.get("course_code"),
        course_name: row.get("course_name"),
    }
}

fn fee_from_row(row: &PgRow) -> FeeRecord {
    let status: String = row.get("status");
    let due_date: Option<NaiveDate> = row.get("due_date");
    FeeRecord {
        fee_id: row.get("fee_id"),
        amount: row.get("amount"),
        status: FeeState::parse(&status),
        due_date: due_date.map(|date| date.to_string()).unwrap_or_default(),
    }
}
