use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::config::Settings;
use crate::error::{ReportError, Result};
use crate::models::{AttendanceMark, AttendanceStatus, ClassInfo};

const SLOW_QUERY_THRESHOLD: StdDuration = StdDuration::from_millis(100);

pub const DEFAULT_TEACHER_ID: i64 = 1;

pub async fn connect(settings: &Settings) -> Result<SqlitePool> {
    if let Some(parent) = database_dir(&settings.database_url) {
        std::fs::create_dir_all(parent).map_err(|err| {
            ReportError::computation(format!("creating {}", parent.display()), err)
        })?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(settings.connect_options()?)
        .await?;
    tracing::info!(url = %settings.database_url, "database connected");
    Ok(pool)
}

/// Directory holding a file-backed database, if it has one.
fn database_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path).parent().filter(|dir| !dir.as_os_str().is_empty())
}

/// Single-connection in-memory store; the data lives as long as the pool.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = "sqlite::memory:"
        .parse::<SqliteConnectOptions>()?
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    init_db(&pool).await?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    ensure_default_teacher(pool).await?;
    Ok(())
}

/// Runs a statement and warns when it takes longer than the slow-query threshold.
pub(crate) async fn timed<T, F>(label: &'static str, query: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let started = Instant::now();
    let result = query.await;
    let elapsed = started.elapsed();
    if elapsed > SLOW_QUERY_THRESHOLD {
        tracing::warn!(
            query = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow query detected"
        );
    }
    result.map_err(|err| {
        tracing::error!(query = label, error = %err, "query execution failed");
        ReportError::Store(err)
    })
}

pub async fn ensure_default_teacher(pool: &SqlitePool) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO teachers (id, name, email, department)
        VALUES (?, 'Default Teacher', 'teacher@school.edu', 'General')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(DEFAULT_TEACHER_ID)
    .execute(pool)
    .await?;

    Ok(DEFAULT_TEACHER_ID)
}

pub async fn seed(pool: &SqlitePool, today: NaiveDate) -> Result<usize> {
    let teacher_id = ensure_default_teacher(pool).await?;

    let classes = [
        (
            "Computer Science A",
            "A",
            "Computer Science",
            "1st",
            "2024-25",
            "Programming Fundamentals",
        ),
        ("Computer Science B", "B", "Computer Science", "1st", "2024-25", "Data Structures"),
        ("Mathematics A", "A", "Mathematics", "2nd", "2024-25", "Calculus"),
        ("Physics A", "A", "Physics", "2nd", "2024-25", "Mechanics"),
    ];

    let mut class_ids = Vec::with_capacity(classes.len());
    for (name, section, department, semester, academic_year, subject) in classes {
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO classes (name, section, department, semester, academic_year, subject, teacher_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name, section, academic_year) DO UPDATE
            SET department = excluded.department, subject = excluded.subject
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(section)
        .bind(department)
        .bind(semester)
        .bind(academic_year)
        .bind(subject)
        .bind(teacher_id)
        .fetch_one(pool)
        .await?
        .try_get("id")?;
        class_ids.push(id);
    }

    let students = [
        ("John Doe", "CS001", "john.doe@student.edu", "Computer Science", 0),
        ("Jane Smith", "CS002", "jane.smith@student.edu", "Computer Science", 0),
        ("Mike Johnson", "CS003", "mike.johnson@student.edu", "Computer Science", 0),
        ("Maria Garcia", "CS006", "maria.garcia@student.edu", "Computer Science", 0),
        ("Sarah Wilson", "CS004", "sarah.wilson@student.edu", "Computer Science", 1),
        ("David Brown", "CS005", "david.brown@student.edu", "Computer Science", 1),
        ("Emily Davis", "MATH001", "emily.davis@student.edu", "Mathematics", 2),
        ("Robert Miller", "MATH002", "robert.miller@student.edu", "Mathematics", 2),
        ("Lisa Anderson", "PHY001", "lisa.anderson@student.edu", "Physics", 3),
        ("James Taylor", "PHY002", "james.taylor@student.edu", "Physics", 3),
    ];

    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for (index, (name, roll_no, email, branch, class_index)) in students.into_iter().enumerate() {
        let class_id = class_ids[class_index];
        let student_id: i64 = sqlx::query(
            r#"
            INSERT INTO students (name, roll_no, email, academic_year, branch, class_id)
            VALUES (?, ?, ?, '2024-25', ?, ?)
            ON CONFLICT (roll_no, class_id) DO UPDATE
            SET name = excluded.name, email = excluded.email
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(roll_no)
        .bind(email)
        .bind(branch)
        .bind(class_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("id")?;

        for day in 0..7 {
            let status = match (index * 3 + day) % 10 {
                0 => AttendanceStatus::Absent,
                1 => AttendanceStatus::Late,
                _ => AttendanceStatus::Present,
            };
            let mark = AttendanceMark {
                student_id,
                date: today - Duration::days(day as i64),
                session_time: "09:00-10:00".to_string(),
                status,
                note: String::new(),
            };
            upsert_mark(&mut tx, class_id, teacher_id, &mark).await?;
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub written: usize,
    pub skipped: usize,
    pub classes: BTreeSet<i64>,
}

/// Upserts every row of a CSV export in one transaction. Rows for unknown
/// students are skipped; a row for a class `teacher_id` does not teach
/// aborts the whole import.
pub async fn import_csv(
    pool: &SqlitePool,
    csv_path: &Path,
    teacher_id: i64,
) -> Result<ImportSummary> {
    #[derive(Deserialize)]
    struct CsvRow {
        roll_no: String,
        class_id: i64,
        date: NaiveDate,
        session_time: String,
        status: String,
        note: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|err| ReportError::computation(format!("reading {}", csv_path.display()), err))?;
    let mut summary = ImportSummary::default();
    let mut owned: BTreeSet<i64> = BTreeSet::new();
    let mut tx = pool.begin().await?;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|err| {
            ReportError::computation(format!("csv row {}", line + 1), err)
        })?;
        let status: AttendanceStatus = row.status.parse()?;

        if !owned.contains(&row.class_id) {
            let owner: Option<i64> =
                sqlx::query_scalar("SELECT teacher_id FROM classes WHERE id = ?")
                    .bind(row.class_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if owner != Some(teacher_id) {
                tracing::warn!(class_id = row.class_id, teacher_id, "import into foreign class");
                return Err(ReportError::Forbidden {
                    class_id: row.class_id,
                });
            }
            owned.insert(row.class_id);
        }

        let student_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM students WHERE roll_no = ? AND class_id = ?")
                .bind(&row.roll_no)
                .bind(row.class_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(student_id) = student_id else {
            tracing::warn!(
                roll_no = %row.roll_no,
                class_id = row.class_id,
                "skipping row for unknown student"
            );
            summary.skipped += 1;
            continue;
        };

        let mark = AttendanceMark {
            student_id,
            date: row.date,
            session_time: row.session_time,
            status,
            note: row.note.unwrap_or_default(),
        };
        upsert_mark(&mut tx, row.class_id, teacher_id, &mark).await?;
        summary.written += 1;
        summary.classes.insert(row.class_id);
    }

    tx.commit().await?;
    Ok(summary)
}

/// Writes a batch of marks for one class atomically. Every student must be
/// enrolled in the class.
pub async fn record_attendance(
    pool: &SqlitePool,
    class_id: i64,
    teacher_id: i64,
    marks: &[AttendanceMark],
) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for mark in marks {
        let enrolled: Option<i64> =
            sqlx::query_scalar("SELECT class_id FROM students WHERE id = ?")
                .bind(mark.student_id)
                .fetch_optional(&mut *tx)
                .await?;
        if enrolled != Some(class_id) {
            return Err(ReportError::validation(
                "student_id",
                format!("student {} is not enrolled in class {class_id}", mark.student_id),
            ));
        }
        upsert_mark(&mut tx, class_id, teacher_id, mark).await?;
    }

    tx.commit().await?;
    Ok(marks.len())
}

async fn upsert_mark(
    tx: &mut Transaction<'_, Sqlite>,
    class_id: i64,
    teacher_id: i64,
    mark: &AttendanceMark,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance
        (student_id, class_id, date, session_time, status, note, marked_at, marked_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (student_id, class_id, date, session_time) DO UPDATE
        SET status = excluded.status,
            note = excluded.note,
            marked_at = excluded.marked_at,
            marked_by = excluded.marked_by
        "#,
    )
    .bind(mark.student_id)
    .bind(class_id)
    .bind(mark.date)
    .bind(&mark.session_time)
    .bind(mark.status.as_str())
    .bind(&mark.note)
    .bind(Utc::now())
    .bind(teacher_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn row_to_class(row: &SqliteRow) -> std::result::Result<ClassInfo, sqlx::Error> {
    Ok(ClassInfo {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        section: row.try_get("section")?,
        department: row.try_get("department")?,
        semester: row.try_get("semester")?,
        academic_year: row.try_get("academic_year")?,
        subject: row.try_get("subject")?,
        teacher_id: row.try_get("teacher_id")?,
    })
}

/// The class, if it exists and is taught by `teacher_id`.
pub async fn find_class_for_teacher(
    pool: &SqlitePool,
    class_id: i64,
    teacher_id: i64,
) -> Result<Option<ClassInfo>> {
    let row = timed(
        "find_class_for_teacher",
        sqlx::query(
            "SELECT id, name, section, department, semester, academic_year, subject, teacher_id \
             FROM classes WHERE id = ? AND teacher_id = ?",
        )
        .bind(class_id)
        .bind(teacher_id)
        .fetch_optional(pool),
    )
    .await?;

    Ok(row.as_ref().map(row_to_class).transpose()?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWithCount {
    #[serde(flatten)]
    pub class: ClassInfo,
    pub student_count: i64,
}

pub async fn list_classes_for_teacher(
    pool: &SqlitePool,
    teacher_id: i64,
) -> Result<Vec<ClassWithCount>> {
    let rows = timed(
        "list_classes_for_teacher",
        sqlx::query(
            r#"
            SELECT c.id, c.name, c.section, c.department, c.semester, c.academic_year,
                   c.subject, c.teacher_id, COUNT(s.id) AS student_count
            FROM classes c
            LEFT JOIN students s ON s.class_id = c.id
            WHERE c.teacher_id = ?
            GROUP BY c.id
            ORDER BY c.academic_year DESC, c.department, c.name
            "#,
        )
        .bind(teacher_id)
        .fetch_all(pool),
    )
    .await?;

    let mut classes = Vec::with_capacity(rows.len());
    for row in rows {
        classes.push(ClassWithCount {
            class: row_to_class(&row)?,
            student_count: row.try_get("student_count")?,
        });
    }
    Ok(classes)
}

pub async fn count_students(pool: &SqlitePool, class_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE class_id = ?")
        .bind(class_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
