use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::db::{self, DEFAULT_TEACHER_ID};
use crate::models::AttendanceMark;

pub struct Fixture {
    pub pool: SqlitePool,
    pub class_id: i64,
    pub student_ids: Vec<i64>,
}

pub async fn class(pool: &SqlitePool, name: &str, teacher_id: i64) -> i64 {
    if teacher_id != DEFAULT_TEACHER_ID {
        sqlx::query("INSERT OR IGNORE INTO teachers (id, name, email) VALUES (?, 'Other', ?)")
            .bind(teacher_id)
            .bind(format!("teacher{teacher_id}@school.edu"))
            .execute(pool)
            .await
            .unwrap();
    }
    sqlx::query_scalar(
        "INSERT INTO classes (name, section, department, semester, academic_year, subject, teacher_id) \
         VALUES (?, 'A', 'Computer Science', '1st', '2024-25', 'Algorithms', ?) RETURNING id",
    )
    .bind(name)
    .bind(teacher_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn enroll(fixture: &Fixture, name: &str, roll_no: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO students (name, roll_no, academic_year, branch, class_id) \
         VALUES (?, ?, '2024-25', 'Computer Science', ?) RETURNING id",
    )
    .bind(name)
    .bind(roll_no)
    .bind(fixture.class_id)
    .fetch_one(&fixture.pool)
    .await
    .unwrap()
}

pub async fn mark(fixture: &Fixture, student: usize, date: NaiveDate, session: &str, status: &str) {
    let mark = AttendanceMark {
        student_id: fixture.student_ids[student],
        date,
        session_time: session.to_string(),
        status: status.parse().unwrap(),
        note: String::new(),
    };
    db::record_attendance(&fixture.pool, fixture.class_id, DEFAULT_TEACHER_ID, &[mark])
        .await
        .unwrap();
}

/// Asha attends 2024-09-02..=06, Bruno the first three of those days and
/// Chen none, all in the 09:00-10:00 session.
pub async fn three_students() -> Fixture {
    let pool = db::open_in_memory().await.unwrap();
    let class_id = class(&pool, "Algorithms A", DEFAULT_TEACHER_ID).await;
    let mut fixture = Fixture {
        pool,
        class_id,
        student_ids: Vec::new(),
    };
    for (name, roll_no) in [("Asha", "R001"), ("Bruno", "R002"), ("Chen", "R003")] {
        let id = enroll(&fixture, name, roll_no).await;
        fixture.student_ids.push(id);
    }

    for d in 2..=6 {
        let date = NaiveDate::from_ymd_opt(2024, 9, d).unwrap();
        mark(&fixture, 0, date, "09:00-10:00", "present").await;
        mark(&fixture, 1, date, "09:00-10:00", if d <= 4 { "present" } else { "absent" }).await;
        mark(&fixture, 2, date, "09:00-10:00", "absent").await;
    }
    fixture
}
