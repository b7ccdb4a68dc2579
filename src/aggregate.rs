//! Attendance report aggregation.
//!
//! Counts come from SQL; percentages, ordering and summaries are computed
//! here so rounding is exact and identical across report shapes.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::Instrument;

use crate::db::timed;
use crate::error::Result;
use crate::models::{
    DailySummaryRow, DailySummaryStats, DateRange, ReportBody, ReportFilters, ReportType,
    SessionRow, SessionWiseStats, StudentAttendanceRow, StudentWiseStats, TrendDirection,
    TrendRow, TrendStats,
};
use crate::predicate::Predicate;

pub const HIGH_ATTENDANCE_THRESHOLD: f64 = 90.0;
pub const LOW_ATTENDANCE_THRESHOLD: f64 = 75.0;

pub(crate) const STATUS_COUNTS: &str = "\
    COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0) AS present_count, \
    COALESCE(SUM(CASE WHEN a.status = 'absent' THEN 1 ELSE 0 END), 0) AS absent_count, \
    COALESCE(SUM(CASE WHEN a.status = 'late' THEN 1 ELSE 0 END), 0) AS late_count, \
    COALESCE(SUM(CASE WHEN a.status = 'excused' THEN 1 ELSE 0 END), 0) AS excused_count";

/// Class, date range and optional filters shared by every report shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportScope {
    pub class_id: i64,
    pub range: DateRange,
    pub filters: ReportFilters,
}

impl ReportScope {
    pub fn new(class_id: i64, range: DateRange, filters: ReportFilters) -> Self {
        Self {
            class_id,
            range,
            filters: filters.normalized(),
        }
    }

    /// Conditions on `attendance a` joined with `classes c`.
    pub fn attendance_predicate(&self) -> Predicate {
        Predicate::new()
            .eq("a.class_id", self.class_id)
            .gte("a.date", self.range.from)
            .lte("a.date", self.range.to)
            .eq_opt("c.section", self.filters.section.as_deref())
            .eq_opt("c.subject", self.filters.subject.as_deref())
            .eq_opt("a.session_time", self.filters.session_time.as_deref())
    }
}

/// `part * 100 / total` rounded half up to two decimals; 0 when `total` is 0.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 || part <= 0 {
        return 0.0;
    }
    let hundredths = (part * 20_000 + total) / (2 * total);
    hundredths as f64 / 100.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        round2(sum / count as f64)
    }
}

/// First element with the greatest key, scanning left to right.
pub fn first_max_by<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<&T> {
    let mut best: Option<&T> = None;
    for item in items {
        match best {
            Some(current) if key(item) <= key(current) => {}
            _ => best = Some(item),
        }
    }
    best
}

/// First element with the smallest key, scanning left to right.
pub fn first_min_by<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<&T> {
    let mut worst: Option<&T> = None;
    for item in items {
        match worst {
            Some(current) if key(item) >= key(current) => {}
            _ => worst = Some(item),
        }
    }
    worst
}

pub(crate) struct StatusCounts {
    pub(crate) present: i64,
    pub(crate) absent: i64,
    pub(crate) late: i64,
    pub(crate) excused: i64,
}

impl StatusCounts {
    pub(crate) fn from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            present: row.try_get("present_count")?,
            absent: row.try_get("absent_count")?,
            late: row.try_get("late_count")?,
            excused: row.try_get("excused_count")?,
        })
    }
}

fn attendance_select(columns: &str) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT ");
    builder.push(columns);
    builder.push(", ");
    builder.push(STATUS_COUNTS);
    builder.push(" FROM attendance a JOIN classes c ON c.id = a.class_id WHERE ");
    builder
}

/// One row per (date, session) with at least one record, newest first.
pub async fn daily_summary(pool: &SqlitePool, scope: &ReportScope) -> Result<Vec<DailySummaryRow>> {
    let mut builder = attendance_select(
        "a.date AS date, a.session_time AS session_time, \
         COUNT(DISTINCT a.student_id) AS total_students",
    );
    scope.attendance_predicate().push_to(&mut builder);
    builder.push(" GROUP BY a.date, a.session_time ORDER BY a.date DESC, a.session_time");

    let rows = timed("daily_summary", builder.build().fetch_all(pool)).await?;
    let mut summary = Vec::with_capacity(rows.len());
    for row in rows {
        let counts = StatusCounts::from_row(&row)?;
        let total_students: i64 = row.try_get("total_students")?;
        summary.push(DailySummaryRow {
            date: row.try_get("date")?,
            session_time: row.try_get("session_time")?,
            total_students,
            present_count: counts.present,
            absent_count: counts.absent,
            late_count: counts.late,
            excused_count: counts.excused,
            attendance_percentage: percentage(counts.present, total_students),
        });
    }
    Ok(summary)
}

pub fn summarize_daily(rows: &[DailySummaryRow]) -> DailySummaryStats {
    let days: BTreeSet<_> = rows.iter().map(|row| row.date).collect();
    DailySummaryStats {
        total_days: days.len(),
        total_sessions: rows.len(),
        average_attendance: mean(rows.iter().map(|row| row.attendance_percentage)),
    }
}

/// One row per enrolled student, including students with no records in scope.
///
/// Ordered by percentage descending (students without sessions last), then
/// by roll number.
pub async fn student_wise(
    pool: &SqlitePool,
    scope: &ReportScope,
) -> Result<Vec<StudentAttendanceRow>> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT s.id AS student_id, s.name AS name, s.roll_no AS roll_no, \
         s.academic_year AS academic_year, s.branch AS branch, \
         COUNT(a.id) AS total_sessions, MAX(a.date) AS last_attendance_date, ",
    );
    builder.push(STATUS_COUNTS);
    builder.push(
        " FROM students s \
         JOIN classes c ON c.id = s.class_id \
         LEFT JOIN attendance a ON a.student_id = s.id AND ",
    );
    scope.attendance_predicate().push_to(&mut builder);
    builder.push(" WHERE s.class_id = ");
    builder.push_bind(scope.class_id);
    builder.push(" GROUP BY s.id, s.name, s.roll_no, s.academic_year, s.branch");

    let rows = timed("student_wise", builder.build().fetch_all(pool)).await?;
    let mut students = rows
        .iter()
        .map(student_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    sort_students(&mut students);
    Ok(students)
}

pub(crate) fn student_row(
    row: &SqliteRow,
) -> std::result::Result<StudentAttendanceRow, sqlx::Error> {
    let counts = StatusCounts::from_row(row)?;
    let total_sessions: i64 = row.try_get("total_sessions")?;
    Ok(StudentAttendanceRow {
        student_id: row.try_get("student_id")?,
        name: row.try_get("name")?,
        roll_no: row.try_get("roll_no")?,
        academic_year: row.try_get("academic_year")?,
        branch: row.try_get("branch")?,
        total_sessions,
        present_sessions: counts.present,
        absent_sessions: counts.absent,
        late_sessions: counts.late,
        excused_sessions: counts.excused,
        attendance_percentage: (total_sessions > 0)
            .then(|| percentage(counts.present, total_sessions)),
        last_attendance_date: row.try_get("last_attendance_date")?,
    })
}

pub(crate) fn sort_students(students: &mut [StudentAttendanceRow]) {
    students.sort_by(|a, b| {
        let by_percentage = match (a.attendance_percentage, b.attendance_percentage) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_percentage.then_with(|| a.roll_no.cmp(&b.roll_no))
    });
}

pub fn summarize_students(rows: &[StudentAttendanceRow]) -> StudentWiseStats {
    let effective = |row: &StudentAttendanceRow| row.attendance_percentage.unwrap_or(0.0);
    StudentWiseStats {
        total_students: rows.len(),
        average_attendance: mean(rows.iter().map(effective)),
        high_attendance: rows
            .iter()
            .filter(|row| effective(row) >= HIGH_ATTENDANCE_THRESHOLD)
            .count(),
        low_attendance: rows
            .iter()
            .filter(|row| effective(row) < LOW_ATTENDANCE_THRESHOLD)
            .count(),
    }
}

/// One row per session label across every matching date.
pub async fn session_wise(pool: &SqlitePool, scope: &ReportScope) -> Result<Vec<SessionRow>> {
    let mut builder = attendance_select(
        "a.session_time AS session_time, COUNT(DISTINCT a.date) AS total_days, \
         COUNT(a.id) AS total_records",
    );
    scope.attendance_predicate().push_to(&mut builder);
    builder.push(" GROUP BY a.session_time ORDER BY a.session_time");

    let rows = timed("session_wise", builder.build().fetch_all(pool)).await?;
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        let counts = StatusCounts::from_row(&row)?;
        let total_records: i64 = row.try_get("total_records")?;
        sessions.push(SessionRow {
            session_time: row.try_get("session_time")?,
            total_days: row.try_get("total_days")?,
            total_records,
            present_count: counts.present,
            absent_count: counts.absent,
            late_count: counts.late,
            excused_count: counts.excused,
            attendance_percentage: percentage(counts.present, total_records),
        });
    }
    Ok(sessions)
}

pub fn summarize_sessions(rows: &[SessionRow]) -> SessionWiseStats {
    SessionWiseStats {
        total_sessions: rows.len(),
        best_session: first_max_by(rows, |row| row.attendance_percentage).cloned(),
        worst_session: first_min_by(rows, |row| row.attendance_percentage).cloned(),
    }
}

/// One row per date with records, oldest first.
pub async fn trends(pool: &SqlitePool, scope: &ReportScope) -> Result<Vec<TrendRow>> {
    let mut builder = attendance_select("a.date AS date, COUNT(a.id) AS total_records");
    scope.attendance_predicate().push_to(&mut builder);
    builder.push(" GROUP BY a.date ORDER BY a.date");

    let rows = timed("attendance_trends", builder.build().fetch_all(pool)).await?;
    let mut days = Vec::with_capacity(rows.len());
    for row in rows {
        let counts = StatusCounts::from_row(&row)?;
        let total_records: i64 = row.try_get("total_records")?;
        days.push(TrendRow {
            date: row.try_get("date")?,
            total_records,
            present_count: counts.present,
            attendance_percentage: percentage(counts.present, total_records),
        });
    }
    Ok(days)
}

pub fn summarize_trends(rows: &[TrendRow]) -> TrendStats {
    let delta = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) if rows.len() > 1 => {
            round2(last.attendance_percentage - first.attendance_percentage)
        }
        _ => 0.0,
    };
    let trend = if delta > 0.0 {
        TrendDirection::Improving
    } else if delta < 0.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    TrendStats {
        total_days: rows.len(),
        trend,
        trend_value: delta.abs(),
        highest_day: first_max_by(rows, |row| row.attendance_percentage).cloned(),
        lowest_day: first_min_by(rows, |row| row.attendance_percentage).cloned(),
    }
}

/// Runs the query for `report_type` and attaches its summary.
pub async fn run(
    pool: &SqlitePool,
    report_type: ReportType,
    scope: &ReportScope,
) -> Result<ReportBody> {
    let span = tracing::debug_span!("aggregate", report = %report_type, class_id = scope.class_id);
    aggregate(pool, report_type, scope).instrument(span).await
}

async fn aggregate(
    pool: &SqlitePool,
    report_type: ReportType,
    scope: &ReportScope,
) -> Result<ReportBody> {
    let body = match report_type {
        ReportType::DailySummary => {
            let data = daily_summary(pool, scope).await?;
            let summary = summarize_daily(&data);
            ReportBody::DailySummary { data, summary }
        }
        ReportType::StudentWise => {
            let data = student_wise(pool, scope).await?;
            let summary = summarize_students(&data);
            ReportBody::StudentWise { data, summary }
        }
        ReportType::SessionWise => {
            let data = session_wise(pool, scope).await?;
            let summary = summarize_sessions(&data);
            ReportBody::SessionWise { data, summary }
        }
        ReportType::AttendanceTrends => {
            let data = trends(pool, scope).await?;
            let summary = summarize_trends(&data);
            ReportBody::AttendanceTrends { data, summary }
        }
    };

    tracing::debug!(rows = body.row_count(), "report aggregated");
    Ok(body)
}
