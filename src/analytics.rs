//! Dashboard analytics over a trailing window of days.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::aggregate::{self, first_max_by, first_min_by, mean, percentage, StatusCounts};
use crate::db::timed;
use crate::error::Result;
use crate::models::StudentAttendanceRow;
use crate::period::cutoff_date;
use crate::predicate::Predicate;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_STUDENT_LIMIT: i64 = 20;
pub const MIN_SESSIONS_FOR_ALERT: i64 = 5;
const CLASS_PERFORMANCE_LIMIT: usize = 10;
const RECENT_ACTIVITY_LIMIT: i64 = 10;
const TREND_DELTA_POINTS: f64 = 5.0;
const SESSION_SPREAD_POINTS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub total_records: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub excused_count: i64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub session_time: String,
    pub total_records: i64,
    pub present_count: i64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPerformance {
    pub class_id: i64,
    pub class_name: String,
    pub section: Option<String>,
    pub department: Option<String>,
    pub total_records: i64,
    pub present_count: i64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceAnalytics {
    pub class_id: Option<i64>,
    pub days: i64,
    pub since: NaiveDate,
    /// Newest first.
    pub daily_trends: Vec<DailyTrend>,
    pub session_analytics: Vec<SessionAnalytics>,
    pub class_performance: Vec<ClassPerformance>,
}

pub async fn attendance_analytics(
    pool: &SqlitePool,
    class_id: Option<i64>,
    days: i64,
    today: NaiveDate,
) -> Result<AttendanceAnalytics> {
    let since = cutoff_date(today, days)?;
    let mut predicate = Predicate::new().gte("a.date", since);
    if let Some(class_id) = class_id {
        predicate = predicate.eq("a.class_id", class_id);
    }

    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT a.date AS date, COUNT(a.id) AS total_records, ");
    builder.push(aggregate::STATUS_COUNTS);
    builder.push(" FROM attendance a WHERE ");
    predicate.push_to(&mut builder);
    builder.push(" GROUP BY a.date ORDER BY a.date DESC");
    let rows = timed("analytics_daily_trends", builder.build().fetch_all(pool)).await?;

    let mut daily_trends = Vec::with_capacity(rows.len());
    for row in rows {
        let counts = StatusCounts::from_row(&row)?;
        let total_records: i64 = row.try_get("total_records")?;
        daily_trends.push(DailyTrend {
            date: row.try_get("date")?,
            total_records,
            present_count: counts.present,
            absent_count: counts.absent,
            late_count: counts.late,
            excused_count: counts.excused,
            attendance_rate: percentage(counts.present, total_records),
        });
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT a.session_time AS session_time, COUNT(a.id) AS total_records, ",
    );
    builder.push(aggregate::STATUS_COUNTS);
    builder.push(" FROM attendance a WHERE ");
    predicate.push_to(&mut builder);
    builder.push(" GROUP BY a.session_time ORDER BY a.session_time");
    let rows = timed("analytics_sessions", builder.build().fetch_all(pool)).await?;

    let mut session_analytics = Vec::with_capacity(rows.len());
    for row in rows {
        let counts = StatusCounts::from_row(&row)?;
        let total_records: i64 = row.try_get("total_records")?;
        session_analytics.push(SessionAnalytics {
            session_time: row.try_get("session_time")?,
            total_records,
            present_count: counts.present,
            attendance_rate: percentage(counts.present, total_records),
        });
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT c.id AS class_id, c.name AS class_name, c.section AS section, \
         c.department AS department, COUNT(a.id) AS total_records, ",
    );
    builder.push(aggregate::STATUS_COUNTS);
    builder.push(" FROM classes c JOIN attendance a ON a.class_id = c.id AND ");
    predicate.push_to(&mut builder);
    builder.push(" GROUP BY c.id, c.name, c.section, c.department");
    let rows = timed("analytics_class_performance", builder.build().fetch_all(pool)).await?;

    let mut class_performance = Vec::with_capacity(rows.len());
    for row in rows {
        let counts = StatusCounts::from_row(&row)?;
        let total_records: i64 = row.try_get("total_records")?;
        class_performance.push(ClassPerformance {
            class_id: row.try_get("class_id")?,
            class_name: row.try_get("class_name")?,
            section: row.try_get("section")?,
            department: row.try_get("department")?,
            total_records,
            present_count: counts.present,
            attendance_rate: percentage(counts.present, total_records),
        });
    }
    class_performance.sort_by(|a, b| {
        b.attendance_rate
            .total_cmp(&a.attendance_rate)
            .then_with(|| a.class_name.cmp(&b.class_name))
    });
    class_performance.truncate(CLASS_PERFORMANCE_LIMIT);

    Ok(AttendanceAnalytics {
        class_id,
        days,
        since,
        daily_trends,
        session_analytics,
        class_performance,
    })
}

/// Students bucketed by attendance percentage. Students without sessions
/// count as poor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
}

impl Distribution {
    pub fn from_students(students: &[StudentAttendanceRow]) -> Self {
        let mut distribution = Self::default();
        for student in students {
            match student.attendance_percentage.unwrap_or(0.0) {
                pct if pct >= 90.0 => distribution.excellent += 1,
                pct if pct >= 80.0 => distribution.good += 1,
                pct if pct >= 70.0 => distribution.average += 1,
                _ => distribution.poor += 1,
            }
        }
        distribution
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnalytics {
    pub class_id: i64,
    pub students: Vec<StudentAttendanceRow>,
    pub distribution: Distribution,
}

/// Per-student totals over every record in the class, best first.
pub async fn student_analytics(
    pool: &SqlitePool,
    class_id: i64,
    limit: i64,
) -> Result<StudentAnalytics> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT s.id AS student_id, s.name AS name, s.roll_no AS roll_no, \
         s.academic_year AS academic_year, s.branch AS branch, \
         COUNT(a.id) AS total_sessions, MAX(a.date) AS last_attendance_date, ",
    );
    builder.push(aggregate::STATUS_COUNTS);
    builder.push(
        " FROM students s \
         LEFT JOIN attendance a ON a.student_id = s.id AND a.class_id = s.class_id \
         WHERE s.class_id = ",
    );
    builder.push_bind(class_id);
    builder.push(" GROUP BY s.id, s.name, s.roll_no, s.academic_year, s.branch");

    let rows = timed("student_analytics", builder.build().fetch_all(pool)).await?;
    let mut students = rows
        .iter()
        .map(aggregate::student_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    aggregate::sort_students(&mut students);
    students.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));

    let distribution = Distribution::from_students(&students);
    Ok(StudentAnalytics {
        class_id,
        students,
        distribution,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassActivity {
    pub class_id: i64,
    pub name: String,
    pub section: Option<String>,
    pub department: Option<String>,
    pub academic_year: Option<String>,
    pub total_students: i64,
    pub total_records: i64,
    pub present_count: i64,
    /// `None` until the class has any records.
    pub attendance_rate: Option<f64>,
    pub days_with_attendance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSession {
    pub date: NaiveDate,
    pub session_time: String,
    pub class_name: String,
    pub students_marked: i64,
    pub present_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherSummary {
    pub total_classes: usize,
    pub total_students: i64,
    pub average_attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherAnalytics {
    pub teacher_id: i64,
    pub classes: Vec<ClassActivity>,
    pub recent_activity: Vec<RecentSession>,
    pub summary: TeacherSummary,
}

pub async fn teacher_analytics(pool: &SqlitePool, teacher_id: i64) -> Result<TeacherAnalytics> {
    let rows = timed(
        "teacher_class_activity",
        sqlx::query(
            r#"
            SELECT c.id AS class_id, c.name, c.section, c.department, c.academic_year,
                   COUNT(DISTINCT s.id) AS total_students,
                   COUNT(a.id) AS total_records,
                   COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0) AS present_count,
                   COUNT(DISTINCT a.date) AS days_with_attendance
            FROM classes c
            LEFT JOIN students s ON s.class_id = c.id
            LEFT JOIN attendance a ON a.student_id = s.id AND a.class_id = c.id
            WHERE c.teacher_id = ?
            GROUP BY c.id, c.name, c.section, c.department, c.academic_year
            ORDER BY c.name
            "#,
        )
        .bind(teacher_id)
        .fetch_all(pool),
    )
    .await?;

    let mut classes = Vec::with_capacity(rows.len());
    for row in rows {
        let total_records: i64 = row.try_get("total_records")?;
        let present_count: i64 = row.try_get("present_count")?;
        classes.push(ClassActivity {
            class_id: row.try_get("class_id")?,
            name: row.try_get("name")?,
            section: row.try_get("section")?,
            department: row.try_get("department")?,
            academic_year: row.try_get("academic_year")?,
            total_students: row.try_get("total_students")?,
            total_records,
            present_count,
            attendance_rate: (total_records > 0).then(|| percentage(present_count, total_records)),
            days_with_attendance: row.try_get("days_with_attendance")?,
        });
    }

    let rows = timed(
        "teacher_recent_activity",
        sqlx::query(
            r#"
            SELECT a.date, a.session_time, c.name AS class_name,
                   COUNT(*) AS students_marked,
                   SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END) AS present_count
            FROM attendance a
            JOIN classes c ON c.id = a.class_id
            WHERE c.teacher_id = ? AND a.marked_by = ?
            GROUP BY a.date, a.session_time, c.id, c.name
            ORDER BY a.date DESC, a.session_time DESC
            LIMIT ?
            "#,
        )
        .bind(teacher_id)
        .bind(teacher_id)
        .bind(RECENT_ACTIVITY_LIMIT)
        .fetch_all(pool),
    )
    .await?;

    let mut recent_activity = Vec::with_capacity(rows.len());
    for row in rows {
        recent_activity.push(RecentSession {
            date: row.try_get("date")?,
            session_time: row.try_get("session_time")?,
            class_name: row.try_get("class_name")?,
            students_marked: row.try_get("students_marked")?,
            present_count: row.try_get("present_count")?,
        });
    }

    let summary = TeacherSummary {
        total_classes: classes.len(),
        total_students: classes.iter().map(|class| class.total_students).sum(),
        average_attendance_rate: mean(
            classes
                .iter()
                .map(|class| class.attendance_rate.unwrap_or(0.0)),
        ),
    };

    Ok(TeacherAnalytics {
        teacher_id,
        classes,
        recent_activity,
        summary,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowAttendanceStudent {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub class_id: i64,
    pub class_name: String,
    pub section: Option<String>,
    pub total_sessions: i64,
    pub attended_sessions: i64,
    pub attendance_rate: f64,
}

/// Students of `teacher_id` whose present-or-late rate over the window is
/// below `threshold`, worst first. Students with fewer than
/// [`MIN_SESSIONS_FOR_ALERT`] records are left out.
pub async fn low_attendance_students(
    pool: &SqlitePool,
    teacher_id: i64,
    threshold: f64,
    days: i64,
    today: NaiveDate,
) -> Result<Vec<LowAttendanceStudent>> {
    let since = cutoff_date(today, days)?;
    let rows = timed(
        "low_attendance_students",
        sqlx::query(
            r#"
            SELECT s.id AS student_id, s.name, s.roll_no, c.id AS class_id,
                   c.name AS class_name, c.section,
                   COUNT(a.id) AS total_sessions,
                   COALESCE(SUM(CASE WHEN a.status IN ('present', 'late') THEN 1 ELSE 0 END), 0)
                       AS attended_sessions
            FROM students s
            JOIN classes c ON c.id = s.class_id
            LEFT JOIN attendance a
                ON a.student_id = s.id AND a.class_id = c.id AND a.date >= ?
            WHERE c.teacher_id = ?
            GROUP BY s.id, s.name, s.roll_no, c.id, c.name, c.section
            HAVING COUNT(a.id) >= ?
            "#,
        )
        .bind(since)
        .bind(teacher_id)
        .bind(MIN_SESSIONS_FOR_ALERT)
        .fetch_all(pool),
    )
    .await?;

    let mut students = Vec::new();
    for row in rows {
        let total_sessions: i64 = row.try_get("total_sessions")?;
        let attended_sessions: i64 = row.try_get("attended_sessions")?;
        let attendance_rate = percentage(attended_sessions, total_sessions);
        if attendance_rate >= threshold {
            continue;
        }
        students.push(LowAttendanceStudent {
            student_id: row.try_get("student_id")?,
            name: row.try_get("name")?,
            roll_no: row.try_get("roll_no")?,
            class_id: row.try_get("class_id")?,
            class_name: row.try_get("class_name")?,
            section: row.try_get("section")?,
            total_sessions,
            attended_sessions,
            attendance_rate,
        });
    }
    students.sort_by(|a, b| {
        a.attendance_rate
            .total_cmp(&b.attendance_rate)
            .then_with(|| a.roll_no.cmp(&b.roll_no))
    });

    tracing::debug!(teacher_id, threshold, found = students.len(), "low attendance scan");
    Ok(students)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDaySummary {
    pub class_id: i64,
    pub name: String,
    pub section: Option<String>,
    pub subject: Option<String>,
    pub total_students: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub attendance_marked: bool,
    /// Present plus late over enrolled students.
    pub attendance_rate: f64,
}

pub async fn class_attendance_summary(
    pool: &SqlitePool,
    teacher_id: i64,
    date: NaiveDate,
) -> Result<Vec<ClassDaySummary>> {
    let rows = timed(
        "class_attendance_summary",
        sqlx::query(
            r#"
            SELECT c.id AS class_id, c.name, c.section, c.subject,
                   COUNT(DISTINCT s.id) AS total_students,
                   COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0) AS present_count,
                   COALESCE(SUM(CASE WHEN a.status = 'absent' THEN 1 ELSE 0 END), 0) AS absent_count,
                   COALESCE(SUM(CASE WHEN a.status = 'late' THEN 1 ELSE 0 END), 0) AS late_count,
                   COUNT(a.id) AS marked_records
            FROM classes c
            LEFT JOIN students s ON s.class_id = c.id
            LEFT JOIN attendance a ON a.student_id = s.id AND a.class_id = c.id AND a.date = ?
            WHERE c.teacher_id = ?
            GROUP BY c.id, c.name, c.section, c.subject
            ORDER BY c.name, c.section
            "#,
        )
        .bind(date)
        .bind(teacher_id)
        .fetch_all(pool),
    )
    .await?;

    let mut classes = Vec::with_capacity(rows.len());
    for row in rows {
        let total_students: i64 = row.try_get("total_students")?;
        let present_count: i64 = row.try_get("present_count")?;
        let late_count: i64 = row.try_get("late_count")?;
        let marked_records: i64 = row.try_get("marked_records")?;
        classes.push(ClassDaySummary {
            class_id: row.try_get("class_id")?,
            name: row.try_get("name")?,
            section: row.try_get("section")?,
            subject: row.try_get("subject")?,
            total_students,
            present_count,
            absent_count: row.try_get("absent_count")?,
            late_count,
            attendance_marked: marked_records > 0,
            attendance_rate: percentage(present_count + late_count, total_students),
        });
    }
    Ok(classes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_teachers: i64,
    pub total_classes: i64,
    pub total_students: i64,
    pub total_attendance_records: i64,
    pub today_attendance: i64,
    pub active_classes_today: i64,
}

pub async fn system_stats(pool: &SqlitePool, today: NaiveDate) -> Result<SystemStats> {
    let row = timed(
        "system_stats",
        sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM teachers) AS total_teachers,
                (SELECT COUNT(*) FROM classes) AS total_classes,
                (SELECT COUNT(*) FROM students) AS total_students,
                (SELECT COUNT(*) FROM attendance) AS total_attendance_records,
                (SELECT COUNT(*) FROM attendance WHERE date = ?) AS today_attendance,
                (SELECT COUNT(DISTINCT class_id) FROM attendance WHERE date = ?) AS active_classes_today
            "#,
        )
        .bind(today)
        .bind(today)
        .fetch_one(pool),
    )
    .await?;

    Ok(SystemStats {
        total_teachers: row.try_get("total_teachers")?,
        total_classes: row.try_get("total_classes")?,
        total_students: row.try_get("total_students")?,
        total_attendance_records: row.try_get("total_attendance_records")?,
        today_attendance: row.try_get("today_attendance")?,
        active_classes_today: row.try_get("active_classes_today")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Positive,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    pub analytics: AttendanceAnalytics,
}

fn raw_mean(rates: &[DailyTrend]) -> f64 {
    rates.iter().map(|day| day.attendance_rate).sum::<f64>() / rates.len() as f64
}

/// Derives recommendations from the recent trend and the spread between
/// sessions.
pub fn insights(analytics: &AttendanceAnalytics) -> Vec<Insight> {
    let mut insights = Vec::new();

    let trends = &analytics.daily_trends;
    if trends.len() > 7 {
        let recent = raw_mean(&trends[..7]);
        let older = raw_mean(&trends[7..trends.len().min(14)]);
        if recent > older + TREND_DELTA_POINTS {
            insights.push(Insight {
                kind: InsightKind::Positive,
                title: "Improving Attendance Trend".to_string(),
                description: format!(
                    "Attendance has improved by {:.1}% in the last week",
                    recent - older
                ),
                recommendation: "Continue current engagement strategies".to_string(),
            });
        } else if recent < older - TREND_DELTA_POINTS {
            insights.push(Insight {
                kind: InsightKind::Warning,
                title: "Declining Attendance Trend".to_string(),
                description: format!(
                    "Attendance has decreased by {:.1}% in the last week",
                    older - recent
                ),
                recommendation: "Consider reviewing class engagement and reaching out to students"
                    .to_string(),
            });
        }
    }

    let sessions = &analytics.session_analytics;
    if let (Some(best), Some(worst)) = (
        first_max_by(sessions, |s| s.attendance_rate),
        first_min_by(sessions, |s| s.attendance_rate),
    ) {
        let spread = best.attendance_rate - worst.attendance_rate;
        if spread > SESSION_SPREAD_POINTS {
            insights.push(Insight {
                kind: InsightKind::Info,
                title: "Session Performance Variation".to_string(),
                description: format!(
                    "{} has {spread:.1}% better attendance than {}",
                    best.session_time, worst.session_time
                ),
                recommendation: "Consider scheduling important topics during high-attendance sessions"
                    .to_string(),
            });
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::{self, DEFAULT_TEACHER_ID};
    use crate::test_support;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn trend(date: NaiveDate, rate: f64) -> DailyTrend {
        DailyTrend {
            date,
            total_records: 10,
            present_count: 0,
            absent_count: 0,
            late_count: 0,
            excused_count: 0,
            attendance_rate: rate,
        }
    }

    fn session(label: &str, rate: f64) -> SessionAnalytics {
        SessionAnalytics {
            session_time: label.to_string(),
            total_records: 10,
            present_count: 0,
            attendance_rate: rate,
        }
    }

    fn analytics(daily: Vec<DailyTrend>, sessions: Vec<SessionAnalytics>) -> AttendanceAnalytics {
        AttendanceAnalytics {
            class_id: None,
            days: 30,
            since: day(1),
            daily_trends: daily,
            session_analytics: sessions,
            class_performance: Vec::new(),
        }
    }

    fn fortnight(recent: f64, older: f64) -> Vec<DailyTrend> {
        (0..14)
            .map(|offset| {
                let rate = if offset < 7 { recent } else { older };
                trend(day(28) - Duration::days(offset), rate)
            })
            .collect()
    }

    #[test]
    fn improving_trend_needs_more_than_five_points() {
        let found = insights(&analytics(fortnight(86.0, 80.0), Vec::new()));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, InsightKind::Positive);
        assert_eq!(found[0].description, "Attendance has improved by 6.0% in the last week");

        assert!(insights(&analytics(fortnight(85.0, 80.0), Vec::new())).is_empty());
    }

    #[test]
    fn declining_trend_is_a_warning() {
        let found = insights(&analytics(fortnight(70.0, 90.0), Vec::new()));
        assert_eq!(found[0].kind, InsightKind::Warning);
        assert_eq!(found[0].title, "Declining Attendance Trend");
    }

    #[test]
    fn a_single_week_yields_no_trend() {
        let week = fortnight(100.0, 0.0).into_iter().take(7).collect();
        assert!(insights(&analytics(week, Vec::new())).is_empty());
    }

    #[test]
    fn session_spread_over_ten_points_is_reported() {
        let sessions = vec![
            session("09:00-10:00", 90.0),
            session("14:00-15:00", 75.0),
            session("16:00-17:00", 90.0),
        ];
        let found = insights(&analytics(Vec::new(), sessions));
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].description,
            "09:00-10:00 has 15.0% better attendance than 14:00-15:00"
        );

        let close = vec![session("a", 80.0), session("b", 70.0)];
        assert!(insights(&analytics(Vec::new(), close)).is_empty());
    }

    #[test]
    fn distribution_buckets_by_percentage() {
        let row = |pct: Option<f64>| StudentAttendanceRow {
            student_id: 0,
            name: String::new(),
            roll_no: String::new(),
            academic_year: None,
            branch: None,
            total_sessions: 0,
            present_sessions: 0,
            absent_sessions: 0,
            late_sessions: 0,
            excused_sessions: 0,
            attendance_percentage: pct,
            last_attendance_date: None,
        };
        let students = [
            row(Some(90.0)),
            row(Some(89.99)),
            row(Some(80.0)),
            row(Some(70.0)),
            row(Some(69.99)),
            row(None),
        ];
        assert_eq!(
            Distribution::from_students(&students),
            Distribution {
                excellent: 1,
                good: 2,
                average: 1,
                poor: 2,
            }
        );
    }

    #[tokio::test]
    async fn attendance_analytics_covers_window() {
        let fixture = test_support::three_students().await;
        let result = attendance_analytics(&fixture.pool, Some(fixture.class_id), 30, day(10))
            .await
            .unwrap();

        assert_eq!(result.daily_trends.len(), 5);
        assert_eq!(result.daily_trends[0].date, day(6));
        assert_eq!(result.session_analytics.len(), 1);
        assert_eq!(result.session_analytics[0].attendance_rate, 53.33);
        assert_eq!(result.class_performance.len(), 1);

        let narrow = attendance_analytics(&fixture.pool, None, 5, day(10)).await.unwrap();
        assert_eq!(narrow.daily_trends.len(), 2);
    }

    #[tokio::test]
    async fn student_analytics_limits_rows() {
        let fixture = test_support::three_students().await;
        let result = student_analytics(&fixture.pool, fixture.class_id, 2).await.unwrap();
        assert_eq!(result.students.len(), 2);
        assert_eq!(result.students[0].roll_no, "R001");
        assert_eq!(result.distribution.excellent, 1);
        assert_eq!(result.distribution.poor, 1);
    }

    #[tokio::test]
    async fn low_attendance_uses_present_or_late() {
        let fixture = test_support::three_students().await;
        test_support::mark(&fixture, 1, day(5), "09:00-10:00", "late").await;

        let found = low_attendance_students(&fixture.pool, DEFAULT_TEACHER_ID, 75.0, 30, day(10))
            .await
            .unwrap();
        // Bruno is now 4 of 5 (80%) and drops off the list.
        let rolls: Vec<_> = found.iter().map(|s| s.roll_no.as_str()).collect();
        assert_eq!(rolls, ["R003"]);
        assert_eq!(found[0].attendance_rate, 0.0);

        let none = low_attendance_students(&fixture.pool, 99, 75.0, 30, day(10)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn class_summary_rates_against_enrolment() {
        let fixture = test_support::three_students().await;
        test_support::enroll(&fixture, "Dara", "R004").await;

        let summary = class_attendance_summary(&fixture.pool, DEFAULT_TEACHER_ID, day(5))
            .await
            .unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].total_students, 4);
        assert_eq!(summary[0].present_count, 1);
        assert!(summary[0].attendance_marked);
        assert_eq!(summary[0].attendance_rate, 25.0);

        let quiet = class_attendance_summary(&fixture.pool, DEFAULT_TEACHER_ID, day(20))
            .await
            .unwrap();
        assert!(!quiet[0].attendance_marked);
        assert_eq!(quiet[0].attendance_rate, 0.0);
    }

    #[tokio::test]
    async fn teacher_analytics_and_system_stats() {
        let fixture = test_support::three_students().await;
        let other = test_support::class(&fixture.pool, "Elsewhere", 2).await;

        let teacher = teacher_analytics(&fixture.pool, DEFAULT_TEACHER_ID).await.unwrap();
        assert_eq!(teacher.summary.total_classes, 1);
        assert_eq!(teacher.summary.total_students, 3);
        assert_eq!(teacher.classes[0].days_with_attendance, 5);
        assert_eq!(teacher.recent_activity.len(), 5);
        assert_eq!(teacher.recent_activity[0].date, day(6));
        assert!(teacher.classes.iter().all(|c| c.class_id != other));

        let stats = system_stats(&fixture.pool, day(6)).await.unwrap();
        assert_eq!(stats.total_teachers, 2);
        assert_eq!(stats.total_classes, 2);
        assert_eq!(stats.total_attendance_records, 15);
        assert_eq!(stats.today_attendance, 3);
        assert_eq!(stats.active_classes_today, 1);

        let empty = db::open_in_memory().await.unwrap();
        let teacher = teacher_analytics(&empty, DEFAULT_TEACHER_ID).await.unwrap();
        assert_eq!(teacher.summary.average_attendance_rate, 0.0);
    }
}
