//! Authorized, cached entry points over the store and the aggregation layer.

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::aggregate::{self, ReportScope};
use crate::analytics::{
    self, AttendanceAnalytics, ClassDaySummary, InsightReport, LowAttendanceStudent,
    StudentAnalytics, SystemStats, TeacherAnalytics,
};
use crate::cache::{
    cache_key, class_prefix, teacher_pattern, teacher_prefix, CacheRegistry, Pool, PoolStats,
    Scope,
};
use crate::db::{self, ClassWithCount, ImportSummary};
use crate::error::{ReportError, Result};
use crate::models::{AttendanceMark, ClassInfo, Report, ReportFilters, ReportMetadata, ReportType};
use crate::period::{self, RangeKind};

const ANALYTICS_TTL: Duration = Duration::from_secs(600);
const ALL_CLASSES_ANALYTICS: &str = "attendance_analytics:all";
const SYSTEM_STATS: &str = "system_stats";

/// What a caller asks for; everything is validated before any query runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRequest {
    pub class_id: i64,
    pub report_type: String,
    pub range_type: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub filters: ReportFilters,
}

#[derive(Debug, Clone)]
pub struct AttendanceService {
    pool: SqlitePool,
    cache: Arc<CacheRegistry>,
}

fn opt_arg(value: &Option<String>) -> &dyn Display {
    match value {
        Some(value) => value,
        None => &"",
    }
}

impl AttendanceService {
    pub fn new(pool: SqlitePool, cache: Arc<CacheRegistry>) -> Self {
        Self { pool, cache }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<CacheRegistry> {
        &self.cache
    }

    async fn authorize(&self, class_id: i64, teacher_id: i64) -> Result<ClassInfo> {
        let key = cache_key(&class_prefix("class", class_id), &[&teacher_id]);
        let class = self
            .cache
            .pool(Pool::Static)
            .get_or_compute(&key, None, || {
                db::find_class_for_teacher(&self.pool, class_id, teacher_id)
            })
            .await?;

        class.ok_or_else(|| {
            tracing::warn!(class_id, teacher_id, "class access denied");
            ReportError::Forbidden { class_id }
        })
    }

    #[instrument(
        skip(self, request),
        fields(class_id = request.class_id, report = %request.report_type)
    )]
    pub async fn generate_report(
        &self,
        teacher_id: i64,
        request: &ReportRequest,
        today: NaiveDate,
    ) -> Result<Report> {
        let report_type: ReportType = request.report_type.parse()?;
        let kind: RangeKind = request.range_type.parse()?;
        let range = period::resolve(kind, request.start.as_deref(), request.end.as_deref(), today)?;

        let class = self.authorize(request.class_id, teacher_id).await?;
        let scope = ReportScope::new(class.id, range, request.filters.clone());

        let key = cache_key(
            &class_prefix(&format!("report_{report_type}"), class.id),
            &[
                &teacher_id,
                &range.from,
                &range.to,
                opt_arg(&scope.filters.section),
                opt_arg(&scope.filters.subject),
                opt_arg(&scope.filters.session_time),
            ],
        );

        let (pool, scope, class) = (&self.pool, &scope, &class);
        self.cache
            .pool(Pool::Reports)
            .get_or_compute(&key, None, move || async move {
                let body = aggregate::run(pool, report_type, scope).await?;
                tracing::info!(rows = body.row_count(), "report generated");
                Ok(Report {
                    body,
                    metadata: ReportMetadata {
                        class_id: class.id,
                        class_name: class.name.clone(),
                        date_range: range,
                        report_type,
                        generated_at: Utc::now(),
                        generated_by: teacher_id,
                        filters: scope.filters.clone(),
                    },
                })
            })
            .await
    }

    /// Records marks and drops every cached value they could have changed.
    #[instrument(skip(self, marks), fields(marks = marks.len()))]
    pub async fn mark_attendance(
        &self,
        teacher_id: i64,
        class_id: i64,
        marks: &[AttendanceMark],
    ) -> Result<usize> {
        if db::find_class_for_teacher(&self.pool, class_id, teacher_id)
            .await?
            .is_none()
        {
            return Err(ReportError::Forbidden { class_id });
        }

        let written = db::record_attendance(&self.pool, class_id, teacher_id, marks).await?;
        self.invalidate_after_write(teacher_id, [class_id]).await;
        tracing::info!(written, "attendance recorded");
        Ok(written)
    }

    pub async fn import(&self, teacher_id: i64, csv_path: &Path) -> Result<ImportSummary> {
        let summary = db::import_csv(&self.pool, csv_path, teacher_id).await?;
        self.invalidate_after_write(teacher_id, summary.classes.iter().copied())
            .await;
        tracing::info!(written = summary.written, skipped = summary.skipped, "attendance imported");
        Ok(summary)
    }

    async fn invalidate_after_write(
        &self,
        teacher_id: i64,
        classes: impl IntoIterator<Item = i64>,
    ) {
        for class_id in classes {
            self.cache.invalidate_class(class_id).await;
        }
        self.cache
            .invalidate(&teacher_pattern(teacher_id), Scope::All)
            .await;
        self.cache
            .invalidate(&format!("{ALL_CLASSES_ANALYTICS}:"), Scope::Only(Pool::Database))
            .await;
        self.cache
            .invalidate(&format!("{SYSTEM_STATS}:"), Scope::Only(Pool::Api))
            .await;
    }

    pub async fn list_classes(&self, teacher_id: i64) -> Result<Vec<ClassWithCount>> {
        let key = cache_key(&teacher_prefix("classes", teacher_id), &[]);
        self.cache
            .pool(Pool::Static)
            .get_or_compute(&key, None, || {
                db::list_classes_for_teacher(&self.pool, teacher_id)
            })
            .await
    }

    /// Analytics for one owned class, or for every class when `class_id` is `None`.
    pub async fn attendance_analytics(
        &self,
        teacher_id: i64,
        class_id: Option<i64>,
        days: i64,
        today: NaiveDate,
    ) -> Result<AttendanceAnalytics> {
        period::cutoff_date(today, days)?;
        let prefix = match class_id {
            Some(class_id) => {
                self.authorize(class_id, teacher_id).await?;
                class_prefix("attendance_analytics", class_id)
            }
            None => ALL_CLASSES_ANALYTICS.to_string(),
        };
        let key = cache_key(&prefix, &[&days, &today]);

        self.cache
            .pool(Pool::Database)
            .get_or_compute(&key, Some(ANALYTICS_TTL), || {
                analytics::attendance_analytics(&self.pool, class_id, days, today)
            })
            .await
    }

    pub async fn insights(
        &self,
        teacher_id: i64,
        class_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<InsightReport> {
        let analytics = self
            .attendance_analytics(teacher_id, class_id, analytics::DEFAULT_WINDOW_DAYS, today)
            .await?;
        Ok(InsightReport {
            insights: analytics::insights(&analytics),
            analytics,
        })
    }

    pub async fn student_analytics(
        &self,
        teacher_id: i64,
        class_id: i64,
        limit: i64,
    ) -> Result<StudentAnalytics> {
        self.authorize(class_id, teacher_id).await?;
        let key = cache_key(&class_prefix("student_analytics", class_id), &[&limit]);

        self.cache
            .pool(Pool::Database)
            .get_or_compute(&key, None, || {
                analytics::student_analytics(&self.pool, class_id, limit)
            })
            .await
    }

    pub async fn teacher_analytics(&self, teacher_id: i64) -> Result<TeacherAnalytics> {
        let key = cache_key(&teacher_prefix("teacher_analytics", teacher_id), &[]);
        self.cache
            .pool(Pool::Database)
            .get_or_compute(&key, Some(ANALYTICS_TTL), || {
                analytics::teacher_analytics(&self.pool, teacher_id)
            })
            .await
    }

    pub async fn low_attendance(
        &self,
        teacher_id: i64,
        threshold: f64,
        days: i64,
        today: NaiveDate,
    ) -> Result<Vec<LowAttendanceStudent>> {
        if !(0.0..=100.0).contains(&threshold) {
            return Err(ReportError::validation(
                "threshold",
                format!("threshold {threshold} must be between 0 and 100"),
            ));
        }
        period::cutoff_date(today, days)?;
        let key = cache_key(
            &teacher_prefix("low_attendance", teacher_id),
            &[&threshold, &days, &today],
        );

        self.cache
            .pool(Pool::Database)
            .get_or_compute(&key, None, || {
                analytics::low_attendance_students(&self.pool, teacher_id, threshold, days, today)
            })
            .await
    }

    pub async fn class_summary(
        &self,
        teacher_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<ClassDaySummary>> {
        let key = cache_key(&teacher_prefix("class_summary", teacher_id), &[&date]);
        self.cache
            .pool(Pool::Api)
            .get_or_compute(&key, None, || {
                analytics::class_attendance_summary(&self.pool, teacher_id, date)
            })
            .await
    }

    pub async fn system_stats(&self, today: NaiveDate) -> Result<SystemStats> {
        let key = cache_key(SYSTEM_STATS, &[&today]);
        self.cache
            .pool(Pool::Api)
            .get_or_compute(&key, None, || analytics::system_stats(&self.pool, today))
            .await
    }

    pub async fn cache_stats(&self) -> Vec<PoolStats> {
        self.cache.stats().await
    }
}
