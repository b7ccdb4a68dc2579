use std::fmt::Write;

use clap::ValueEnum;

use crate::analytics::{AttendanceAnalytics, InsightReport};
use crate::error::{ReportError, Result};
use crate::models::{Report, ReportBody, ReportFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
    Csv,
}

pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(render_markdown(report)),
        OutputFormat::Json => render_json(report),
        OutputFormat::Csv => render_csv(report),
    }
}

/// Analytics in the requested format. CSV carries the daily trends only.
pub fn render_analytics(analytics: &AttendanceAnalytics, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(render_analytics_markdown(analytics)),
        OutputFormat::Json => render_json(analytics),
        OutputFormat::Csv => render_analytics_csv(analytics),
    }
}

pub fn render_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|err| ReportError::computation("json output", err))
}

fn pct(value: f64) -> String {
    format!("{value:.2}%")
}

fn opt_pct(value: Option<f64>) -> String {
    value.map(pct).unwrap_or_else(|| "n/a".to_string())
}

fn opt_text(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn filter_line(filters: &ReportFilters) -> String {
    let mut parts = Vec::new();
    if let Some(section) = &filters.section {
        parts.push(format!("section {section}"));
    }
    if let Some(subject) = &filters.subject {
        parts.push(format!("subject {subject}"));
    }
    if let Some(session) = &filters.session_time {
        parts.push(format!("session {session}"));
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn render_markdown(report: &Report) -> String {
    let meta = &report.metadata;
    let mut output = String::new();

    let _ = writeln!(output, "# {} Report: {}", meta.report_type.title(), meta.class_name);
    let _ = writeln!(output, "Period {} (class {})", meta.date_range, meta.class_id);
    let _ = writeln!(output, "Filters: {}", filter_line(&meta.filters));
    let _ = writeln!(
        output,
        "Generated {} by teacher {}",
        meta.generated_at.format("%Y-%m-%d %H:%M UTC"),
        meta.generated_by
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    match &report.body {
        ReportBody::DailySummary { data, summary } => {
            let _ = writeln!(output, "- Days with attendance: {}", summary.total_days);
            let _ = writeln!(output, "- Sessions: {}", summary.total_sessions);
            let _ = writeln!(output, "- Average attendance: {}", pct(summary.average_attendance));
            let _ = writeln!(output);
            let _ = writeln!(output, "## Sessions");
            if data.is_empty() {
                let _ = writeln!(output, "No attendance recorded for this period.");
            } else {
                let _ = writeln!(
                    output,
                    "| Date | Session | Students | Present | Absent | Late | Excused | Rate |"
                );
                let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
                for row in data {
                    let _ = writeln!(
                        output,
                        "| {} | {} | {} | {} | {} | {} | {} | {} |",
                        row.date,
                        row.session_time,
                        row.total_students,
                        row.present_count,
                        row.absent_count,
                        row.late_count,
                        row.excused_count,
                        pct(row.attendance_percentage)
                    );
                }
            }
        }
        ReportBody::StudentWise { data, summary } => {
            let _ = writeln!(output, "- Students: {}", summary.total_students);
            let _ = writeln!(output, "- Average attendance: {}", pct(summary.average_attendance));
            let _ = writeln!(output, "- At or above 90%: {}", summary.high_attendance);
            let _ = writeln!(output, "- Below 75%: {}", summary.low_attendance);
            let _ = writeln!(output);
            let _ = writeln!(output, "## Students");
            if data.is_empty() {
                let _ = writeln!(output, "No students enrolled in this class.");
            } else {
                let _ = writeln!(
                    output,
                    "| Roll | Name | Sessions | Present | Absent | Late | Excused | Rate | Last seen |"
                );
                let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
                for row in data {
                    let last = row
                        .last_attendance_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let _ = writeln!(
                        output,
                        "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                        row.roll_no,
                        row.name,
                        row.total_sessions,
                        row.present_sessions,
                        row.absent_sessions,
                        row.late_sessions,
                        row.excused_sessions,
                        opt_pct(row.attendance_percentage),
                        last
                    );
                }
            }
        }
        ReportBody::SessionWise { data, summary } => {
            let _ = writeln!(output, "- Sessions: {}", summary.total_sessions);
            match (&summary.best_session, &summary.worst_session) {
                (Some(best), Some(worst)) => {
                    let _ = writeln!(
                        output,
                        "- Best: {} ({})",
                        best.session_time,
                        pct(best.attendance_percentage)
                    );
                    let _ = writeln!(
                        output,
                        "- Worst: {} ({})",
                        worst.session_time,
                        pct(worst.attendance_percentage)
                    );
                }
                _ => {
                    let _ = writeln!(output, "- Best and worst: n/a");
                }
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "## Sessions");
            if data.is_empty() {
                let _ = writeln!(output, "No attendance recorded for this period.");
            } else {
                let _ = writeln!(
                    output,
                    "| Session | Days | Records | Present | Absent | Late | Excused | Rate |"
                );
                let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
                for row in data {
                    let _ = writeln!(
                        output,
                        "| {} | {} | {} | {} | {} | {} | {} | {} |",
                        row.session_time,
                        row.total_days,
                        row.total_records,
                        row.present_count,
                        row.absent_count,
                        row.late_count,
                        row.excused_count,
                        pct(row.attendance_percentage)
                    );
                }
            }
        }
        ReportBody::AttendanceTrends { data, summary } => {
            let _ = writeln!(output, "- Days: {}", summary.total_days);
            let _ = writeln!(
                output,
                "- Trend: {} ({:.2} points)",
                summary.trend, summary.trend_value
            );
            if let Some(day) = &summary.highest_day {
                let _ = writeln!(
                    output,
                    "- Highest: {} ({})",
                    day.date,
                    pct(day.attendance_percentage)
                );
            }
            if let Some(day) = &summary.lowest_day {
                let _ = writeln!(
                    output,
                    "- Lowest: {} ({})",
                    day.date,
                    pct(day.attendance_percentage)
                );
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "## Days");
            if data.is_empty() {
                let _ = writeln!(output, "No attendance recorded for this period.");
            } else {
                let _ = writeln!(output, "| Date | Records | Present | Rate |");
                let _ = writeln!(output, "|---|---|---|---|");
                for row in data {
                    let _ = writeln!(
                        output,
                        "| {} | {} | {} | {} |",
                        row.date,
                        row.total_records,
                        row.present_count,
                        pct(row.attendance_percentage)
                    );
                }
            }
        }
    }

    output
}

fn csv_err(err: csv::Error) -> ReportError {
    ReportError::computation("csv output", err)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|err| ReportError::computation("csv output", err.into_error()))?;
    String::from_utf8(bytes).map_err(|err| ReportError::computation("csv output", err))
}

/// Header row plus one record per data row.
pub fn render_csv(report: &Report) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    match &report.body {
        ReportBody::DailySummary { data, .. } => {
            writer
                .write_record([
                    "date",
                    "session_time",
                    "total_students",
                    "present",
                    "absent",
                    "late",
                    "excused",
                    "attendance_percentage",
                ])
                .map_err(csv_err)?;
            for row in data {
                writer
                    .write_record([
                        row.date.to_string(),
                        row.session_time.clone(),
                        row.total_students.to_string(),
                        row.present_count.to_string(),
                        row.absent_count.to_string(),
                        row.late_count.to_string(),
                        row.excused_count.to_string(),
                        format!("{:.2}", row.attendance_percentage),
                    ])
                    .map_err(csv_err)?;
            }
        }
        ReportBody::StudentWise { data, .. } => {
            writer
                .write_record([
                    "roll_no",
                    "name",
                    "academic_year",
                    "branch",
                    "total_sessions",
                    "present",
                    "absent",
                    "late",
                    "excused",
                    "attendance_percentage",
                    "last_attendance_date",
                ])
                .map_err(csv_err)?;
            for row in data {
                writer
                    .write_record([
                        row.roll_no.clone(),
                        row.name.clone(),
                        opt_text(row.academic_year.as_deref()).to_string(),
                        opt_text(row.branch.as_deref()).to_string(),
                        row.total_sessions.to_string(),
                        row.present_sessions.to_string(),
                        row.absent_sessions.to_string(),
                        row.late_sessions.to_string(),
                        row.excused_sessions.to_string(),
                        row.attendance_percentage
                            .map(|p| format!("{p:.2}"))
                            .unwrap_or_default(),
                        row.last_attendance_date
                            .map(|d| d.to_string())
                            .unwrap_or_default(),
                    ])
                    .map_err(csv_err)?;
            }
        }
        ReportBody::SessionWise { data, .. } => {
            writer
                .write_record([
                    "session_time",
                    "total_days",
                    "total_records",
                    "present",
                    "absent",
                    "late",
                    "excused",
                    "attendance_percentage",
                ])
                .map_err(csv_err)?;
            for row in data {
                writer
                    .write_record([
                        row.session_time.clone(),
                        row.total_days.to_string(),
                        row.total_records.to_string(),
                        row.present_count.to_string(),
                        row.absent_count.to_string(),
                        row.late_count.to_string(),
                        row.excused_count.to_string(),
                        format!("{:.2}", row.attendance_percentage),
                    ])
                    .map_err(csv_err)?;
            }
        }
        ReportBody::AttendanceTrends { data, .. } => {
            writer
                .write_record(["date", "total_records", "present", "attendance_percentage"])
                .map_err(csv_err)?;
            for row in data {
                writer
                    .write_record([
                        row.date.to_string(),
                        row.total_records.to_string(),
                        row.present_count.to_string(),
                        format!("{:.2}", row.attendance_percentage),
                    ])
                    .map_err(csv_err)?;
            }
        }
    }

    finish_csv(writer)
}

/// Daily trends as a spreadsheet export, in the order the analytics hold them.
pub fn render_analytics_csv(analytics: &AttendanceAnalytics) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "Date",
            "Total Records",
            "Present",
            "Absent",
            "Late",
            "Excused",
            "Attendance Rate %",
        ])
        .map_err(csv_err)?;
    for day in &analytics.daily_trends {
        writer
            .write_record([
                day.date.to_string(),
                day.total_records.to_string(),
                day.present_count.to_string(),
                day.absent_count.to_string(),
                day.late_count.to_string(),
                day.excused_count.to_string(),
                format!("{:.2}", day.attendance_rate),
            ])
            .map_err(csv_err)?;
    }
    finish_csv(writer)
}

pub fn render_analytics_markdown(analytics: &AttendanceAnalytics) -> String {
    let mut output = String::new();
    let scope = analytics
        .class_id
        .map(|id| format!("class {id}"))
        .unwrap_or_else(|| "all classes".to_string());

    let _ = writeln!(output, "# Attendance Analytics");
    let _ = writeln!(
        output,
        "Generated for {} over {} days (since {})",
        scope, analytics.days, analytics.since
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Trends");
    if analytics.daily_trends.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this window.");
    } else {
        for day in &analytics.daily_trends {
            let _ = writeln!(
                output,
                "- {}: {} of {} present, {} absent, {} late, {} excused ({})",
                day.date,
                day.present_count,
                day.total_records,
                day.absent_count,
                day.late_count,
                day.excused_count,
                pct(day.attendance_rate)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sessions");
    if analytics.session_analytics.is_empty() {
        let _ = writeln!(output, "No sessions recorded for this window.");
    } else {
        for session in &analytics.session_analytics {
            let _ = writeln!(
                output,
                "- {}: {} of {} present ({})",
                session.session_time,
                session.present_count,
                session.total_records,
                pct(session.attendance_rate)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Classes");
    if analytics.class_performance.is_empty() {
        let _ = writeln!(output, "No classes with attendance in this window.");
    } else {
        for class in &analytics.class_performance {
            let _ = writeln!(
                output,
                "- {} ({}, {}) {} across {} records",
                class.class_name,
                opt_text(class.section.as_deref()),
                opt_text(class.department.as_deref()),
                pct(class.attendance_rate),
                class.total_records
            );
        }
    }

    output
}

pub fn render_insights_markdown(report: &InsightReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Attendance Insights");
    let _ = writeln!(output);

    if report.insights.is_empty() {
        let _ = writeln!(
            output,
            "No notable changes in the last {} days.",
            report.analytics.days
        );
    } else {
        for insight in &report.insights {
            let _ = writeln!(output, "## {}", insight.title);
            let _ = writeln!(output, "{}", insight.description);
            let _ = writeln!(output, "Recommendation: {}", insight.recommendation);
            let _ = writeln!(output);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::analytics::DailyTrend;
    use crate::models::{
        DateRange, ReportMetadata, ReportType, SessionWiseStats, StudentAttendanceRow,
        StudentWiseStats,
    };

    fn metadata(report_type: ReportType) -> ReportMetadata {
        let day = |d| NaiveDate::from_ymd_opt(2024, 9, d).unwrap();
        ReportMetadata {
            class_id: 7,
            class_name: "Algorithms A".to_string(),
            date_range: DateRange::new(day(1), day(30)).unwrap(),
            report_type,
            generated_at: Utc.with_ymd_and_hms(2024, 9, 30, 12, 0, 0).unwrap(),
            generated_by: 1,
            filters: ReportFilters {
                section: Some("A".to_string()),
                ..ReportFilters::default()
            },
        }
    }

    fn student_report() -> Report {
        let student = StudentAttendanceRow {
            student_id: 1,
            name: "Asha".to_string(),
            roll_no: "R001".to_string(),
            academic_year: Some("2024-25".to_string()),
            branch: None,
            total_sessions: 0,
            present_sessions: 0,
            absent_sessions: 0,
            late_sessions: 0,
            excused_sessions: 0,
            attendance_percentage: None,
            last_attendance_date: None,
        };
        Report {
            body: ReportBody::StudentWise {
                data: vec![student],
                summary: StudentWiseStats {
                    total_students: 1,
                    average_attendance: 0.0,
                    high_attendance: 0,
                    low_attendance: 1,
                },
            },
            metadata: metadata(ReportType::StudentWise),
        }
    }

    #[test]
    fn markdown_includes_metadata_and_rows() {
        let output = render_markdown(&student_report());
        assert!(output.starts_with("# Student-wise Report: Algorithms A"));
        assert!(output.contains("Period 2024-09-01 to 2024-09-30 (class 7)"));
        assert!(output.contains("Filters: section A"));
        assert!(output.contains("| R001 | Asha | 0 | 0 | 0 | 0 | 0 | n/a | - |"));
    }

    #[test]
    fn empty_session_report_has_no_best_or_worst() {
        let report = Report {
            body: ReportBody::SessionWise {
                data: Vec::new(),
                summary: SessionWiseStats {
                    total_sessions: 0,
                    best_session: None,
                    worst_session: None,
                },
            },
            metadata: metadata(ReportType::SessionWise),
        };
        let output = render_markdown(&report);
        assert!(output.contains("- Best and worst: n/a"));
        assert!(output.contains("No attendance recorded for this period."));

        let json = render_json(&report).unwrap();
        assert!(json.contains("\"best_session\": null"));
        assert!(json.contains("\"type\": \"session_wise\""));
    }

    #[test]
    fn csv_leaves_missing_values_blank() {
        let output = render_csv(&student_report()).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some(
                "roll_no,name,academic_year,branch,total_sessions,present,absent,late,excused,\
                 attendance_percentage,last_attendance_date"
            )
        );
        assert_eq!(lines.next(), Some("R001,Asha,2024-25,-,0,0,0,0,0,,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn cached_json_decodes_to_the_same_report() {
        let report = student_report();
        let json = render_json(&report).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn analytics_csv_lists_daily_trends() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 9, d).unwrap();
        let analytics = AttendanceAnalytics {
            class_id: Some(7),
            days: 30,
            since: day(1),
            daily_trends: vec![
                DailyTrend {
                    date: day(6),
                    total_records: 3,
                    present_count: 1,
                    absent_count: 2,
                    late_count: 0,
                    excused_count: 0,
                    attendance_rate: 33.33,
                },
                DailyTrend {
                    date: day(5),
                    total_records: 4,
                    present_count: 2,
                    absent_count: 1,
                    late_count: 0,
                    excused_count: 1,
                    attendance_rate: 50.0,
                },
            ],
            session_analytics: Vec::new(),
            class_performance: Vec::new(),
        };

        let output = render_analytics(&analytics, OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            [
                "Date,Total Records,Present,Absent,Late,Excused,Attendance Rate %",
                "2024-09-06,3,1,2,0,0,33.33",
                "2024-09-05,4,2,1,0,1,50.00",
            ]
        );
    }
}
