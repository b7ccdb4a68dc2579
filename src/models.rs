use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            "excused" => Ok(Self::Excused),
            other => Err(ReportError::validation(
                "status",
                format!("unknown attendance status `{other}`"),
            )),
        }
    }
}

/// A single mark submitted through the write path.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceMark {
    pub student_id: i64,
    pub date: NaiveDate,
    pub session_time: String,
    pub status: AttendanceStatus,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: i64,
    pub name: String,
    pub section: Option<String>,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub subject: Option<String>,
    pub teacher_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ReportError> {
        if from > to {
            return Err(ReportError::validation(
                "date_range",
                format!("start {from} is after end {to}"),
            ));
        }
        Ok(Self { from, to })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

/// Optional narrowing applied on top of class and date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportFilters {
    pub section: Option<String>,
    pub subject: Option<String>,
    pub session_time: Option<String>,
}

impl ReportFilters {
    /// Blank strings behave like absent filters.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            section: keep(self.section),
            subject: keep(self.subject),
            session_time: keep(self.session_time),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    DailySummary,
    StudentWise,
    SessionWise,
    AttendanceTrends,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailySummary => "daily_summary",
            Self::StudentWise => "student_wise",
            Self::SessionWise => "session_wise",
            Self::AttendanceTrends => "attendance_trends",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::DailySummary => "Daily Summary",
            Self::StudentWise => "Student-wise",
            Self::SessionWise => "Session-wise",
            Self::AttendanceTrends => "Attendance Trends",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "daily_summary" => Ok(Self::DailySummary),
            "student_wise" => Ok(Self::StudentWise),
            "session_wise" => Ok(Self::SessionWise),
            "attendance_trends" | "trends" => Ok(Self::AttendanceTrends),
            "" => Err(ReportError::validation(
                "report_type",
                "please select a report type",
            )),
            other => Err(ReportError::validation(
                "report_type",
                format!("invalid report type `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    pub date: NaiveDate,
    pub session_time: String,
    pub total_students: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub excused_count: i64,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAttendanceRow {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub academic_year: Option<String>,
    pub branch: Option<String>,
    pub total_sessions: i64,
    pub present_sessions: i64,
    pub absent_sessions: i64,
    pub late_sessions: i64,
    pub excused_sessions: i64,
    /// `None` when the student has no recorded sessions in scope.
    pub attendance_percentage: Option<f64>,
    pub last_attendance_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_time: String,
    pub total_days: i64,
    pub total_records: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub excused_count: i64,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub date: NaiveDate,
    pub total_records: i64,
    pub present_count: i64,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryStats {
    pub total_days: usize,
    pub total_sessions: usize,
    pub average_attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentWiseStats {
    pub total_students: usize,
    pub average_attendance: f64,
    pub high_attendance: usize,
    pub low_attendance: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWiseStats {
    pub total_sessions: usize,
    pub best_session: Option<SessionRow>,
    pub worst_session: Option<SessionRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub total_days: usize,
    pub trend: TrendDirection,
    pub trend_value: f64,
    pub highest_day: Option<TrendRow>,
    pub lowest_day: Option<TrendRow>,
}

/// Rows and summary for one report shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportBody {
    DailySummary {
        data: Vec<DailySummaryRow>,
        summary: DailySummaryStats,
    },
    StudentWise {
        data: Vec<StudentAttendanceRow>,
        summary: StudentWiseStats,
    },
    SessionWise {
        data: Vec<SessionRow>,
        summary: SessionWiseStats,
    },
    AttendanceTrends {
        data: Vec<TrendRow>,
        summary: TrendStats,
    },
}

impl ReportBody {
    pub fn report_type(&self) -> ReportType {
        match self {
            Self::DailySummary { .. } => ReportType::DailySummary,
            Self::StudentWise { .. } => ReportType::StudentWise,
            Self::SessionWise { .. } => ReportType::SessionWise,
            Self::AttendanceTrends { .. } => ReportType::AttendanceTrends,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::DailySummary { data, .. } => data.len(),
            Self::StudentWise { data, .. } => data.len(),
            Self::SessionWise { data, .. } => data.len(),
            Self::AttendanceTrends { data, .. } => data.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub class_id: i64,
    pub class_name: String,
    pub date_range: DateRange,
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub generated_by: i64,
    pub filters: ReportFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(flatten)]
    pub body: ReportBody,
    pub metadata: ReportMetadata,
}
