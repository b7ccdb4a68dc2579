use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::builder::RangedI64ValueParser;
use clap::{Parser, Subcommand};

use classroom_attendance::analytics::{DEFAULT_STUDENT_LIMIT, DEFAULT_WINDOW_DAYS};
use classroom_attendance::cache::{CacheConfig, CacheRegistry};
use classroom_attendance::config::Settings;
use classroom_attendance::models::{AttendanceMark, ReportFilters};
use classroom_attendance::period::MAX_WINDOW_DAYS;
use classroom_attendance::report::{self, OutputFormat};
use classroom_attendance::{db, telemetry, AttendanceService, ReportRequest};

#[derive(Parser)]
#[command(name = "attendance")]
#[command(about = "Classroom attendance reports and analytics", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample classes, students and a week of attendance
    Seed,
    /// Import attendance from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Mark one student's attendance for a session
    Mark {
        #[arg(long)]
        class: i64,
        #[arg(long)]
        student: i64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "09:00-10:00")]
        session: String,
        #[arg(long)]
        status: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// List the classes you teach
    Classes,
    /// Generate an attendance report for a class
    Report {
        #[arg(long)]
        class: i64,
        /// daily_summary, student_wise, session_wise or attendance_trends
        #[arg(long = "type", default_value = "daily_summary")]
        report_type: String,
        /// current_week, current_month, current_semester or custom
        #[arg(long, default_value = "current_month")]
        range: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        /// Print to stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Daily, session and class attendance rates
    Analytics {
        #[arg(long)]
        class: Option<i64>,
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS, value_parser = window_days())]
        days: i64,
        /// CSV exports the daily trends only
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
    /// Trend and session recommendations over the last 30 days
    Insights {
        #[arg(long)]
        class: Option<i64>,
    },
    /// Per-student attendance for a class
    Students {
        #[arg(long)]
        class: i64,
        #[arg(long, default_value_t = DEFAULT_STUDENT_LIMIT)]
        limit: i64,
    },
    /// Activity across your classes
    Teacher,
    /// Students below an attendance threshold
    LowAttendance {
        #[arg(long, default_value_t = 75.0)]
        threshold: f64,
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS, value_parser = window_days())]
        days: i64,
    },
    /// Per-class attendance for one day
    ClassSummary {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// System totals and cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.settings.logging)?;

    let pool = db::connect(&cli.settings)
        .await
        .with_context(|| format!("failed to open {}", cli.settings.database_url))?;

    let cache = Arc::new(CacheRegistry::new(&CacheConfig::from(&cli.settings.cache)));
    let sweeper = cache.spawn_sweeper();
    let service = AttendanceService::new(pool.clone(), cache);

    let result = run(cli.command, &service, cli.settings.teacher_id).await;

    sweeper.abort();
    pool.close().await;
    result
}

fn window_days() -> RangedI64ValueParser<i64> {
    clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS)
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

async fn run(
    command: Commands,
    service: &AttendanceService,
    teacher_id: i64,
) -> anyhow::Result<()> {
    let pool = service.pool();

    match command {
        Commands::InitDb => {
            db::init_db(pool).await.context("failed to apply migrations")?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let written = db::seed(pool, today()).await.context("failed to seed")?;
            println!("Seed data inserted ({written} attendance records).");
        }
        Commands::Import { csv } => {
            let summary = service
                .import(teacher_id, &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!(
                "Imported {} records from {} ({} skipped).",
                summary.written,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Mark {
            class,
            student,
            date,
            session,
            status,
            note,
        } => {
            let mark = AttendanceMark {
                student_id: student,
                date: date.unwrap_or_else(today),
                session_time: session,
                status: status.parse()?,
                note,
            };
            service.mark_attendance(teacher_id, class, &[mark]).await?;
            println!("Attendance recorded.");
        }
        Commands::Classes => {
            let classes = service.list_classes(teacher_id).await?;
            if classes.is_empty() {
                println!("No classes assigned to teacher {teacher_id}.");
                return Ok(());
            }
            for entry in classes {
                println!(
                    "- [{}] {} {} ({} students)",
                    entry.class.id,
                    entry.class.name,
                    entry.class.section.as_deref().unwrap_or("-"),
                    entry.student_count
                );
            }
        }
        Commands::Report {
            class,
            report_type,
            range,
            start,
            end,
            section,
            subject,
            session,
            format,
            out,
        } => {
            let request = ReportRequest {
                class_id: class,
                report_type,
                range_type: range,
                start,
                end,
                filters: ReportFilters {
                    section,
                    subject,
                    session_time: session,
                },
            };
            let generated = service.generate_report(teacher_id, &request, today()).await?;
            let rendered = report::render(&generated, format)?;

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Analytics {
            class,
            days,
            format,
        } => {
            let analytics = service
                .attendance_analytics(teacher_id, class, days, today())
                .await?;
            print!("{}", report::render_analytics(&analytics, format)?);
        }
        Commands::Insights { class } => {
            let insights = service.insights(teacher_id, class, today()).await?;
            print!("{}", report::render_insights_markdown(&insights));
        }
        Commands::Students { class, limit } => {
            let analytics = service.student_analytics(teacher_id, class, limit).await?;
            let d = analytics.distribution;
            println!(
                "Distribution: {} excellent, {} good, {} average, {} poor",
                d.excellent, d.good, d.average, d.poor
            );
            for student in &analytics.students {
                let rate = student
                    .attendance_percentage
                    .map(|p| format!("{p:.2}%"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "- {} ({}) {} across {} sessions",
                    student.name, student.roll_no, rate, student.total_sessions
                );
            }
        }
        Commands::Teacher => {
            let analytics = service.teacher_analytics(teacher_id).await?;
            println!(
                "{} classes, {} students, average attendance {:.2}%",
                analytics.summary.total_classes,
                analytics.summary.total_students,
                analytics.summary.average_attendance_rate
            );
            for class in &analytics.classes {
                println!(
                    "- {}: {} records over {} days",
                    class.name, class.total_records, class.days_with_attendance
                );
            }
            if !analytics.recent_activity.is_empty() {
                println!("Recent sessions:");
                for session in &analytics.recent_activity {
                    println!(
                        "- {} {} {}: {} of {} present",
                        session.date,
                        session.session_time,
                        session.class_name,
                        session.present_count,
                        session.students_marked
                    );
                }
            }
        }
        Commands::LowAttendance { threshold, days } => {
            let students = service
                .low_attendance(teacher_id, threshold, days, today())
                .await?;
            if students.is_empty() {
                println!("No students below {threshold:.0}% in the last {days} days.");
                return Ok(());
            }
            for student in students {
                println!(
                    "- {} ({}, {}) {:.2}% across {} sessions",
                    student.name,
                    student.roll_no,
                    student.class_name,
                    student.attendance_rate,
                    student.total_sessions
                );
            }
        }
        Commands::ClassSummary { date } => {
            let date = date.unwrap_or_else(today);
            let classes = service.class_summary(teacher_id, date).await?;
            println!("Attendance for {date}:");
            for class in classes {
                let state = if class.attendance_marked {
                    format!("{:.2}%", class.attendance_rate)
                } else {
                    "not marked".to_string()
                };
                println!(
                    "- {}: {} present, {} late, {} absent of {} ({})",
                    class.name,
                    class.present_count,
                    class.late_count,
                    class.absent_count,
                    class.total_students,
                    state
                );
            }
        }
        Commands::Stats => {
            let stats = service.system_stats(today()).await?;
            println!("{}", report::render_json(&stats)?);
            for pool in service.cache_stats().await {
                println!(
                    "cache {}: {} keys, {} hits, {} misses ({:.0}% hit rate)",
                    pool.pool,
                    pool.keys,
                    pool.hits,
                    pool.misses,
                    pool.hit_rate * 100.0
                );
            }
        }
    }

    Ok(())
}
