//! Attendance reports and dashboard analytics over a SQLite store, with
//! process-local TTL caching.

pub mod aggregate;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod period;
pub mod predicate;
pub mod report;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use error::{ReportError, Result};
pub use service::{AttendanceService, ReportRequest};
