use std::error::Error as StdError;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failures raised by the store, the report layer and the service around them.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Rejected input; reported with the offending field and never retried.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("access denied to class {class_id}")]
    Forbidden { class_id: i64 },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to compute {context}")]
    Computation {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl ReportError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn computation(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Computation {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_field() {
        let err = ReportError::validation("report_type", "invalid report type `weekly`");
        assert_eq!(
            err.to_string(),
            "invalid report_type: invalid report type `weekly`"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn computation_keeps_cause() {
        let cause = "2024-13-40".parse::<chrono::NaiveDate>().unwrap_err();
        let err = ReportError::computation("custom date range", cause);
        assert!(err.source().is_some());
        assert!(!err.is_validation());
    }
}
