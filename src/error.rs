//! Error types for the ingestion pipeline
//!
//! Ingestion errors never escape the pipeline. Each one is logged once and
//! turned into a degraded marker on the WorkspaceChange row:
//! - Recorded: classification failure, extraction timeout
//! - Rolled back: template instantiation failure
//! - Informational: referential gaps (auto-resolved)
//! - Retryable: store conflicts and lock contention

use std::path::PathBuf;
use thiserror::Error;

use crate::db::DbError;
use crate::entity::StrategicValue;

/// Summary written onto a change whose extraction exceeded its budget.
pub const EXTRACTION_TIMED_OUT: &str = "extraction timed out";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Cannot classify {path}: {reason}")]
    Classification { path: PathBuf, reason: String },

    #[error("Extraction exceeded {secs}s for {path}")]
    ExtractionTimeout { path: PathBuf, secs: u64 },

    #[error("Template '{template}' failed at {path}: {reason}")]
    TemplateInstantiation {
        template: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Unknown {entity} '{key}' referenced; created a minimal record")]
    ReferentialGap { entity: &'static str, key: String },

    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

impl IngestError {
    /// Only store contention clears up on retry. Timeouts are recorded, not
    /// retried; template failures wait for the next rescan.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The (strategic_value, content_summary) recorded on the change row.
    pub fn degraded_marker(&self) -> Option<(StrategicValue, String)> {
        match self {
            IngestError::ExtractionTimeout { .. } => {
                Some((StrategicValue::None, EXTRACTION_TIMED_OUT.to_string()))
            }
            IngestError::Classification { reason, .. } => Some((
                StrategicValue::None,
                format!("classification failed: {}", reason),
            )),
            IngestError::TemplateInstantiation { template, .. } => Some((
                StrategicValue::Low,
                format!("template '{}' not applied", template),
            )),
            IngestError::ReferentialGap { .. } | IngestError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_marker() {
        let err = IngestError::ExtractionTimeout {
            path: PathBuf::from("/ws/a.md"),
            secs: 5,
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.degraded_marker(),
            Some((StrategicValue::None, "extraction timed out".to_string()))
        );
    }

    #[test]
    fn test_store_conflict_is_retryable() {
        let err = IngestError::from(DbError::WriteConflict {
            entity: "meeting",
            key: "k".into(),
        });
        assert!(err.is_retryable());
        assert!(err.degraded_marker().is_none());
    }

    #[test]
    fn test_referential_gap_is_informational() {
        let err = IngestError::ReferentialGap {
            entity: "stakeholder",
            key: "raghu".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.degraded_marker().is_none());
        assert!(err.to_string().contains("raghu"));
    }
}
