use crate::types::InvestmentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameters { field: String, reason: String },

    #[error("Investment {id} not found")]
    InvestmentNotFound { id: InvestmentId },

    #[error("Run '{id}' not found")]
    RunNotFound { id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field:  field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::InvestmentNotFound { .. } => "investment_not_found",
            Self::RunNotFound { .. } => "run_not_found",
            Self::Other(_) => "internal",
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Non-fatal conditions attached to an otherwise valid result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// A group, pair or portfolio held fewer observations than required.
    InsufficientSample {
        scope:       String,
        sample_size: usize,
        required:    usize,
    },
    /// The optimizer stopped short of the targets.
    InfeasibleConstraints {
        residual: f64,
        unmet:    Vec<String>,
    },
    /// A simulation was cancelled or timed out; outputs cover `completed` trials.
    Cancelled {
        completed: usize,
        requested: usize,
    },
    MissingData { reason: String },
}

impl Degradation {
    pub fn insufficient(scope: impl Into<String>, sample_size: usize, required: usize) -> Self {
        Self::InsufficientSample {
            scope: scope.into(),
            sample_size,
            required,
        }
    }

    pub fn missing(reason: impl Into<String>) -> Self {
        Self::MissingData { reason: reason.into() }
    }
}
