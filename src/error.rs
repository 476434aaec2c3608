//! Error kinds shared by the data source, record store and analytics core.

use thiserror::Error;

use crate::models::RowRejection;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Dataset '{dataset}' unavailable: {reason}")]
    DataUnavailable { dataset: String, reason: String },

    #[error("Row rejected: {0}")]
    RowRejected(RowRejection),

    #[error("Retention undefined for {year}: no donors were active in {}", .year - 1)]
    UndefinedRetention { year: i32 },

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl PipelineError {
    pub fn unavailable(dataset: &str, reason: impl ToString) -> Self {
        PipelineError::DataUnavailable {
            dataset: dataset.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
