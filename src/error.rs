use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the prediction pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("model unavailable at {}: {reason}; provide a valid model artifact", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("feature encoding error at row {row} (student {student_id}), column {column}: {message}")]
    FeatureEncoding {
        row: usize,
        student_id: String,
        column: String,
        message: String,
    },

    #[error("feature schema mismatch: model expects [{}], pipeline provides [{}]", expected.join(", "), found.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("batch is empty; no statistics can be computed")]
    EmptyBatch,

    #[error("invalid score {score} for student {student_id}; check the model and encoded features")]
    InvalidScore { student_id: String, score: f64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn encoding<S: Into<String>>(
        row: usize,
        student_id: &str,
        column: &str,
        message: S,
    ) -> Self {
        PipelineError::FeatureEncoding {
            row,
            student_id: student_id.to_string(),
            column: column.to_string(),
            message: message.into(),
        }
    }

    pub fn model_unavailable<S: Into<String>>(path: &std::path::Path, reason: S) -> Self {
        PipelineError::ModelUnavailable {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
