use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::encoder::Vocabularies;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{EncodedRow, FEATURE_COLUMNS, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// A fitted linear model plus everything needed to reproduce its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub vocabularies: Vocabularies,
    pub metrics: Option<TrainingMetrics>,
}

impl ModelArtifact {
    /// Reads and validates an artifact. Every failure maps to `ModelUnavailable`.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| PipelineError::model_unavailable(path, err.to_string()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .map_err(|err| PipelineError::model_unavailable(path, format!("corrupt artifact: {err}")))?;
        artifact
            .validate()
            .map_err(|reason| PipelineError::model_unavailable(path, reason))?;

        info!(
            model_id = %artifact.model_id,
            trained_at = %artifact.trained_at,
            path = %path.display(),
            "loaded model artifact"
        );
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(model_id = %self.model_id, path = %path.display(), "saved model artifact");
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != self.feature_columns.len() {
            return Err(format!(
                "{} coefficients for {} feature columns",
                self.coefficients.len(),
                self.feature_columns.len()
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("model parameters contain non-finite values".to_string());
        }
        if self.vocabularies.parental_education_level.is_empty()
            || self.vocabularies.previous_grade.is_empty()
        {
            return Err("category vocabularies are empty".to_string());
        }
        if !self.vocabularies.parental_education_level.is_sorted()
            || !self.vocabularies.previous_grade.is_sorted()
        {
            return Err("category vocabularies must be sorted and distinct".to_string());
        }
        Ok(())
    }

    /// Fails unless the model was fitted on exactly `columns`, in order.
    pub fn ensure_schema(&self, columns: &[&str]) -> PipelineResult<()> {
        let matches = self.feature_columns.len() == columns.len()
            && self
                .feature_columns
                .iter()
                .zip(columns)
                .all(|(expected, found)| expected == found);

        if matches {
            Ok(())
        } else {
            Err(PipelineError::SchemaMismatch {
                expected: self.feature_columns.clone(),
                found: columns.iter().map(|c| c.to_string()).collect(),
            })
        }
    }

    pub fn predict(&self, rows: &[EncodedRow]) -> PipelineResult<Vec<f64>> {
        self.ensure_schema(&FEATURE_COLUMNS)?;
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(PipelineError::encoding(
                0,
                "-",
                "features",
                format!(
                    "rows carry {FEATURE_COUNT} features but the model has {} coefficients",
                    self.coefficients.len()
                ),
            ));
        }

        let flat: Vec<f64> = rows.iter().flat_map(|row| row.features).collect();
        let matrix = Array2::from_shape_vec((rows.len(), FEATURE_COUNT), flat)
            .map_err(|err| PipelineError::encoding(0, "-", "features", err.to_string()))?;
        let predictions = self.predict_matrix(&matrix);

        debug!(rows = rows.len(), model_id = %self.model_id, "predicted scores");
        Ok(predictions.to_vec())
    }

    pub(crate) fn predict_matrix(&self, matrix: &Array2<f64>) -> Array1<f64> {
        let coefficients = Array1::from_vec(self.coefficients.clone());
        matrix.dot(&coefficients) + self.intercept
    }
}
