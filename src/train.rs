use chrono::Utc;
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{s, Array1, Array2};
use tracing::info;
use uuid::Uuid;

use crate::encoder::{FeatureEncoder, Vocabularies};
use crate::error::{PipelineError, PipelineResult};
use crate::artifact::{ModelArtifact, TrainingMetrics};
use crate::models::{LabelledRecord, StudentRecord, FEATURE_COLUMNS, FEATURE_COUNT};
use crate::risk::AT_RISK_BELOW;

pub const MIN_SPLIT_ROWS: usize = 2;

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    /// Training rows whose in-sample prediction falls below the at-risk line.
    pub at_risk: Vec<(String, f64)>,
}

/// Fits a linear model on labelled rows, holding out the last `test_ratio`
/// share for evaluation.
pub fn train(rows: &[LabelledRecord], test_ratio: f32) -> PipelineResult<TrainingOutcome> {
    if !(0.0..1.0).contains(&test_ratio) || test_ratio == 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "test ratio must be between 0 and 1, got {test_ratio}"
        )));
    }

    let test_rows = ((rows.len() as f32) * test_ratio).round() as usize;
    let train_rows = rows.len().saturating_sub(test_rows);
    if train_rows < MIN_SPLIT_ROWS || test_rows < MIN_SPLIT_ROWS {
        return Err(PipelineError::Training(format!(
            "{} labelled rows cannot be split into train and test sets of at least {MIN_SPLIT_ROWS}",
            rows.len()
        )));
    }

    let students: Vec<StudentRecord> = rows.iter().map(|r| r.student.clone()).collect();
    let vocabularies = Vocabularies::fit(&students);
    let encoded = FeatureEncoder::new(&vocabularies).encode(&students)?;

    let flat: Vec<f64> = encoded.iter().flat_map(|row| row.features).collect();
    let records = Array2::from_shape_vec((encoded.len(), FEATURE_COUNT), flat)
        .map_err(|err| PipelineError::Training(err.to_string()))?;
    let targets = Array1::from_iter(rows.iter().map(|r| r.final_exam_score));

    let train_set = Dataset::new(
        records.slice(s![..train_rows, ..]).to_owned(),
        targets.slice(s![..train_rows]).to_owned(),
    );
    let test_records = records.slice(s![train_rows.., ..]).to_owned();
    let test_targets = targets.slice(s![train_rows..]).to_owned();

    let fitted = LinearRegression::new()
        .fit(&train_set)
        .map_err(|err| PipelineError::Training(err.to_string()))?;

    let predicted = fitted.predict(&test_records);
    let r2 = predicted
        .r2(&test_targets)
        .map_err(|err| PipelineError::Training(err.to_string()))?;
    let mse = predicted
        .mean_squared_error(&test_targets)
        .map_err(|err| PipelineError::Training(err.to_string()))?;
    let metrics = TrainingMetrics {
        r2,
        rmse: mse.sqrt(),
        train_rows,
        test_rows,
    };

    let artifact = ModelArtifact {
        model_id: Uuid::new_v4(),
        trained_at: Utc::now(),
        feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        intercept: fitted.intercept(),
        coefficients: fitted.params().to_vec(),
        vocabularies,
        metrics: Some(metrics),
    };

    if !artifact.intercept.is_finite() || artifact.coefficients.iter().any(|c| !c.is_finite()) {
        return Err(PipelineError::Training(
            "fit produced non-finite parameters; check for constant or collinear features"
                .to_string(),
        ));
    }

    let in_sample = artifact.predict_matrix(&records);
    let at_risk = encoded
        .iter()
        .zip(in_sample.iter())
        .filter(|(_, score)| **score < AT_RISK_BELOW)
        .map(|(row, score)| (row.student_id.clone(), *score))
        .collect();

    info!(
        model_id = %artifact.model_id,
        r2,
        rmse = mse.sqrt(),
        train_rows,
        test_rows,
        "trained linear regression"
    );

    Ok(TrainingOutcome { artifact, at_risk })
}
