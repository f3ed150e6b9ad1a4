use tracing::info;
use uuid::Uuid;

use crate::encoder::FeatureEncoder;
use crate::error::{PipelineError, PipelineResult};
use crate::insights::{self, BatchInsights};
use crate::artifact::ModelArtifact;
use crate::models::{ScoredStudent, StudentRecord};
use crate::risk::{self, LOW_RISK_BELOW};

pub struct PredictionRequest {
    pub students: Vec<StudentRecord>,
}

#[derive(Debug, Clone)]
pub struct PredictionResponse {
    pub model_id: Uuid,
    pub scored: Vec<ScoredStudent>,
}

impl PredictionResponse {
    pub fn insights(&self) -> PipelineResult<BatchInsights> {
        insights::summarize(&self.scored)
    }

    /// Students scoring below `threshold`, lowest first.
    pub fn at_risk(&self, threshold: f64) -> Vec<&ScoredStudent> {
        let mut rows: Vec<&ScoredStudent> = self
            .scored
            .iter()
            .filter(|s| s.predicted_score < threshold)
            .collect();
        rows.sort_by(|a, b| a.predicted_score.total_cmp(&b.predicted_score));
        rows
    }

    /// Students in the Excellent bucket, highest first.
    pub fn top_performers(&self) -> Vec<&ScoredStudent> {
        let mut rows: Vec<&ScoredStudent> = self
            .scored
            .iter()
            .filter(|s| s.predicted_score >= LOW_RISK_BELOW)
            .collect();
        rows.sort_by(|a, b| b.predicted_score.total_cmp(&a.predicted_score));
        rows
    }
}

/// Encodes, predicts and classifies a batch against one loaded model.
pub struct Pipeline<'a> {
    model: &'a ModelArtifact,
}

impl<'a> Pipeline<'a> {
    pub fn new(model: &'a ModelArtifact) -> Self {
        Self { model }
    }

    pub fn run(&self, request: PredictionRequest) -> PipelineResult<PredictionResponse> {
        let encoded = FeatureEncoder::new(&self.model.vocabularies).encode(&request.students)?;
        let predictions = self.model.predict(&encoded)?;

        let scored = request
            .students
            .into_iter()
            .zip(predictions)
            .map(|(student, score)| {
                let (bucket, _) =
                    risk::classify(score).map_err(|_| PipelineError::InvalidScore {
                        student_id: student.student_id.clone(),
                        score,
                    })?;
                Ok(ScoredStudent {
                    student,
                    predicted_score: score,
                    risk: bucket,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        info!(
            rows = scored.len(),
            model_id = %self.model.model_id,
            "scored batch"
        );

        Ok(PredictionResponse {
            model_id: self.model.model_id,
            scored,
        })
    }
}
