use std::fmt;

use crate::error::{PipelineError, PipelineResult};

pub const HIGH_RISK_BELOW: f64 = 40.0;
pub const MODERATE_RISK_BELOW: f64 = 50.0;
pub const LOW_RISK_BELOW: f64 = 70.0;

/// Students scoring under this line are flagged for additional support.
pub const AT_RISK_BELOW: f64 = MODERATE_RISK_BELOW;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskBucket {
    HighRisk,
    ModerateRisk,
    LowRisk,
    Excellent,
}

impl RiskBucket {
    pub const ALL: [RiskBucket; 4] = [
        RiskBucket::HighRisk,
        RiskBucket::ModerateRisk,
        RiskBucket::LowRisk,
        RiskBucket::Excellent,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RiskBucket::HighRisk => "High Risk",
            RiskBucket::ModerateRisk => "Moderate Risk",
            RiskBucket::LowRisk => "Low Risk",
            RiskBucket::Excellent => "Excellent",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            RiskBucket::HighRisk => "🔴",
            RiskBucket::ModerateRisk => "🟡",
            RiskBucket::LowRisk => "🟢",
            RiskBucket::Excellent => "🌟",
        }
    }

    pub fn range_label(self) -> &'static str {
        match self {
            RiskBucket::HighRisk => "Below 40",
            RiskBucket::ModerateRisk => "40-50",
            RiskBucket::LowRisk => "50-70",
            RiskBucket::Excellent => "70+",
        }
    }

    pub fn is_at_risk(self) -> bool {
        matches!(self, RiskBucket::HighRisk | RiskBucket::ModerateRisk)
    }

    fn from_score(score: f64) -> Self {
        if score < HIGH_RISK_BELOW {
            RiskBucket::HighRisk
        } else if score < MODERATE_RISK_BELOW {
            RiskBucket::ModerateRisk
        } else if score < LOW_RISK_BELOW {
            RiskBucket::LowRisk
        } else {
            RiskBucket::Excellent
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Maps a predicted score to its bucket and display marker.
///
/// Lower bounds are inclusive and upper bounds exclusive; the top bucket is
/// unbounded. NaN and infinities are rejected.
pub fn classify(score: f64) -> PipelineResult<(RiskBucket, &'static str)> {
    if !score.is_finite() {
        return Err(PipelineError::InvalidScore {
            student_id: "-".to_string(),
            score,
        });
    }

    let bucket = RiskBucket::from_score(score);
    Ok((bucket, bucket.marker()))
}
