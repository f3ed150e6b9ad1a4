use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    ScoredStudent, StudentRecord, AGE, ATTENDANCE_RATE, EXTRACURRICULAR, GENDER, INTERNET_ACCESS,
    PARENTAL_EDUCATION, PREVIOUS_GRADE, STUDY_HOURS,
};
use crate::risk::{RiskBucket, AT_RISK_BELOW};

pub const STRONG_CORRELATION: f64 = 0.7;
pub const MODERATE_CORRELATION: f64 = 0.4;
pub const TOP_CORRELATIONS: usize = 5;

/// Average score from which the batch trend reads as positive.
pub const POSITIVE_TREND_FROM: f64 = 60.0;

/// Inclusive upper bound of each study-hours bin.
const STUDY_HOUR_BINS: [(&str, f64); 4] = [
    ("0-10h", 10.0),
    ("11-20h", 20.0),
    ("21-30h", 30.0),
    ("30h+", f64::INFINITY),
];

type NumericFeature = (&'static str, fn(&StudentRecord) -> f64);

/// Categorical input columns a batch can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupColumn {
    Gender,
    PreviousGrade,
    ParentalEducation,
    InternetAccess,
    Extracurricular,
}

impl GroupColumn {
    pub fn name(self) -> &'static str {
        match self {
            GroupColumn::Gender => GENDER,
            GroupColumn::PreviousGrade => PREVIOUS_GRADE,
            GroupColumn::ParentalEducation => PARENTAL_EDUCATION,
            GroupColumn::InternetAccess => INTERNET_ACCESS,
            GroupColumn::Extracurricular => EXTRACURRICULAR,
        }
    }

    fn value(self, scored: &ScoredStudent) -> &str {
        let student = &scored.student;
        match self {
            GroupColumn::Gender => &student.gender,
            GroupColumn::PreviousGrade => &student.previous_grade,
            GroupColumn::ParentalEducation => &student.parental_education_level,
            GroupColumn::InternetAccess => &student.internet_access_at_home,
            GroupColumn::Extracurricular => &student.extracurricular_activities,
        }
    }
}

impl fmt::Display for GroupColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupColumn {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            GroupColumn::Gender,
            GroupColumn::PreviousGrade,
            GroupColumn::ParentalEducation,
            GroupColumn::InternetAccess,
            GroupColumn::Extracurricular,
        ]
        .into_iter()
        .find(|column| column.name() == s)
        .ok_or_else(|| PipelineError::InvalidInput(format!("cannot group by column {s:?}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketCount {
    pub bucket: RiskBucket,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub value: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN for a single member.
    pub std_dev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
}

impl CorrelationStrength {
    fn from_coefficient(coefficient: f64) -> Self {
        let magnitude = coefficient.abs();
        if magnitude > STRONG_CORRELATION {
            CorrelationStrength::Strong
        } else if magnitude > MODERATE_CORRELATION {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Weak
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CorrelationStrength::Strong => "Strong",
            CorrelationStrength::Moderate => "Moderate",
            CorrelationStrength::Weak => "Weak",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCorrelation {
    pub feature: &'static str,
    /// Pearson coefficient with the predicted score, sign kept.
    pub coefficient: f64,
    pub strength: CorrelationStrength,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyHoursBin {
    pub label: &'static str,
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceTrend {
    Positive,
    NeedsImprovement,
}

impl PerformanceTrend {
    pub fn from_mean(mean: f64) -> Self {
        if mean >= POSITIVE_TREND_FROM {
            PerformanceTrend::Positive
        } else {
            PerformanceTrend::NeedsImprovement
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PerformanceTrend::Positive => "Positive",
            PerformanceTrend::NeedsImprovement => "Needs Improvement",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl DescriptiveStats {
    pub fn iqr_bounds(&self) -> (f64, f64) {
        let iqr = self.q3 - self.q1;
        (self.q1 - 1.5 * iqr, self.q3 + 1.5 * iqr)
    }

    pub fn skew_approx(&self) -> f64 {
        if self.std_dev > 0.0 {
            (self.mean - self.median) / self.std_dev
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchInsights {
    pub total: usize,
    pub mean: f64,
    pub buckets: Vec<BucketCount>,
    pub by_gender: Vec<GroupSummary>,
    pub by_extracurricular: Vec<GroupSummary>,
    /// Mean of extracurricular "Yes" minus "No", when both groups exist.
    pub extracurricular_boost: Option<f64>,
    pub by_study_hours: Vec<StudyHoursBin>,
    /// Strongest numeric predictors, by absolute coefficient.
    pub correlations: Vec<FeatureCorrelation>,
    /// Percentage of students at or above the pass line.
    pub pass_rate: f64,
    pub trend: PerformanceTrend,
    pub stats: DescriptiveStats,
    /// Students outside the 1.5 IQR fences, in input order.
    pub outliers: Vec<(String, f64)>,
}

impl BatchInsights {
    pub fn count(&self, bucket: RiskBucket) -> usize {
        self.buckets
            .iter()
            .find(|b| b.bucket == bucket)
            .map(|b| b.count)
            .unwrap_or(0)
    }

    /// Share of the batch below the at-risk line, as a percentage.
    pub fn at_risk_percentage(&self) -> f64 {
        let at_risk = self
            .buckets
            .iter()
            .filter(|b| b.bucket.is_at_risk())
            .map(|b| b.count)
            .sum();
        percentage(at_risk, self.total)
    }

    /// Plain-language reading of the batch.
    pub fn narrative(&self) -> Vec<String> {
        let mut notes = Vec::new();

        let performance = if self.mean >= 70.0 {
            "Excellent overall performance: the class average is in the excellent range."
        } else if self.mean >= 60.0 {
            "Good overall performance: the class is well above the pass threshold."
        } else if self.mean >= AT_RISK_BELOW {
            "Moderate performance: the class average is just above the pass threshold."
        } else {
            "Below average performance: the class may need significant intervention."
        };
        notes.push(performance.to_string());

        if self.stats.std_dev < 10.0 {
            notes.push(
                "Consistent performance: low variability across students.".to_string(),
            );
        } else if self.stats.std_dev > 20.0 {
            notes.push("High variability: scores are widely spread.".to_string());
        }

        let at_risk = self.at_risk_percentage();
        if at_risk < 10.0 {
            notes.push("Low risk population: most students are predicted to perform well.".to_string());
        } else if at_risk > 30.0 {
            notes.push(
                "High risk population: a significant share of students may need support."
                    .to_string(),
            );
        }

        notes
    }
}

pub fn summarize(scored: &[ScoredStudent]) -> PipelineResult<BatchInsights> {
    if scored.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }

    let scores = Array1::from_iter(scored.iter().map(|s| s.predicted_score));
    let total = scored.len();
    let stats = describe(&scores)?;

    let buckets = RiskBucket::ALL
        .into_iter()
        .map(|bucket| {
            let count = scored.iter().filter(|s| s.risk == bucket).count();
            BucketCount {
                bucket,
                count,
                percentage: percentage(count, total),
            }
        })
        .collect();

    let (low, high) = stats.iqr_bounds();
    let outliers = scored
        .iter()
        .filter(|s| s.predicted_score < low || s.predicted_score > high)
        .map(|s| (s.student.student_id.clone(), s.predicted_score))
        .collect();

    let passing = scored
        .iter()
        .filter(|s| s.predicted_score >= AT_RISK_BELOW)
        .count();
    let by_extracurricular = group_means(scored, GroupColumn::Extracurricular)?;

    Ok(BatchInsights {
        total,
        mean: stats.mean,
        buckets,
        by_gender: group_means(scored, GroupColumn::Gender)?,
        extracurricular_boost: extracurricular_boost(&by_extracurricular),
        by_extracurricular,
        by_study_hours: study_hours_bins(scored),
        correlations: feature_correlations(scored),
        pass_rate: percentage(passing, total),
        trend: PerformanceTrend::from_mean(stats.mean),
        stats,
        outliers,
    })
}

/// Pearson correlation of each numeric input with the predicted score.
///
/// Features with no variance in the batch are left out.
pub fn feature_correlations(scored: &[ScoredStudent]) -> Vec<FeatureCorrelation> {
    let features: [NumericFeature; 3] = [
        (AGE, |s| s.age),
        (STUDY_HOURS, |s| s.study_hours_per_week),
        (ATTENDANCE_RATE, |s| s.attendance_rate),
    ];
    let scores = Array1::from_iter(scored.iter().map(|s| s.predicted_score));

    let mut correlations: Vec<FeatureCorrelation> = features
        .iter()
        .filter_map(|&(feature, value)| {
            let values = Array1::from_iter(scored.iter().map(|s| value(&s.student)));
            let coefficient = pearson(&values, &scores)?;
            Some(FeatureCorrelation {
                feature,
                coefficient,
                strength: CorrelationStrength::from_coefficient(coefficient),
            })
        })
        .collect();

    correlations.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
    correlations.truncate(TOP_CORRELATIONS);
    correlations
}

/// Mean score per weekly study-hours bin; empty bins are omitted.
pub fn study_hours_bins(scored: &[ScoredStudent]) -> Vec<StudyHoursBin> {
    let mut grouped: Vec<Vec<f64>> = vec![Vec::new(); STUDY_HOUR_BINS.len()];
    for student in scored {
        let hours = student.student.study_hours_per_week;
        let bin = STUDY_HOUR_BINS
            .iter()
            .position(|(_, upper)| hours <= *upper)
            .unwrap_or(STUDY_HOUR_BINS.len() - 1);
        grouped[bin].push(student.predicted_score);
    }

    STUDY_HOUR_BINS
        .iter()
        .zip(grouped)
        .filter(|(_, scores)| !scores.is_empty())
        .map(|(&(label, _), scores)| {
            let scores = Array1::from_vec(scores);
            StudyHoursBin {
                label,
                count: scores.len(),
                mean: scores.mean().unwrap_or(f64::NAN),
            }
        })
        .collect()
}

pub fn extracurricular_boost(groups: &[GroupSummary]) -> Option<f64> {
    let mean_of = |value: &str| groups.iter().find(|g| g.value == value).map(|g| g.mean);
    Some(mean_of("Yes")? - mean_of("No")?)
}

fn pearson(x: &Array1<f64>, y: &Array1<f64>) -> Option<f64> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }
    let x_centered = x - x.mean()?;
    let y_centered = y - y.mean()?;
    let denominator = (x_centered.dot(&x_centered) * y_centered.dot(&y_centered)).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(x_centered.dot(&y_centered) / denominator)
}

/// Mean score per distinct value of `column`, by exact string match.
pub fn group_means(
    scored: &[ScoredStudent],
    column: GroupColumn,
) -> PipelineResult<Vec<GroupSummary>> {
    if scored.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }

    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for student in scored {
        groups
            .entry(column.value(student))
            .or_default()
            .push(student.predicted_score);
    }

    Ok(groups
        .into_iter()
        .map(|(value, scores)| {
            let scores = Array1::from_vec(scores);
            GroupSummary {
                value: value.to_string(),
                count: scores.len(),
                mean: scores.mean().unwrap_or(f64::NAN),
                std_dev: sample_std(&scores),
            }
        })
        .collect())
}

pub fn describe(scores: &Array1<f64>) -> PipelineResult<DescriptiveStats> {
    let mean = scores.mean().ok_or(PipelineError::EmptyBatch)?;

    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    Ok(DescriptiveStats {
        count: sorted.len(),
        mean,
        std_dev: sample_std(scores),
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

fn sample_std(scores: &Array1<f64>) -> f64 {
    if scores.len() < 2 {
        f64::NAN
    } else {
        scores.std(1.0)
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tests::student;
    use crate::risk::classify;

    fn scored(id: &str, score: f64, gender: &str, extra: &str) -> ScoredStudent {
        let mut record = student(id, "Bachelor");
        record.gender = gender.to_string();
        record.extracurricular_activities = extra.to_string();
        ScoredStudent {
            student: record,
            predicted_score: score,
            risk: classify(score).unwrap().0,
        }
    }

    fn batch(scores: &[f64]) -> Vec<ScoredStudent> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| scored(&format!("S{i}"), *score, "Female", "No"))
            .collect()
    }

    #[test]
    fn three_row_example_aggregates() {
        let insights = summarize(&batch(&[30.0, 55.0, 75.0])).unwrap();
        assert_eq!(insights.total, 3);
        assert!((insights.mean - 53.33).abs() < 0.01);
        assert_eq!(insights.count(RiskBucket::HighRisk), 1);
        assert_eq!(insights.count(RiskBucket::ModerateRisk), 0);
        assert_eq!(insights.count(RiskBucket::LowRisk), 1);
        assert_eq!(insights.count(RiskBucket::Excellent), 1);

        let percentages: f64 = insights.buckets.iter().map(|b| b.percentage).sum();
        assert!((percentages - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_is_reported() {
        assert!(matches!(summarize(&[]), Err(PipelineError::EmptyBatch)));
        assert!(matches!(
            group_means(&[], GroupColumn::Gender),
            Err(PipelineError::EmptyBatch)
        ));
    }

    #[test]
    fn group_means_use_exact_values() {
        let rows = vec![
            scored("A", 40.0, "Female", "Yes"),
            scored("B", 60.0, "Female", "No"),
            scored("C", 80.0, "Male", "Yes"),
            scored("D", 20.0, "male", "No"),
        ];

        let by_gender = group_means(&rows, GroupColumn::Gender).unwrap();
        let values: Vec<_> = by_gender.iter().map(|g| g.value.as_str()).collect();
        assert_eq!(values, vec!["Female", "Male", "male"]);
        assert_eq!(by_gender[0].count, 2);
        assert_eq!(by_gender[0].mean, 50.0);
        assert!((by_gender[0].std_dev - 14.142135).abs() < 1e-5);
        assert!(by_gender[1].std_dev.is_nan());

        let by_extra = group_means(&rows, GroupColumn::Extracurricular).unwrap();
        assert_eq!(by_extra[0].value, "No");
        assert_eq!(by_extra[0].mean, 40.0);
        assert_eq!(by_extra[1].mean, 60.0);
    }

    #[test]
    fn describe_matches_linear_interpolation_quantiles() {
        let stats = describe(&Array1::from_vec(vec![10.0, 40.0, 20.0, 30.0])).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 40.0);
        assert_eq!(stats.q1, 17.5);
        assert_eq!(stats.median, 25.0);
        assert_eq!(stats.q3, 32.5);
        assert!((stats.std_dev - 12.909944).abs() < 1e-5);
        assert_eq!(stats.skew_approx(), 0.0);
    }

    #[test]
    fn flags_iqr_outliers() {
        let insights = summarize(&batch(&[50.0, 52.0, 54.0, 56.0, 58.0, 140.0])).unwrap();
        assert_eq!(insights.outliers, vec![("S5".to_string(), 140.0)]);
    }

    #[test]
    fn single_student_batch_is_defined() {
        let insights = summarize(&batch(&[64.0])).unwrap();
        assert_eq!(insights.mean, 64.0);
        assert_eq!(insights.stats.median, 64.0);
        assert!(insights.stats.std_dev.is_nan());
        assert_eq!(insights.stats.skew_approx(), 0.0);
        assert!(insights.outliers.is_empty());
    }

    #[test]
    fn narrative_reflects_mean_spread_and_risk() {
        let strong = summarize(&batch(&[78.0, 80.0, 82.0])).unwrap();
        let notes = strong.narrative();
        assert!(notes[0].starts_with("Excellent"));
        assert!(notes.iter().any(|n| n.starts_with("Consistent")));
        assert!(notes.iter().any(|n| n.starts_with("Low risk")));

        let weak = summarize(&batch(&[5.0, 35.0, 45.0, 95.0])).unwrap();
        let notes = weak.narrative();
        assert!(notes[0].starts_with("Below average"));
        assert!(notes.iter().any(|n| n.starts_with("High variability")));
        assert!(notes.iter().any(|n| n.starts_with("High risk")));
    }

    fn with_inputs(id: &str, score: f64, hours: f64, attendance: f64) -> ScoredStudent {
        let mut row = scored(id, score, "Female", "No");
        row.student.study_hours_per_week = hours;
        row.student.attendance_rate = attendance;
        row
    }

    #[test]
    fn ranks_numeric_features_by_correlation_strength() {
        let rows = vec![
            with_inputs("A", 40.0, 10.0, 60.0),
            with_inputs("B", 50.0, 30.0, 70.0),
            with_inputs("C", 60.0, 10.0, 80.0),
            with_inputs("D", 70.0, 30.0, 90.0),
        ];

        let correlations = feature_correlations(&rows);
        // Age is constant across the batch and carries no signal.
        assert_eq!(correlations.len(), 2);

        assert_eq!(correlations[0].feature, ATTENDANCE_RATE);
        assert!((correlations[0].coefficient - 1.0).abs() < 1e-12);
        assert_eq!(correlations[0].strength, CorrelationStrength::Strong);

        assert_eq!(correlations[1].feature, STUDY_HOURS);
        assert!((correlations[1].coefficient - 0.447214).abs() < 1e-5);
        assert_eq!(correlations[1].strength, CorrelationStrength::Moderate);
    }

    #[test]
    fn negative_correlation_keeps_sign_and_strength() {
        let rows = vec![
            with_inputs("A", 80.0, 5.0, 60.0),
            with_inputs("B", 60.0, 5.0, 70.0),
            with_inputs("C", 40.0, 5.0, 80.0),
        ];
        let correlations = feature_correlations(&rows);
        assert_eq!(correlations.len(), 1);
        assert!((correlations[0].coefficient + 1.0).abs() < 1e-12);
        assert_eq!(correlations[0].strength, CorrelationStrength::Strong);
        assert_eq!(CorrelationStrength::from_coefficient(0.4), CorrelationStrength::Weak);
    }

    #[test]
    fn bins_scores_by_weekly_study_hours() {
        let rows = vec![
            with_inputs("A", 30.0, 0.0, 80.0),
            with_inputs("B", 40.0, 10.0, 80.0),
            with_inputs("C", 50.0, 10.5, 80.0),
            with_inputs("D", 60.0, 20.0, 80.0),
            with_inputs("E", 70.0, 25.0, 80.0),
            with_inputs("F", 80.0, 45.0, 80.0),
        ];

        let bins = study_hours_bins(&rows);
        let summary: Vec<_> = bins.iter().map(|b| (b.label, b.count, b.mean)).collect();
        assert_eq!(
            summary,
            vec![
                ("0-10h", 2, 35.0),
                ("11-20h", 2, 55.0),
                ("21-30h", 1, 70.0),
                ("30h+", 1, 80.0),
            ]
        );

        let single = study_hours_bins(&rows[4..5]);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].label, "21-30h");
    }

    #[test]
    fn extracurricular_boost_needs_both_groups() {
        let rows = vec![
            scored("A", 40.0, "Female", "Yes"),
            scored("B", 60.0, "Female", "No"),
            scored("C", 80.0, "Male", "Yes"),
            scored("D", 20.0, "Male", "No"),
        ];
        let insights = summarize(&rows).unwrap();
        assert_eq!(insights.extracurricular_boost, Some(20.0));

        let only_no = summarize(&batch(&[40.0, 60.0])).unwrap();
        assert_eq!(only_no.extracurricular_boost, None);
    }

    #[test]
    fn pass_rate_counts_scores_at_or_above_fifty() {
        let insights = summarize(&batch(&[30.0, 55.0, 75.0, 50.0])).unwrap();
        assert_eq!(insights.pass_rate, 75.0);

        let none_pass = summarize(&batch(&[10.0, 49.99])).unwrap();
        assert_eq!(none_pass.pass_rate, 0.0);
    }

    #[test]
    fn trend_turns_positive_from_sixty() {
        assert_eq!(
            summarize(&batch(&[30.0, 55.0, 75.0, 50.0])).unwrap().trend,
            PerformanceTrend::NeedsImprovement
        );
        assert_eq!(
            summarize(&batch(&[60.0])).unwrap().trend,
            PerformanceTrend::Positive
        );
        assert_eq!(PerformanceTrend::from_mean(59.99).label(), "Needs Improvement");
    }

    #[test]
    fn parses_group_columns_by_header_name() {
        assert_eq!(
            "Parental_Education_Level".parse::<GroupColumn>().unwrap(),
            GroupColumn::ParentalEducation
        );
        assert!("gender".parse::<GroupColumn>().is_err());
    }
}
