use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::error::PipelineResult;
use crate::insights::GroupSummary;
use crate::risk::{RiskBucket, AT_RISK_BELOW};
use crate::pipeline::PredictionResponse;

pub fn build_report(
    source: &str,
    generated_at: DateTime<Utc>,
    response: &PredictionResponse,
    at_risk_below: f64,
    limit: usize,
) -> PipelineResult<String> {
    let insights = response.insights()?;
    let mut output = String::new();

    let _ = writeln!(output, "# Student Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} (model {})",
        source,
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        response.model_id
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Students: {}", insights.total);
    let _ = writeln!(output, "- Average predicted score: {:.2}", insights.mean);
    let _ = writeln!(
        output,
        "- Needing support (below {at_risk_below}): {}",
        response.at_risk(at_risk_below).len()
    );
    let _ = writeln!(
        output,
        "- Pass rate (score {AT_RISK_BELOW} or above): {:.1}%",
        insights.pass_rate
    );
    let _ = writeln!(output, "- Performance trend: {}", insights.trend.label());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Levels");
    let _ = writeln!(output, "| Level | Range | Students | Share |");
    let _ = writeln!(output, "|---|---|---|---|");
    for bucket in &insights.buckets {
        let _ = writeln!(
            output,
            "| {} {} | {} | {} | {:.1}% |",
            bucket.bucket.marker(),
            bucket.bucket.label(),
            bucket.bucket.range_label(),
            bucket.count,
            bucket.percentage
        );
    }

    let stats = &insights.stats;
    let (lower, upper) = stats.iqr_bounds();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Distribution");
    let _ = writeln!(
        output,
        "- Mean {:.2}, std dev {:.2}, skew (approx) {:.2}",
        stats.mean,
        stats.std_dev,
        stats.skew_approx()
    );
    let _ = writeln!(
        output,
        "- Min {:.2}, 25% {:.2}, median {:.2}, 75% {:.2}, max {:.2}",
        stats.min, stats.q1, stats.median, stats.q3, stats.max
    );
    let _ = writeln!(
        output,
        "- Outlier fences {:.1} to {:.1}: {} outlier(s)",
        lower,
        upper,
        insights.outliers.len()
    );
    for (id, score) in &insights.outliers {
        let _ = writeln!(output, "  - {id} at {score:.1}");
    }

    write_groups(&mut output, "Gender", &insights.by_gender);
    write_groups(&mut output, "Extracurricular Activities", &insights.by_extracurricular);
    if let Some(boost) = insights.extracurricular_boost {
        let _ = writeln!(output, "- Performance boost from activities: {boost:+.2} points");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Study Hours");
    for bin in &insights.by_study_hours {
        let _ = writeln!(
            output,
            "- {}: mean {:.2} across {} students",
            bin.label, bin.mean, bin.count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Strongest Predictors");
    if insights.correlations.is_empty() {
        let _ = writeln!(output, "Inputs do not vary enough across this batch to compare.");
    } else {
        for correlation in &insights.correlations {
            let _ = writeln!(
                output,
                "- {}: {:+.3} ({})",
                correlation.feature,
                correlation.coefficient,
                correlation.strength.label()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Support");
    let at_risk = response.at_risk(at_risk_below);
    if at_risk.is_empty() {
        let _ = writeln!(output, "No students are predicted to be at risk.");
    } else {
        for student in at_risk.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} {} score {:.1} ({})",
                student.marker(),
                student.student.student_id,
                student.predicted_score,
                student.risk
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");
    let top = response.top_performers();
    if top.is_empty() {
        let _ = writeln!(output, "No students are predicted to reach the excellent range yet.");
    } else {
        for student in top.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} {} score {:.1}",
                student.marker(),
                student.student.student_id,
                student.predicted_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommended Actions");
    let high_risk = insights.count(RiskBucket::HighRisk);
    let moderate_risk = insights.count(RiskBucket::ModerateRisk);
    if high_risk > 0 {
        let _ = writeln!(
            output,
            "- Immediate action required: {high_risk} student(s) predicted below 40 need intensive support."
        );
    }
    if moderate_risk > 0 {
        let _ = writeln!(
            output,
            "- Monitor closely: {moderate_risk} student(s) predicted between 40 and 50 may need additional help."
        );
    }
    if high_risk == 0 && moderate_risk == 0 {
        let _ = writeln!(output, "- No intervention needed: every student is predicted to pass.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Insights");
    for note in insights.narrative() {
        let _ = writeln!(output, "- {note}");
    }

    Ok(output)
}

fn write_groups(output: &mut String, title: &str, groups: &[GroupSummary]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## By {title}");
    for group in groups {
        let _ = writeln!(
            output,
            "- {}: mean {:.2} across {} students",
            group.value, group.mean, group.count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tests::student;
    use crate::artifact::tests::attendance_identity;
    use crate::pipeline::{Pipeline, PredictionRequest};

    fn response(scores: &[f64]) -> PredictionResponse {
        let model = attendance_identity();
        let students = scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let mut record = student(&format!("STU{i:03}"), "Master");
                record.attendance_rate = *score;
                record
            })
            .collect();
        Pipeline::new(&model)
            .run(PredictionRequest { students })
            .unwrap()
    }

    #[test]
    fn report_lists_sections_and_students() {
        let report = build_report("class.csv", Utc::now(), &response(&[30.0, 55.0, 75.0]), 50.0, 10)
            .unwrap();

        assert!(report.starts_with("# Student Performance Report"));
        assert!(report.contains("Generated for class.csv"));
        assert!(report.contains("- Average predicted score: 53.33"));
        assert!(report.contains("| 🔴 High Risk | Below 40 | 1 | 33.3% |"));
        assert!(report.contains("| 🟡 Moderate Risk | 40-50 | 0 | 0.0% |"));
        assert!(report.contains("- 🔴 STU000 score 30.0 (High Risk)"));
        assert!(report.contains("- 🌟 STU002 score 75.0"));
        assert!(report.contains("## By Gender\n- Female: mean 53.33 across 3 students"));
    }

    #[test]
    fn report_handles_batches_without_risk_or_excellence() {
        let report = build_report("class.csv", Utc::now(), &response(&[55.0, 60.0]), 50.0, 10)
            .unwrap();
        assert!(report.contains("No students are predicted to be at risk."));
        assert!(report.contains("No students are predicted to reach the excellent range yet."));
    }

    #[test]
    fn report_includes_batch_analytics() {
        let report = build_report("class.csv", Utc::now(), &response(&[30.0, 55.0, 75.0]), 50.0, 10)
            .unwrap();

        assert!(report.contains("- Pass rate (score 50 or above): 66.7%"));
        assert!(report.contains("- Performance trend: Needs Improvement"));
        assert!(report.contains("## By Study Hours\n- 11-20h: mean 53.33 across 3 students"));
        assert!(report.contains("## Strongest Predictors\n- Attendance_Rate: +1.000 (Strong)"));
        // Every student has the same activity answer, so there is nothing to compare.
        assert!(!report.contains("Performance boost"));
    }

    #[test]
    fn recommended_actions_follow_risk_counts() {
        let mixed = build_report("class.csv", Utc::now(), &response(&[30.0, 35.0, 45.0, 80.0]), 50.0, 10)
            .unwrap();
        assert!(mixed.contains("- Immediate action required: 2 student(s)"));
        assert!(mixed.contains("- Monitor closely: 1 student(s)"));

        let passing = build_report("class.csv", Utc::now(), &response(&[55.0, 60.0]), 50.0, 10)
            .unwrap();
        assert!(passing.contains("- No intervention needed"));
        assert!(!passing.contains("Immediate action required"));
    }

    #[test]
    fn empty_response_cannot_be_reported() {
        assert!(build_report("class.csv", Utc::now(), &response(&[]), 50.0, 10).is_err());
    }
}
