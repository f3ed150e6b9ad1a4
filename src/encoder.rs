use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    EncodedRow, StudentRecord, ATTENDANCE_RATE, AGE, EXTRACURRICULAR, FEATURE_COUNT, GENDER,
    INTERNET_ACCESS, PARENTAL_EDUCATION, PREVIOUS_GRADE, STUDY_HOURS,
};

/// Sorted set of category literals; a literal's code is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    values: Vec<String>,
}

impl Vocabulary {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        Vocabulary {
            values: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn code(&self, value: &str) -> Option<usize> {
        self.values
            .binary_search_by(|candidate| candidate.as_str().cmp(value))
            .ok()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Strictly ascending, which `code` relies on.
    pub fn is_sorted(&self) -> bool {
        self.values.windows(2).all(|pair| pair[0] < pair[1])
    }
}

/// Category tables frozen at training time and shipped with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabularies {
    pub parental_education_level: Vocabulary,
    pub previous_grade: Vocabulary,
}

impl Vocabularies {
    pub fn fit(records: &[StudentRecord]) -> Self {
        Vocabularies {
            parental_education_level: Vocabulary::fit(
                records.iter().map(|r| r.parental_education_level.as_str()),
            ),
            previous_grade: Vocabulary::fit(records.iter().map(|r| r.previous_grade.as_str())),
        }
    }
}

pub struct FeatureEncoder<'a> {
    vocabularies: &'a Vocabularies,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(vocabularies: &'a Vocabularies) -> Self {
        Self { vocabularies }
    }

    pub fn encode(&self, records: &[StudentRecord]) -> PipelineResult<Vec<EncodedRow>> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.encode_record(index + 1, record))
            .collect::<PipelineResult<Vec<_>>>()?;
        debug!(rows = rows.len(), "encoded feature rows");
        Ok(rows)
    }

    /// `row` is 1-based and used only for error messages.
    pub fn encode_record(&self, row: usize, record: &StudentRecord) -> PipelineResult<EncodedRow> {
        let id = record.student_id.as_str();

        let mut features = [0.0; FEATURE_COUNT];
        features[0] = finite(row, id, AGE, record.age)?;
        features[1] = encode_gender(row, id, &record.gender)?;
        features[2] = finite(row, id, STUDY_HOURS, record.study_hours_per_week)?;
        features[3] = attendance(row, id, record.attendance_rate)?;
        features[4] = encode_category(
            row,
            id,
            PREVIOUS_GRADE,
            &self.vocabularies.previous_grade,
            &record.previous_grade,
        )?;
        features[5] = encode_category(
            row,
            id,
            PARENTAL_EDUCATION,
            &self.vocabularies.parental_education_level,
            &record.parental_education_level,
        )?;
        features[6] = encode_yes_no(row, id, INTERNET_ACCESS, &record.internet_access_at_home)?;
        features[7] = encode_yes_no(row, id, EXTRACURRICULAR, &record.extracurricular_activities)?;

        Ok(EncodedRow {
            student_id: record.student_id.clone(),
            features,
        })
    }
}

fn encode_gender(row: usize, id: &str, value: &str) -> PipelineResult<f64> {
    match value {
        "Male" => Ok(0.0),
        "Female" => Ok(1.0),
        other => Err(PipelineError::encoding(
            row,
            id,
            GENDER,
            format!("expected Male or Female, got {other:?}"),
        )),
    }
}

fn encode_yes_no(row: usize, id: &str, column: &str, value: &str) -> PipelineResult<f64> {
    match value {
        "Yes" => Ok(1.0),
        "No" => Ok(0.0),
        other => Err(PipelineError::encoding(
            row,
            id,
            column,
            format!("expected Yes or No, got {other:?}"),
        )),
    }
}

fn encode_category(
    row: usize,
    id: &str,
    column: &str,
    vocabulary: &Vocabulary,
    value: &str,
) -> PipelineResult<f64> {
    vocabulary.code(value).map(|code| code as f64).ok_or_else(|| {
        PipelineError::encoding(
            row,
            id,
            column,
            format!(
                "{value:?} is not one of the trained values [{}]",
                vocabulary.values().join(", ")
            ),
        )
    })
}

fn finite(row: usize, id: &str, column: &str, value: f64) -> PipelineResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PipelineError::encoding(row, id, column, format!("{value} is not a finite number")))
    }
}

fn attendance(row: usize, id: &str, value: f64) -> PipelineResult<f64> {
    let value = finite(row, id, ATTENDANCE_RATE, value)?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(PipelineError::encoding(
            row,
            id,
            ATTENDANCE_RATE,
            format!("{value} is outside the 0-100 percentage range"),
        ))
    }
}
