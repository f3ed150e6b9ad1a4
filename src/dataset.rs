use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    LabelledRecord, ScoredStudent, StudentRecord, FINAL_EXAM_SCORE, REQUIRED_COLUMNS,
};

/// An uploaded table: typed records plus the raw rows for pass-through export.
#[derive(Debug, Clone)]
pub struct StudentBatch {
    pub headers: StringRecord,
    pub records: Vec<StudentRecord>,
    pub raw_rows: Vec<StringRecord>,
}

impl StudentBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn read_students(path: &Path) -> PipelineResult<StudentBatch> {
    let file = std::fs::File::open(path)?;
    let batch = read_students_from(file)?;
    info!(rows = batch.len(), path = %path.display(), "read student batch");
    Ok(batch)
}

pub fn read_students_from<R: Read>(input: R) -> PipelineResult<StudentBatch> {
    let mut reader = csv_reader(input);
    let headers = reader.headers()?.clone();
    require_columns(&headers, &REQUIRED_COLUMNS)?;

    let mut records = Vec::new();
    let mut raw_rows = Vec::new();
    let mut ids = StudentIds::default();

    for (index, result) in reader.records().enumerate() {
        let raw = result?;
        let row = index + 1;
        let record: StudentRecord = raw
            .deserialize(Some(&headers))
            .map_err(|err| row_error(row, &raw, &headers, err))?;
        ids.admit(row, &record.student_id)?;

        records.push(record);
        raw_rows.push(raw);
    }

    Ok(StudentBatch {
        headers,
        records,
        raw_rows,
    })
}

/// Reads a labelled historical dataset for training.
pub fn read_training(path: &Path) -> PipelineResult<Vec<LabelledRecord>> {
    let file = std::fs::File::open(path)?;
    let rows = read_training_from(file)?;
    info!(rows = rows.len(), path = %path.display(), "read training data");
    Ok(rows)
}

pub fn read_training_from<R: Read>(input: R) -> PipelineResult<Vec<LabelledRecord>> {
    #[derive(serde::Deserialize)]
    struct Label {
        #[serde(rename = "Final_Exam_Score")]
        final_exam_score: f64,
    }

    let mut reader = csv_reader(input);
    let headers = reader.headers()?.clone();
    require_columns(&headers, &REQUIRED_COLUMNS)?;
    require_columns(&headers, &[FINAL_EXAM_SCORE])?;

    let mut labelled = Vec::new();
    let mut ids = StudentIds::default();
    for (index, result) in reader.records().enumerate() {
        let raw = result?;
        let row = index + 1;
        let student: StudentRecord = raw
            .deserialize(Some(&headers))
            .map_err(|err| row_error(row, &raw, &headers, err))?;
        let label: Label = raw
            .deserialize(Some(&headers))
            .map_err(|err| row_error(row, &raw, &headers, err))?;

        ids.admit(row, &student.student_id)?;
        if !label.final_exam_score.is_finite() {
            return Err(PipelineError::encoding(
                row,
                &student.student_id,
                FINAL_EXAM_SCORE,
                format!("{} is not a finite number", label.final_exam_score),
            ));
        }

        labelled.push(LabelledRecord {
            student,
            final_exam_score: label.final_exam_score,
        });
    }

    Ok(labelled)
}

/// Surrounding whitespace is dropped from headers and every cell.
fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new().trim(Trim::All).from_reader(input)
}

/// Identifiers seen so far in one file; each must be non-empty and unique.
#[derive(Default)]
struct StudentIds {
    seen: HashSet<String>,
}

impl StudentIds {
    fn admit(&mut self, row: usize, student_id: &str) -> PipelineResult<()> {
        if student_id.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "row {row} has an empty Student_ID"
            )));
        }
        if !self.seen.insert(student_id.to_string()) {
            return Err(PipelineError::InvalidInput(format!(
                "row {row} repeats Student_ID {student_id:?}"
            )));
        }
        Ok(())
    }
}

fn require_columns(headers: &StringRecord, required: &[&str]) -> PipelineResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|header| header == *column))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )))
    }
}

fn row_error(
    row: usize,
    raw: &StringRecord,
    headers: &StringRecord,
    err: csv::Error,
) -> PipelineError {
    let student_id = headers
        .iter()
        .position(|h| h == crate::models::STUDENT_ID)
        .and_then(|i| raw.get(i))
        .unwrap_or("-");

    let column = match err.kind() {
        csv::ErrorKind::Deserialize { err, .. } => err
            .field()
            .and_then(|i| headers.get(i as usize))
            .unwrap_or("-")
            .to_string(),
        _ => "-".to_string(),
    };

    PipelineError::encoding(row, student_id, &column, err.to_string())
}

/// Writes the original columns followed by prediction and risk columns.
pub fn write_predictions<W: Write>(
    output: W,
    batch: &StudentBatch,
    scored: &[ScoredStudent],
    below: Option<f64>,
) -> PipelineResult<usize> {
    let mut writer = WriterBuilder::new().from_writer(output);

    let mut headers = batch.headers.clone();
    headers.push_field("Predicted_Score");
    headers.push_field("Risk_Level");
    headers.push_field("Risk_Icon");
    writer.write_record(&headers)?;

    let mut written = 0usize;
    for (raw, student) in batch.raw_rows.iter().zip(scored) {
        if below.is_some_and(|threshold| student.predicted_score >= threshold) {
            continue;
        }

        let mut row = raw.clone();
        row.push_field(&format!("{:.2}", student.predicted_score));
        row.push_field(student.risk.label());
        row.push_field(student.marker());
        writer.write_record(&row)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

pub fn write_predictions_to_path(
    path: &Path,
    batch: &StudentBatch,
    scored: &[ScoredStudent],
    below: Option<f64>,
) -> PipelineResult<usize> {
    let file = std::fs::File::create(path)?;
    let written = write_predictions(file, batch, scored, below)?;
    info!(rows = written, path = %path.display(), "wrote predictions");
    Ok(written)
}

/// Writes a small demonstration batch. With `labelled` it also carries
/// `Final_Exam_Score` so it can be used for training.
pub fn write_sample<W: Write>(output: W, labelled: bool) -> PipelineResult<usize> {
    let students = [
        ("STU001", 17, "Female", 28, 94.5, "A", "Master", "Yes", "Yes", "Medium", 84.0),
        ("STU002", 16, "Male", 6, 61.0, "D", "High School", "No", "No", "Low", 31.5),
        ("STU003", 18, "Female", 15, 78.2, "B", "Bachelor", "Yes", "No", "Medium", 58.0),
        ("STU004", 19, "Male", 11, 70.4, "C", "High School", "Yes", "Yes", "Low", 46.5),
        ("STU005", 17, "Male", 35, 98.1, "A", "PhD", "Yes", "Yes", "High", 91.0),
        ("STU006", 18, "Female", 9, 66.7, "C", "Bachelor", "No", "Yes", "Medium", 41.0),
        ("STU007", 16, "Female", 21, 85.0, "B", "Master", "Yes", "No", "High", 69.5),
        ("STU008", 19, "Male", 4, 60.3, "D", "Bachelor", "Yes", "No", "Low", 27.0),
        ("STU009", 17, "Female", 18, 81.9, "B", "High School", "Yes", "Yes", "Medium", 63.0),
        ("STU010", 18, "Male", 25, 90.2, "A", "PhD", "No", "Yes", "High", 77.5),
    ];

    let mut writer = csv::Writer::from_writer(output);
    let mut headers: Vec<&str> = REQUIRED_COLUMNS.to_vec();
    headers.push("Family_Income_Level");
    if labelled {
        headers.push(FINAL_EXAM_SCORE);
    }
    writer.write_record(&headers)?;

    for (id, age, gender, hours, attendance, grade, education, internet, extra, income, score) in
        students
    {
        let mut row = vec![
            id.to_string(),
            age.to_string(),
            gender.to_string(),
            hours.to_string(),
            attendance.to_string(),
            grade.to_string(),
            education.to_string(),
            internet.to_string(),
            extra.to_string(),
            income.to_string(),
        ];
        if labelled {
            row.push(score.to_string());
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(students.len())
}
