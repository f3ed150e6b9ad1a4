use serde::Deserialize;

use crate::risk::RiskBucket;

pub const STUDENT_ID: &str = "Student_ID";
pub const AGE: &str = "Age";
pub const GENDER: &str = "Gender";
pub const STUDY_HOURS: &str = "Study_Hours_per_Week";
pub const ATTENDANCE_RATE: &str = "Attendance_Rate";
pub const PREVIOUS_GRADE: &str = "Previous_Grade";
pub const PARENTAL_EDUCATION: &str = "Parental_Education_Level";
pub const INTERNET_ACCESS: &str = "Internet_Access_at_Home";
pub const EXTRACURRICULAR: &str = "Extracurricular_Activities";
pub const FINAL_EXAM_SCORE: &str = "Final_Exam_Score";

/// Columns an input batch must carry.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    STUDENT_ID,
    AGE,
    GENDER,
    STUDY_HOURS,
    ATTENDANCE_RATE,
    PREVIOUS_GRADE,
    PARENTAL_EDUCATION,
    INTERNET_ACCESS,
    EXTRACURRICULAR,
];

/// Model inputs in training order.
pub const FEATURE_COLUMNS: [&str; 8] = [
    AGE,
    GENDER,
    STUDY_HOURS,
    ATTENDANCE_RATE,
    PREVIOUS_GRADE,
    PARENTAL_EDUCATION,
    INTERNET_ACCESS,
    EXTRACURRICULAR,
];

pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentRecord {
    #[serde(rename = "Student_ID")]
    pub student_id: String,
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Study_Hours_per_Week")]
    pub study_hours_per_week: f64,
    #[serde(rename = "Attendance_Rate")]
    pub attendance_rate: f64,
    #[serde(rename = "Previous_Grade")]
    pub previous_grade: String,
    #[serde(rename = "Parental_Education_Level")]
    pub parental_education_level: String,
    #[serde(rename = "Internet_Access_at_Home")]
    pub internet_access_at_home: String,
    #[serde(rename = "Extracurricular_Activities")]
    pub extracurricular_activities: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelledRecord {
    pub student: StudentRecord,
    pub final_exam_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub student_id: String,
    pub features: [f64; FEATURE_COUNT],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredStudent {
    pub student: StudentRecord,
    pub predicted_score: f64,
    pub risk: RiskBucket,
}

impl ScoredStudent {
    pub fn marker(&self) -> &'static str {
        self.risk.marker()
    }
}
