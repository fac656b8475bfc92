use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub student_number: String,
    pub full_name: String,
}

/// Composite key shared by every per-subject record of a student in a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreKey {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub stage_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScore {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub stage_id: Uuid,
    pub session_number: i32,
    pub score: f64,
}

impl SessionScore {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            student_id: self.student_id,
            subject_id: self.subject_id,
            stage_id: self.stage_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamScore {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub stage_id: Uuid,
    pub score: f64,
}

impl ExamScore {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            student_id: self.student_id,
            subject_id: self.subject_id,
            stage_id: self.stage_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationStatus {
    Pending,
    Done,
}

impl RemediationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationStatus::Pending => "pending",
            RemediationStatus::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RemediationStatus::Pending),
            "done" => Some(RemediationStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationOverride {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub stage_id: Uuid,
    pub status: RemediationStatus,
    pub override_value: Option<f64>,
}

impl RemediationOverride {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            student_id: self.student_id,
            subject_id: self.subject_id,
            stage_id: self.stage_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectCredit {
    pub subject_id: Uuid,
    pub name: String,
    pub credit_weight: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub stage_id: Uuid,
    pub name: String,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub subject_id: Uuid,
    pub stage_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ScheduleEntry {
    /// Length of the session in minutes; inverted entries count as zero.
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes().max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemediationTask {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub stage_id: Uuid,
    pub status: RemediationStatus,
    pub baseline_score: f64,
    pub duration_minutes: i32,
    pub override_value: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl RemediationTask {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            student_id: self.student_id,
            subject_id: self.subject_id,
            stage_id: self.stage_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub daily_avg: f64,
    pub exam_score: f64,
    pub total: f64,
    pub weight: f64,
    pub grade_label: &'static str,
    pub passes_threshold: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectScore {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub credit_weight: i32,
    pub result: SessionResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage_id: Uuid,
    pub stage_index: f64,
    pub credit_total: i32,
    pub subjects: Vec<SubjectScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CumulativeResult {
    pub cumulative_index: f64,
    pub stages: Vec<StageResult>,
}
