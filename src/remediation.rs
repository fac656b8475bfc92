use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::gradebook::GradeBook;
use crate::models::{ExamScore, RemediationStatus, RemediationTask, ScheduleEntry, ScoreKey};
use crate::scoring::{self, PASS_THRESHOLD};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("remediation store unavailable: {0}")]
    Unavailable(String),
}

/// Connection-level failures are reported as unavailability; anything the
/// database itself rejected stays a database error.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Persistence seam for remediation tasks.
///
/// `insert_if_absent` must be a single conditional write keyed on
/// `(student, subject, stage)` among pending tasks, returning `false` when a
/// pending task already exists. The trigger's read-before-write check alone
/// does not close the race between two concurrent exam saves.
#[async_trait]
pub trait RemediationStore: Send + Sync {
    async fn find_pending(&self, key: &ScoreKey) -> Result<Option<RemediationTask>, StoreError>;

    async fn insert_if_absent(&self, task: &RemediationTask) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSessions,
    AboveThreshold,
    ZeroScore,
    AlreadyPending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Created(RemediationTask),
    Skipped(SkipReason),
}

impl TriggerOutcome {
    pub fn created(&self) -> bool {
        matches!(self, TriggerOutcome::Created(_))
    }

    pub fn task(&self) -> Option<&RemediationTask> {
        match self {
            TriggerOutcome::Created(task) => Some(task),
            TriggerOutcome::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub created: Vec<RemediationTask>,
    pub skipped: usize,
    pub failures: Vec<(Uuid, StoreError)>,
}

impl BatchOutcome {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    /// Distinct students with at least one new task.
    pub fn student_count(&self) -> usize {
        self.created
            .iter()
            .map(|task| task.student_id)
            .collect::<HashSet<_>>()
            .len()
    }
}

pub struct RemediationTrigger<'a, S> {
    store: &'a S,
}

impl<'a, S: RemediationStore> RemediationTrigger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Re-evaluates one subject score right after its exam was saved and opens
    /// a remediation task when it falls below the pass threshold.
    ///
    /// The raw daily average is used here even if a completed remediation
    /// exists: an earlier remediation must not hide a fresh failing result.
    pub async fn on_exam_recorded(
        &self,
        book: &GradeBook,
        exam: &ExamScore,
        schedule: &[ScheduleEntry],
    ) -> Result<TriggerOutcome, StoreError> {
        let key = exam.key();
        let Some(daily_avg) = scoring::daily_average(book.sessions(&key)) else {
            tracing::debug!(
                student_id = %key.student_id,
                subject_id = %key.subject_id,
                "no sessions recorded, skipping remediation check"
            );
            return Ok(TriggerOutcome::Skipped(SkipReason::NoSessions));
        };

        let ip = scoring::combine(daily_avg, exam.score);
        if ip >= PASS_THRESHOLD {
            return Ok(TriggerOutcome::Skipped(SkipReason::AboveThreshold));
        }
        if ip <= 0.0 {
            return Ok(TriggerOutcome::Skipped(SkipReason::ZeroScore));
        }

        if self.store.find_pending(&key).await?.is_some() {
            tracing::debug!(
                student_id = %key.student_id,
                subject_id = %key.subject_id,
                "pending remediation already open"
            );
            return Ok(TriggerOutcome::Skipped(SkipReason::AlreadyPending));
        }

        let task = RemediationTask {
            id: Uuid::new_v4(),
            student_id: key.student_id,
            subject_id: key.subject_id,
            stage_id: key.stage_id,
            status: RemediationStatus::Pending,
            baseline_score: scoring::round2(ip),
            duration_minutes: average_duration(schedule, key.subject_id, key.stage_id),
            override_value: None,
            created_at: Utc::now(),
        };

        if !self.store.insert_if_absent(&task).await? {
            tracing::debug!(
                student_id = %key.student_id,
                subject_id = %key.subject_id,
                "pending remediation inserted concurrently"
            );
            return Ok(TriggerOutcome::Skipped(SkipReason::AlreadyPending));
        }

        tracing::info!(
            student_id = %task.student_id,
            subject_id = %task.subject_id,
            stage_id = %task.stage_id,
            baseline_score = task.baseline_score,
            duration_minutes = task.duration_minutes,
            "remediation task created"
        );
        Ok(TriggerOutcome::Created(task))
    }

    /// Runs the trigger for every exam saved in one grading operation. A store
    /// failure for one student is recorded and the rest still run.
    pub async fn on_exams_recorded(
        &self,
        book: &GradeBook,
        exams: &[ExamScore],
        schedule: &[ScheduleEntry],
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for exam in exams {
            match self.on_exam_recorded(book, exam, schedule).await {
                Ok(result) if result.created() => {
                    outcome.created.extend(result.task().cloned());
                }
                Ok(_) => outcome.skipped += 1,
                Err(err) => {
                    tracing::error!(
                        student_id = %exam.student_id,
                        error = %err,
                        "remediation check failed"
                    );
                    outcome.failures.push((exam.student_id, err));
                }
            }
        }

        outcome
    }
}

/// Mean scheduled session length in minutes for one subject in one stage,
/// rounded to the nearest minute; zero when nothing is scheduled.
pub fn average_duration(schedule: &[ScheduleEntry], subject_id: Uuid, stage_id: Uuid) -> i32 {
    let durations: Vec<i64> = schedule
        .iter()
        .filter(|entry| entry.subject_id == subject_id && entry.stage_id == stage_id)
        .map(ScheduleEntry::duration_minutes)
        .collect();

    if durations.is_empty() {
        return 0;
    }

    let total: i64 = durations.iter().sum();
    (total as f64 / durations.len() as f64).round() as i32
}
