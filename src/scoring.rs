use thiserror::Error;
use uuid::Uuid;

use crate::models::{ExamScore, SessionResult, SessionScore};
use crate::weights;

pub const DAILY_WEIGHT: f64 = 0.6;
pub const EXAM_WEIGHT: f64 = 0.4;
pub const PASS_THRESHOLD: f64 = 40.0;

/// Why a score could not be computed yet. A failing score is not one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotReady {
    #[error("not started: no session scores recorded")]
    NotStarted,
    #[error("incomplete: exam score missing")]
    MissingExam,
    #[error("incomplete: subject {subject_id} has no complete score ({cause})")]
    MissingSubject {
        subject_id: Uuid,
        cause: Box<NotReady>,
    },
    #[error("no subjects in curriculum")]
    NoSubjects,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn daily_average(sessions: &[SessionScore]) -> Option<f64> {
    if sessions.is_empty() {
        return None;
    }
    let sum: f64 = sessions.iter().map(|session| session.score).sum();
    Some(sum / sessions.len() as f64)
}

pub fn combine(daily_avg: f64, exam_score: f64) -> f64 {
    daily_avg * DAILY_WEIGHT + exam_score * EXAM_WEIGHT
}

/// Scores one subject in one stage. A present override greater than zero
/// replaces the daily average outright. Band and threshold are judged on the
/// unrounded total; only the reported figures are rounded.
pub fn compute(
    sessions: &[SessionScore],
    exam: Option<&ExamScore>,
    override_value: Option<f64>,
) -> Result<SessionResult, NotReady> {
    let averaged = daily_average(sessions).ok_or(NotReady::NotStarted)?;
    let daily_avg = match override_value {
        Some(value) if value > 0.0 => value,
        _ => averaged,
    };
    let exam = exam.ok_or(NotReady::MissingExam)?;

    let total = combine(daily_avg, exam.score);
    let band = weights::lookup(total.clamp(0.0, 100.0));

    Ok(SessionResult {
        daily_avg: round2(daily_avg),
        exam_score: exam.score,
        total: round2(total),
        weight: band.weight,
        grade_label: band.grade_label,
        passes_threshold: total >= PASS_THRESHOLD,
    })
}
