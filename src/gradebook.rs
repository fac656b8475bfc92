use std::collections::HashMap;

use crate::models::{
    ExamScore, RemediationOverride, RemediationStatus, ScoreKey, SessionScore,
};

/// Score records indexed once by `(student, subject, stage)` so that stage and
/// cumulative aggregation never rescan the flat collections.
#[derive(Debug, Default, Clone)]
pub struct GradeBook {
    sessions: HashMap<ScoreKey, Vec<SessionScore>>,
    exams: HashMap<ScoreKey, ExamScore>,
    overrides: HashMap<ScoreKey, f64>,
}

impl GradeBook {
    pub fn new(
        sessions: Vec<SessionScore>,
        exams: Vec<ExamScore>,
        overrides: Vec<RemediationOverride>,
    ) -> Self {
        let mut book = GradeBook::default();
        for session in sessions {
            book.upsert_session(session);
        }
        for exam in exams {
            book.upsert_exam(exam);
        }
        for record in overrides {
            book.apply_override(record);
        }
        book
    }

    /// Replaces the score of an existing session number, otherwise appends.
    pub fn upsert_session(&mut self, session: SessionScore) {
        let entry = self.sessions.entry(session.key()).or_default();
        match entry
            .iter()
            .position(|existing| existing.session_number == session.session_number)
        {
            Some(index) => entry[index] = session,
            None => entry.push(session),
        }
    }

    pub fn upsert_exam(&mut self, exam: ExamScore) {
        self.exams.insert(exam.key(), exam);
    }

    /// Only completed remediations carrying a positive value take part in scoring.
    pub fn apply_override(&mut self, record: RemediationOverride) {
        match (record.status, record.override_value) {
            (RemediationStatus::Done, Some(value)) if value > 0.0 => {
                self.overrides.insert(record.key(), value);
            }
            _ => {}
        }
    }

    pub fn sessions(&self, key: &ScoreKey) -> &[SessionScore] {
        self.sessions.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn exam(&self, key: &ScoreKey) -> Option<&ExamScore> {
        self.exams.get(key)
    }

    pub fn override_value(&self, key: &ScoreKey) -> Option<f64> {
        self.overrides.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn key() -> ScoreKey {
        ScoreKey {
            student_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            stage_id: Uuid::new_v4(),
        }
    }

    fn session(key: ScoreKey, session_number: i32, score: f64) -> SessionScore {
        SessionScore {
            student_id: key.student_id,
            subject_id: key.subject_id,
            stage_id: key.stage_id,
            session_number,
            score,
        }
    }

    fn exam(key: ScoreKey, score: f64) -> ExamScore {
        ExamScore {
            student_id: key.student_id,
            subject_id: key.subject_id,
            stage_id: key.stage_id,
            score,
        }
    }

    fn remediation(
        key: ScoreKey,
        status: RemediationStatus,
        value: Option<f64>,
    ) -> RemediationOverride {
        RemediationOverride {
            student_id: key.student_id,
            subject_id: key.subject_id,
            stage_id: key.stage_id,
            status,
            override_value: value,
        }
    }

    #[test]
    fn groups_sessions_by_composite_key() {
        let first = key();
        let second = ScoreKey {
            subject_id: Uuid::new_v4(),
            ..first
        };
        let book = GradeBook::new(
            vec![
                session(first, 1, 70.0),
                session(second, 1, 50.0),
                session(first, 2, 90.0),
            ],
            Vec::new(),
            Vec::new(),
        );

        assert_eq!(book.sessions(&first).len(), 2);
        assert_eq!(book.sessions(&second).len(), 1);
        assert!(book.sessions(&key()).is_empty());
    }

    #[test]
    fn later_session_record_supersedes_same_number() {
        let key = key();
        let book = GradeBook::new(
            vec![session(key, 1, 40.0), session(key, 1, 65.0)],
            Vec::new(),
            Vec::new(),
        );

        let sessions = book.sessions(&key);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].score, 65.0);
    }

    #[test]
    fn later_exam_record_supersedes_same_key() {
        let retaken = key();
        let other = key();
        let mut book = GradeBook::new(
            Vec::new(),
            vec![exam(retaken, 35.0), exam(other, 60.0), exam(retaken, 72.0)],
            Vec::new(),
        );
        assert_eq!(book.exam(&retaken).map(|exam| exam.score), Some(72.0));

        book.upsert_exam(exam(retaken, 55.0));
        assert_eq!(book.exam(&retaken).map(|exam| exam.score), Some(55.0));
        assert_eq!(book.exam(&other).map(|exam| exam.score), Some(60.0));
    }

    #[test]
    fn only_done_overrides_with_value_participate() {
        let pending = key();
        let empty = key();
        let zero = key();
        let done = key();
        let book = GradeBook::new(
            Vec::new(),
            Vec::new(),
            vec![
                remediation(pending, RemediationStatus::Pending, Some(70.0)),
                remediation(empty, RemediationStatus::Done, None),
                remediation(zero, RemediationStatus::Done, Some(0.0)),
                remediation(done, RemediationStatus::Done, Some(75.0)),
            ],
        );

        assert_eq!(book.override_value(&pending), None);
        assert_eq!(book.override_value(&empty), None);
        assert_eq!(book.override_value(&zero), None);
        assert_eq!(book.override_value(&done), Some(75.0));
    }
}
