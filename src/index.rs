use uuid::Uuid;

use crate::gradebook::GradeBook;
use crate::models::{CumulativeResult, ScoreKey, Stage, StageResult, SubjectCredit, SubjectScore};
use crate::scoring::{self, NotReady};

/// Credit-weighted index of one student in one stage. Every subject must have
/// a complete score; a single missing subject leaves the stage not ready.
pub fn stage_index(
    book: &GradeBook,
    student_id: Uuid,
    stage_id: Uuid,
    subjects: &[SubjectCredit],
) -> Result<StageResult, NotReady> {
    if subjects.is_empty() {
        return Err(NotReady::NoSubjects);
    }

    let mut weighted_sum = 0.0;
    let mut credit_total = 0;
    let mut scores = Vec::with_capacity(subjects.len());

    for subject in subjects {
        let key = ScoreKey {
            student_id,
            subject_id: subject.subject_id,
            stage_id,
        };
        let result = scoring::compute(
            book.sessions(&key),
            book.exam(&key),
            book.override_value(&key),
        )
        .map_err(|cause| NotReady::MissingSubject {
            subject_id: subject.subject_id,
            cause: Box::new(cause),
        })?;

        weighted_sum += result.weight * f64::from(subject.credit_weight);
        credit_total += subject.credit_weight;
        scores.push(SubjectScore {
            subject_id: subject.subject_id,
            subject_name: subject.name.clone(),
            credit_weight: subject.credit_weight,
            result,
        });
    }

    if credit_total <= 0 {
        return Err(NotReady::NoSubjects);
    }

    Ok(StageResult {
        stage_id,
        stage_index: weighted_sum / f64::from(credit_total),
        credit_total,
        subjects: scores,
    })
}

/// Unweighted mean of the stage indices that are ready. Stages that are not
/// ready are skipped rather than counted as zero.
pub fn cumulative_index(
    book: &GradeBook,
    student_id: Uuid,
    stages: &[Stage],
    subjects: &[SubjectCredit],
) -> Option<CumulativeResult> {
    let ready: Vec<StageResult> = ordered(stages)
        .into_iter()
        .filter_map(|stage| stage_index(book, student_id, stage.stage_id, subjects).ok())
        .collect();

    if ready.is_empty() {
        return None;
    }

    let sum: f64 = ready.iter().map(|stage| stage.stage_index).sum();
    Some(CumulativeResult {
        cumulative_index: sum / ready.len() as f64,
        stages: ready,
    })
}

#[derive(Debug, Clone)]
pub struct StageRow {
    pub stage: Stage,
    pub outcome: Result<StageResult, NotReady>,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub stages: Vec<StageRow>,
    pub cumulative: Option<CumulativeResult>,
}

/// Every stage of a student, ready or not, with the cumulative index.
pub fn transcript(
    book: &GradeBook,
    student_id: Uuid,
    stages: &[Stage],
    subjects: &[SubjectCredit],
) -> Transcript {
    let rows = ordered(stages)
        .into_iter()
        .map(|stage| StageRow {
            stage: stage.clone(),
            outcome: stage_index(book, student_id, stage.stage_id, subjects),
        })
        .collect();

    Transcript {
        stages: rows,
        cumulative: cumulative_index(book, student_id, stages, subjects),
    }
}

fn ordered(stages: &[Stage]) -> Vec<&Stage> {
    let mut sorted: Vec<&Stage> = stages.iter().collect();
    sorted.sort_by_key(|stage| stage.ordinal);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExamScore, RemediationOverride, RemediationStatus, SessionScore};

    struct Fixture {
        student_id: Uuid,
        sessions: Vec<SessionScore>,
        exams: Vec<ExamScore>,
        overrides: Vec<RemediationOverride>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                student_id: Uuid::new_v4(),
                sessions: Vec::new(),
                exams: Vec::new(),
                overrides: Vec::new(),
            }
        }

        fn score(&mut self, subject_id: Uuid, stage_id: Uuid, daily: &[f64], exam: Option<f64>) {
            for (index, score) in daily.iter().enumerate() {
                self.sessions.push(SessionScore {
                    student_id: self.student_id,
                    subject_id,
                    stage_id,
                    session_number: index as i32 + 1,
                    score: *score,
                });
            }
            if let Some(score) = exam {
                self.exams.push(ExamScore {
                    student_id: self.student_id,
                    subject_id,
                    stage_id,
                    score,
                });
            }
        }

        fn book(&self) -> GradeBook {
            GradeBook::new(
                self.sessions.clone(),
                self.exams.clone(),
                self.overrides.clone(),
            )
        }
    }

    fn subject(name: &str, credit_weight: i32) -> SubjectCredit {
        SubjectCredit {
            subject_id: Uuid::new_v4(),
            name: name.to_string(),
            credit_weight,
        }
    }

    fn stage(ordinal: i32) -> Stage {
        Stage {
            stage_id: Uuid::new_v4(),
            name: format!("Stage {ordinal}"),
            ordinal,
        }
    }

    #[test]
    fn credit_weighted_stage_index() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("M1", 2), subject("M2", 2)];
        let stage = stage(1);
        // M1 total 82.0 (BB), M2 total 60.0 (C)
        fixture.score(subjects[0].subject_id, stage.stage_id, &[70.0, 80.0, 90.0], Some(85.0));
        fixture.score(subjects[1].subject_id, stage.stage_id, &[60.0], Some(60.0));

        let result = stage_index(&fixture.book(), fixture.student_id, stage.stage_id, &subjects)
            .expect("stage ready");
        assert!((result.stage_index - 3.00).abs() < 1e-9);
        assert_eq!(result.credit_total, 4);
        assert_eq!(result.subjects.len(), 2);
    }

    #[test]
    fn unequal_credits_shift_the_index() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("A", 1), subject("B", 3)];
        let stage = stage(1);
        fixture.score(subjects[0].subject_id, stage.stage_id, &[100.0], Some(100.0));
        fixture.score(subjects[1].subject_id, stage.stage_id, &[50.0], Some(50.0));

        let result = stage_index(&fixture.book(), fixture.student_id, stage.stage_id, &subjects)
            .expect("stage ready");
        let expected = (4.00 * 1.0 + 2.50 * 3.0) / 4.0;
        assert!((result.stage_index - expected).abs() < 1e-9);
    }

    #[test]
    fn one_incomplete_subject_blocks_the_stage() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("A", 2), subject("B", 3)];
        let stage = stage(1);
        fixture.score(subjects[0].subject_id, stage.stage_id, &[80.0], Some(80.0));
        fixture.score(subjects[1].subject_id, stage.stage_id, &[80.0], None);

        let outcome = stage_index(&fixture.book(), fixture.student_id, stage.stage_id, &subjects);
        assert_eq!(
            outcome.unwrap_err(),
            NotReady::MissingSubject {
                subject_id: subjects[1].subject_id,
                cause: Box::new(NotReady::MissingExam),
            }
        );
    }

    #[test]
    fn empty_curriculum_is_not_ready() {
        let fixture = Fixture::new();
        let outcome = stage_index(&fixture.book(), fixture.student_id, Uuid::new_v4(), &[]);
        assert_eq!(outcome.unwrap_err(), NotReady::NoSubjects);
    }

    #[test]
    fn stage_uses_completed_remediation_value() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("A", 2)];
        let stage = stage(1);
        fixture.score(subjects[0].subject_id, stage.stage_id, &[20.0, 30.0], Some(30.0));
        fixture.overrides.push(RemediationOverride {
            student_id: fixture.student_id,
            subject_id: subjects[0].subject_id,
            stage_id: stage.stage_id,
            status: RemediationStatus::Done,
            override_value: Some(90.0),
        });

        let result = stage_index(&fixture.book(), fixture.student_id, stage.stage_id, &subjects)
            .expect("stage ready");
        // 90 * 0.6 + 30 * 0.4 = 66 -> CC
        assert_eq!(result.subjects[0].result.grade_label, "CC");
        assert!((result.stage_index - 2.80).abs() < 1e-9);
    }

    #[test]
    fn cumulative_is_unweighted_mean_across_stages() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("A", 1), subject("B", 4)];
        let first = stage(1);
        let second = stage(2);
        // stage 1: A=AA (4.0), B=C (2.5) -> (4.0 + 10.0) / 5 = 2.8
        fixture.score(subjects[0].subject_id, first.stage_id, &[100.0], Some(100.0));
        fixture.score(subjects[1].subject_id, first.stage_id, &[50.0], Some(50.0));
        // stage 2: A=C (2.5), B=AA (4.0) -> (2.5 + 16.0) / 5 = 3.7
        fixture.score(subjects[0].subject_id, second.stage_id, &[50.0], Some(50.0));
        fixture.score(subjects[1].subject_id, second.stage_id, &[100.0], Some(100.0));

        let result = cumulative_index(
            &fixture.book(),
            fixture.student_id,
            &[second.clone(), first.clone()],
            &subjects,
        )
        .expect("cumulative ready");
        assert!((result.cumulative_index - 3.25).abs() < 1e-9);
        assert_eq!(result.stages[0].stage_id, first.stage_id);
    }

    #[test]
    fn stage_indices_average_into_cumulative() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("M1", 2), subject("M2", 2)];
        let first = stage(1);
        let second = stage(2);
        // stage 1: BB + C = 3.00
        fixture.score(subjects[0].subject_id, first.stage_id, &[70.0, 80.0, 90.0], Some(85.0));
        fixture.score(subjects[1].subject_id, first.stage_id, &[60.0], Some(60.0));
        // stage 2: AA + CC = 3.40
        fixture.score(subjects[0].subject_id, second.stage_id, &[100.0], Some(100.0));
        fixture.score(subjects[1].subject_id, second.stage_id, &[65.0], Some(65.0));

        let result = cumulative_index(
            &fixture.book(),
            fixture.student_id,
            &[first, second],
            &subjects,
        )
        .expect("cumulative ready");
        assert!((result.stages[0].stage_index - 3.00).abs() < 1e-9);
        assert!((result.stages[1].stage_index - 3.40).abs() < 1e-9);
        assert!((result.cumulative_index - 3.20).abs() < 1e-9);
    }

    #[test]
    fn cumulative_skips_stages_that_are_not_ready() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("A", 2)];
        let first = stage(1);
        let second = stage(2);
        fixture.score(subjects[0].subject_id, first.stage_id, &[75.0], Some(75.0));
        fixture.score(subjects[0].subject_id, second.stage_id, &[75.0], None);

        let result = cumulative_index(
            &fixture.book(),
            fixture.student_id,
            &[first, second],
            &subjects,
        )
        .expect("cumulative ready");
        assert!((result.cumulative_index - 3.20).abs() < 1e-9);
        assert_eq!(result.stages.len(), 1);
    }

    #[test]
    fn cumulative_absent_when_no_stage_is_ready() {
        let fixture = Fixture::new();
        let subjects = vec![subject("A", 2)];
        let book = fixture.book();
        let cumulative = cumulative_index(&book, fixture.student_id, &[stage(1)], &subjects);
        assert!(cumulative.is_none());
    }

    #[test]
    fn transcript_lists_every_stage_with_cause() {
        let mut fixture = Fixture::new();
        let subjects = vec![subject("A", 2)];
        let first = stage(1);
        let second = stage(2);
        fixture.score(subjects[0].subject_id, first.stage_id, &[75.0], Some(75.0));

        let transcript = transcript(
            &fixture.book(),
            fixture.student_id,
            &[second.clone(), first.clone()],
            &subjects,
        );
        assert_eq!(transcript.stages.len(), 2);
        assert_eq!(transcript.stages[0].stage.stage_id, first.stage_id);
        assert!(transcript.stages[0].outcome.is_ok());
        assert_eq!(
            transcript.stages[1].outcome.as_ref().unwrap_err(),
            &NotReady::MissingSubject {
                subject_id: subjects[0].subject_id,
                cause: Box::new(NotReady::NotStarted),
            }
        );
        assert!(transcript.cumulative.is_some());
    }
}
