use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::gradebook::GradeBook;
use crate::models::{
    ExamScore, RemediationOverride, RemediationStatus, RemediationTask, ScheduleEntry, ScoreKey,
    SessionScore, Stage, Student, SubjectCredit,
};
use crate::remediation::{RemediationStore, StoreError};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("S-2026-001", "Avery Lee"),
        ("S-2026-002", "Jules Moreno"),
        ("S-2026-003", "Kiara Patel"),
    ];
    for (number, name) in students {
        sqlx::query(
            r#"
            INSERT INTO academic_scoring.students (id, student_number, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_number) DO UPDATE SET full_name = EXCLUDED.full_name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(number)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let subjects = vec![("Mathematics", 3), ("Language", 2), ("Science", 2)];
    for (name, credit_weight) in subjects {
        sqlx::query(
            r#"
            INSERT INTO academic_scoring.subjects (id, name, credit_weight)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET credit_weight = EXCLUDED.credit_weight
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(credit_weight)
        .execute(pool)
        .await?;
    }

    for (name, ordinal) in [("Stage 1", 1), ("Stage 2", 2)] {
        sqlx::query(
            r#"
            INSERT INTO academic_scoring.stages (id, name, ordinal)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(ordinal)
        .execute(pool)
        .await?;
    }

    let slots = vec![
        ("Mathematics", "Stage 1", (7, 30), (9, 0)),
        ("Mathematics", "Stage 1", (10, 0), (11, 0)),
        ("Language", "Stage 1", (9, 0), (10, 0)),
        ("Science", "Stage 1", (11, 0), (12, 30)),
    ];
    for (subject, stage, start, end) in slots {
        sqlx::query(
            r#"
            INSERT INTO academic_scoring.schedules (id, subject_id, stage_id, start_time, end_time)
            SELECT $1, su.id, st.id, $4, $5
            FROM academic_scoring.subjects su, academic_scoring.stages st
            WHERE su.name = $2 AND st.name = $3
            AND NOT EXISTS (
                SELECT 1 FROM academic_scoring.schedules sc
                WHERE sc.subject_id = su.id AND sc.stage_id = st.id AND sc.start_time = $4
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subject)
        .bind(stage)
        .bind(NaiveTime::from_hms_opt(start.0, start.1, 0).context("invalid time")?)
        .bind(NaiveTime::from_hms_opt(end.0, end.1, 0).context("invalid time")?)
        .execute(pool)
        .await?;
    }

    let sessions = vec![
        ("S-2026-001", "Mathematics", [70.0, 80.0, 90.0]),
        ("S-2026-001", "Language", [60.0, 65.0, 70.0]),
        ("S-2026-001", "Science", [85.0, 90.0, 88.0]),
        ("S-2026-002", "Mathematics", [30.0, 25.0, 35.0]),
        ("S-2026-002", "Language", [55.0, 60.0, 50.0]),
        ("S-2026-003", "Mathematics", [95.0, 98.0, 100.0]),
    ];
    for (number, subject, scores) in sessions {
        for (index, score) in scores.iter().enumerate() {
            upsert_session(pool, number, subject, "Stage 1", index as i32 + 1, *score).await?;
        }
    }

    let exams = vec![
        ("S-2026-001", "Mathematics", 85.0),
        ("S-2026-001", "Language", 72.0),
        ("S-2026-001", "Science", 91.0),
        ("S-2026-002", "Language", 58.0),
    ];
    for (number, subject, score) in exams {
        upsert_exam(pool, number, subject, "Stage 1", score).await?;
    }

    Ok(())
}

async fn upsert_session(
    pool: &PgPool,
    student_number: &str,
    subject: &str,
    stage: &str,
    session_number: i32,
    score: f64,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO academic_scoring.session_scores
        (student_id, subject_id, stage_id, session_number, score)
        SELECT s.id, su.id, st.id, $4, $5
        FROM academic_scoring.students s, academic_scoring.subjects su, academic_scoring.stages st
        WHERE s.student_number = $1 AND su.name = $2 AND st.name = $3
        ON CONFLICT (student_id, subject_id, stage_id, session_number)
        DO UPDATE SET score = EXCLUDED.score
        "#,
    )
    .bind(student_number)
    .bind(subject)
    .bind(stage)
    .bind(session_number)
    .bind(score)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn upsert_exam(
    pool: &PgPool,
    student_number: &str,
    subject: &str,
    stage: &str,
    score: f64,
) -> anyhow::Result<Option<ExamScore>> {
    let row = sqlx::query(
        r#"
        INSERT INTO academic_scoring.exam_scores (student_id, subject_id, stage_id, score)
        SELECT s.id, su.id, st.id, $4
        FROM academic_scoring.students s, academic_scoring.subjects su, academic_scoring.stages st
        WHERE s.student_number = $1 AND su.name = $2 AND st.name = $3
        ON CONFLICT (student_id, subject_id, stage_id) DO UPDATE SET score = EXCLUDED.score
        RETURNING student_id, subject_id, stage_id, score
        "#,
    )
    .bind(student_number)
    .bind(subject)
    .bind(stage)
    .bind(score)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ExamScore {
        student_id: row.get("student_id"),
        subject_id: row.get("subject_id"),
        stage_id: row.get("stage_id"),
        score: row.get("score"),
    }))
}

fn check_score(score: f64, line: usize) -> anyhow::Result<()> {
    if !(0.0..=100.0).contains(&score) {
        anyhow::bail!("row {line}: score {score} is outside 0..=100");
    }
    Ok(())
}

/// Imports session and exam scores. Rows naming an unknown student, subject
/// or stage are skipped and not counted.
pub async fn import_scores(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_number: String,
        subject: String,
        stage: String,
        kind: String,
        session_number: Option<i32>,
        score: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let line = index + 2;
        check_score(row.score, line)?;

        let written = match row.kind.as_str() {
            "session" => {
                let session_number = row
                    .session_number
                    .with_context(|| format!("row {line}: session rows need session_number"))?;
                upsert_session(
                    pool,
                    &row.student_number,
                    &row.subject,
                    &row.stage,
                    session_number,
                    row.score,
                )
                .await?
                    > 0
            }
            "exam" => upsert_exam(pool, &row.student_number, &row.subject, &row.stage, row.score)
                .await?
                .is_some(),
            other => anyhow::bail!("row {line}: unknown kind {other:?}"),
        };

        if written {
            inserted += 1;
        } else {
            tracing::warn!(
                line,
                student_number = %row.student_number,
                "unknown student, subject or stage"
            );
        }
    }

    Ok(inserted)
}

/// Saves a batch of exam scores and returns the stored records.
pub async fn save_exam_scores(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<Vec<ExamScore>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_number: String,
        subject: String,
        stage: String,
        score: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut saved = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let line = index + 2;
        check_score(row.score, line)?;

        match upsert_exam(pool, &row.student_number, &row.subject, &row.stage, row.score).await? {
            Some(exam) => saved.push(exam),
            None => {
                tracing::warn!(
                    line,
                    student_number = %row.student_number,
                    "unknown student, subject or stage"
                );
            }
        }
    }

    Ok(saved)
}

pub async fn fetch_students(
    pool: &PgPool,
    student_number: Option<&str>,
) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_number, full_name
        FROM academic_scoring.students
        WHERE $1::TEXT IS NULL OR student_number = $1
        ORDER BY student_number
        "#,
    )
    .bind(student_number)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Student {
            id: row.get("id"),
            student_number: row.get("student_number"),
            full_name: row.get("full_name"),
        })
        .collect())
}

pub async fn find_student(pool: &PgPool, student_number: &str) -> anyhow::Result<Student> {
    fetch_students(pool, Some(student_number))
        .await?
        .into_iter()
        .next()
        .with_context(|| format!("no student with number {student_number}"))
}

pub async fn fetch_subjects(pool: &PgPool) -> anyhow::Result<Vec<SubjectCredit>> {
    let rows = sqlx::query(
        "SELECT id, name, credit_weight FROM academic_scoring.subjects ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SubjectCredit {
            subject_id: row.get("id"),
            name: row.get("name"),
            credit_weight: row.get("credit_weight"),
        })
        .collect())
}

pub async fn fetch_stages(pool: &PgPool) -> anyhow::Result<Vec<Stage>> {
    let rows = sqlx::query("SELECT id, name, ordinal FROM academic_scoring.stages ORDER BY ordinal")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| Stage {
            stage_id: row.get("id"),
            name: row.get("name"),
            ordinal: row.get("ordinal"),
        })
        .collect())
}

pub async fn fetch_schedule(pool: &PgPool) -> anyhow::Result<Vec<ScheduleEntry>> {
    let rows = sqlx::query(
        "SELECT subject_id, stage_id, start_time, end_time FROM academic_scoring.schedules",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ScheduleEntry {
            subject_id: row.get("subject_id"),
            stage_id: row.get("stage_id"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
        })
        .collect())
}

/// Loads every score record for one student, or for all students, and
/// indexes it for aggregation.
pub async fn load_gradebook(pool: &PgPool, student_id: Option<Uuid>) -> anyhow::Result<GradeBook> {
    let session_rows = sqlx::query(
        r#"
        SELECT student_id, subject_id, stage_id, session_number, score
        FROM academic_scoring.session_scores
        WHERE $1::UUID IS NULL OR student_id = $1
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
    .context("failed to load session scores")?;

    let exam_rows = sqlx::query(
        r#"
        SELECT student_id, subject_id, stage_id, score
        FROM academic_scoring.exam_scores
        WHERE $1::UUID IS NULL OR student_id = $1
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
    .context("failed to load exam scores")?;

    let override_rows = sqlx::query(
        r#"
        SELECT student_id, subject_id, stage_id, status, override_value
        FROM academic_scoring.remediations
        WHERE status = 'done' AND ($1::UUID IS NULL OR student_id = $1)
        ORDER BY completed_at NULLS FIRST
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
    .context("failed to load completed remediations")?;

    let sessions = session_rows
        .into_iter()
        .map(|row| SessionScore {
            student_id: row.get("student_id"),
            subject_id: row.get("subject_id"),
            stage_id: row.get("stage_id"),
            session_number: row.get("session_number"),
            score: row.get("score"),
        })
        .collect();
    let exams = exam_rows
        .into_iter()
        .map(|row| ExamScore {
            student_id: row.get("student_id"),
            subject_id: row.get("subject_id"),
            stage_id: row.get("stage_id"),
            score: row.get("score"),
        })
        .collect();
    let overrides = override_rows
        .into_iter()
        .map(|row| {
            Ok(RemediationOverride {
                student_id: row.get("student_id"),
                subject_id: row.get("subject_id"),
                stage_id: row.get("stage_id"),
                status: parse_status(&row)?,
                override_value: row.get("override_value"),
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(GradeBook::new(sessions, exams, overrides))
}

pub async fn fetch_pending_tasks(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<RemediationTask>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_id, subject_id, stage_id, status, baseline_score,
               duration_minutes, override_value, created_at
        FROM academic_scoring.remediations
        WHERE student_id = $1 AND status = 'pending'
        ORDER BY created_at
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let tasks = rows.iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Closes the pending remediation for a key with its remedial score, which
/// from then on replaces the daily average for that subject and stage.
pub async fn complete_remediation(
    pool: &PgPool,
    key: &ScoreKey,
    value: f64,
) -> anyhow::Result<bool> {
    if !(0.0..=100.0).contains(&value) {
        anyhow::bail!("remediation score {value} is outside 0..=100");
    }
    let result = sqlx::query(
        r#"
        UPDATE academic_scoring.remediations
        SET status = 'done', override_value = $4, completed_at = now()
        WHERE student_id = $1 AND subject_id = $2 AND stage_id = $3 AND status = 'pending'
        "#,
    )
    .bind(key.student_id)
    .bind(key.subject_id)
    .bind(key.stage_id)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_subject(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM academic_scoring.subjects WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no subject named {name}"))?;
    Ok(row.get("id"))
}

pub async fn find_stage(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM academic_scoring.stages WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no stage named {name}"))?;
    Ok(row.get("id"))
}

fn parse_status(row: &PgRow) -> Result<RemediationStatus, sqlx::Error> {
    let status: String = row.try_get("status")?;
    RemediationStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: format!("unknown remediation status {status:?}").into(),
    })
}

fn task_from_row(row: &PgRow) -> Result<RemediationTask, sqlx::Error> {
    Ok(RemediationTask {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        stage_id: row.try_get("stage_id")?,
        status: parse_status(row)?,
        baseline_score: row.try_get("baseline_score")?,
        duration_minutes: row.try_get("duration_minutes")?,
        override_value: row.try_get("override_value")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PgRemediationStore {
    pool: PgPool,
}

impl PgRemediationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemediationStore for PgRemediationStore {
    async fn find_pending(&self, key: &ScoreKey) -> Result<Option<RemediationTask>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, student_id, subject_id, stage_id, status, baseline_score,
                   duration_minutes, override_value, created_at
            FROM academic_scoring.remediations
            WHERE student_id = $1 AND subject_id = $2 AND stage_id = $3 AND status = 'pending'
            "#,
        )
        .bind(key.student_id)
        .bind(key.subject_id)
        .bind(key.stage_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(task_from_row).transpose()?)
    }

    async fn insert_if_absent(&self, task: &RemediationTask) -> Result<bool, StoreError> {
        let key = task.key();
        let result = sqlx::query(
            r#"
            INSERT INTO academic_scoring.remediations
            (id, student_id, subject_id, stage_id, status,
             baseline_score, duration_minutes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (student_id, subject_id, stage_id) WHERE status = 'pending' DO NOTHING
            "#,
        )
        .bind(task.id)
        .bind(key.student_id)
        .bind(key.subject_id)
        .bind(key.stage_id)
        .bind(task.status.as_str())
        .bind(task.baseline_score)
        .bind(task.duration_minutes)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
