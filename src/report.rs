use std::collections::HashMap;
use std::fmt::Write;

use uuid::Uuid;

use crate::index::Transcript;
use crate::models::{RemediationTask, Stage, Student, SubjectCredit};

pub fn build_report(
    student: &Student,
    transcript: &Transcript,
    stages: &[Stage],
    subjects: &[SubjectCredit],
    pending: &[RemediationTask],
) -> String {
    let subject_names: HashMap<Uuid, &str> = subjects
        .iter()
        .map(|subject| (subject.subject_id, subject.name.as_str()))
        .collect();
    let stage_names: HashMap<Uuid, &str> = stages
        .iter()
        .map(|stage| (stage.stage_id, stage.name.as_str()))
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Academic Transcript");
    let _ = writeln!(
        output,
        "{} ({})",
        student.full_name, student.student_number
    );
    let _ = writeln!(output);

    match &transcript.cumulative {
        Some(cumulative) => {
            let _ = writeln!(
                output,
                "Cumulative index (IPK): {:.2} across {} stages",
                cumulative.cumulative_index,
                cumulative.stages.len()
            );
        }
        None => {
            let _ = writeln!(output, "Cumulative index (IPK): not available yet");
        }
    }

    for row in &transcript.stages {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", row.stage.name);

        match &row.outcome {
            Ok(stage) => {
                let _ = writeln!(
                    output,
                    "Stage index (IPT): {:.2} over {} credits",
                    stage.stage_index, stage.credit_total
                );
                let _ = writeln!(output);
                let _ = writeln!(
                    output,
                    "| Subject | Credits | Daily | Exam | Total | Grade | Weight |"
                );
                let _ = writeln!(output, "|---|---|---|---|---|---|---|");
                for subject in &stage.subjects {
                    let result = &subject.result;
                    let _ = writeln!(
                        output,
                        "| {} | {} | {:.2} | {:.2} | {:.2} | {}{} | {:.2} |",
                        subject.subject_name,
                        subject.credit_weight,
                        result.daily_avg,
                        result.exam_score,
                        result.total,
                        result.grade_label,
                        if result.passes_threshold { "" } else { " (below pass)" },
                        result.weight
                    );
                }
            }
            Err(reason) => {
                let _ = writeln!(output, "Stage index (IPT): not available ({reason})");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Remediation");

    if pending.is_empty() {
        let _ = writeln!(output, "No pending remediation tasks.");
    } else {
        for task in pending {
            let _ = writeln!(
                output,
                "- {} in {}: baseline {:.2}, {} minutes per session",
                subject_names.get(&task.subject_id).copied().unwrap_or("unknown subject"),
                stage_names.get(&task.stage_id).copied().unwrap_or("unknown stage"),
                task.baseline_score,
                task.duration_minutes
            );
        }
    }

    output
}
