//! Keeps every stored `is_eligible` flag equal to the evaluation of its profile against
//! the current criteria.
//!
//! Both entry points run on a caller-supplied transaction so that the triggering write and
//! its recomputation commit together. [`recompute_all`] isolates each student in a
//! savepoint: one student's failure rolls back only that student's update, and the batch
//! carries on.

use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::StudentId;
use super::evaluation::evaluate;
use crate::storage::records;

#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error("no profile stored for student {0}")]
    ProfileNotFound(StudentId),
    #[error("eligibility criteria are not configured")]
    CriteriaNotFound,
    #[error("stored profile for student {student} is malformed: {source}")]
    MalformedProfile {
        student: StudentId,
        #[source]
        source: rusqlite::Error,
    },
    #[error("storage failure during recomputation: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CascadeError {
    fn classify(student: StudentId, err: rusqlite::Error) -> Self {
        if records::is_malformed_row(&err) {
            CascadeError::MalformedProfile {
                student,
                source: err,
            }
        } else {
            CascadeError::Storage(err)
        }
    }
}

/// One student whose recomputation failed. Their previous flag is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeFailure {
    pub student_id: StudentId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub evaluated: usize,
    pub eligible: usize,
    pub failures: Vec<CascadeFailure>,
}

impl CascadeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluate one stored profile and persist the flag. Returns the new value.
pub fn recompute_one(conn: &Connection, student: StudentId) -> Result<bool, CascadeError> {
    let criteria = records::fetch_criteria(conn)?.ok_or(CascadeError::CriteriaNotFound)?;
    let profile = records::fetch_profile(conn, student)
        .map_err(|err| CascadeError::classify(student, err))?
        .ok_or(CascadeError::ProfileNotFound(student))?;

    let eligible = evaluate(&profile.fields, &criteria);
    records::store_eligibility(conn, student, eligible)?;
    debug!(student = %student, eligible, "eligibility recomputed");
    Ok(eligible)
}

/// Recompute every stored profile. Only a failure to enumerate profiles aborts the batch;
/// per-student failures are collected in the report.
pub fn recompute_all(tx: &mut Transaction<'_>) -> Result<CascadeReport, CascadeError> {
    let students = records::profile_student_ids(tx)?;
    let mut report = CascadeReport::default();

    for student in students {
        let savepoint = tx.savepoint()?;
        match recompute_one(&savepoint, student) {
            Ok(eligible) => {
                savepoint.commit()?;
                report.evaluated += 1;
                if eligible {
                    report.eligible += 1;
                }
            }
            Err(err) => {
                // Dropping the savepoint rolls back this student only.
                drop(savepoint);
                warn!(student = %student, error = %err, "eligibility recompute failed");
                report.failures.push(CascadeFailure {
                    student_id: student,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        evaluated = report.evaluated,
        eligible = report.eligible,
        failed = report.failures.len(),
        "eligibility cascade finished"
    );
    Ok(report)
}
