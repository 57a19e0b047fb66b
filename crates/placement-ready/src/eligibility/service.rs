use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::cascade::{self, CascadeError, CascadeReport};
use super::domain::{
    Criteria, NewStudent, Profile, ProfileFields, ProfileSubmission, RequestContext,
    StudentAccount, StudentId, StudentWithProfile, ValidationError,
};
use super::evaluation::{assess, RequirementCheck};
use crate::storage::records;
use crate::storage::{ConnectionError, Connector, PlacementStore, SqliteConnector, StorageError};

/// The collaborator-facing surface over criteria, profiles, and the student directory.
///
/// Every call takes the caller's [`RequestContext`]; nothing is read from ambient state.
/// Writes run the triggered recomputation in the same transaction as the write itself.
pub struct PlacementService<C = SqliteConnector> {
    store: Arc<PlacementStore<C>>,
}

/// Stored flags plus the requirements the profile currently misses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityStatus {
    pub student_id: StudentId,
    pub is_eligible: bool,
    pub is_approved: bool,
    pub unmet: Vec<RequirementCheck>,
}

impl<C: Connector> PlacementService<C> {
    pub fn new(store: Arc<PlacementStore<C>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &PlacementStore<C> {
        &self.store
    }

    pub fn criteria(&self, _ctx: &RequestContext) -> Result<Option<Criteria>, PlacementError> {
        self.store
            .with_connection(|conn| records::fetch_criteria(conn).map_err(PlacementError::from))
    }

    /// Replace the thresholds and re-evaluate every stored profile before returning.
    ///
    /// When some students fail to recompute, the criteria and every successful update are
    /// still committed and the failures come back as [`PlacementError::PartialCascade`].
    pub fn upsert_criteria(
        &self,
        ctx: &RequestContext,
        criteria: Criteria,
    ) -> Result<CascadeReport, PlacementError> {
        require_admin(ctx, "update eligibility criteria")?;
        criteria.validate()?;

        let report = self.store.with_transaction(|tx| {
            let inserted = records::upsert_criteria(tx, &criteria)?;
            let report = cascade::recompute_all(tx)?;
            info!(
                actor = ctx.actor,
                inserted,
                evaluated = report.evaluated,
                "eligibility criteria updated"
            );
            Ok::<_, PlacementError>(report)
        })?;

        if report.is_complete() {
            Ok(report)
        } else {
            Err(PlacementError::PartialCascade(report))
        }
    }

    pub fn profile(
        &self,
        ctx: &RequestContext,
        student: StudentId,
    ) -> Result<Option<Profile>, PlacementError> {
        require_self_or_admin(ctx, student)?;
        self.store.with_connection(|conn| {
            records::fetch_profile(conn, student).map_err(PlacementError::from)
        })
    }

    /// Store the profile and its recomputed flag atomically.
    pub fn upsert_profile(
        &self,
        ctx: &RequestContext,
        student: StudentId,
        fields: ProfileFields,
    ) -> Result<Profile, PlacementError> {
        require_self_or_admin(ctx, student)?;
        let fields = fields.normalized();
        fields.validate()?;

        self.store.with_transaction(|tx| {
            if records::fetch_student(tx, student)?.is_none() {
                return Err(PlacementError::NotFound(Missing::Student(student)));
            }
            let created = records::upsert_profile(tx, student, &fields)?;
            let eligible = cascade::recompute_one(tx, student)?;
            info!(student = %student, created, eligible, "profile saved");

            records::fetch_profile(tx, student)?
                .ok_or(PlacementError::NotFound(Missing::Profile(student)))
        })
    }

    /// Form-style entry point: parses the text fields, then behaves like
    /// [`upsert_profile`](Self::upsert_profile).
    pub fn submit_profile(
        &self,
        ctx: &RequestContext,
        student: StudentId,
        submission: ProfileSubmission,
    ) -> Result<Profile, PlacementError> {
        let fields = ProfileFields::try_from(submission)?;
        self.upsert_profile(ctx, student, fields)
    }

    pub fn recompute_one(
        &self,
        ctx: &RequestContext,
        student: StudentId,
    ) -> Result<bool, PlacementError> {
        require_self_or_admin(ctx, student)?;
        self.store.with_transaction(|tx| {
            cascade::recompute_one(tx, student).map_err(PlacementError::from)
        })
    }

    pub fn recompute_all(&self, ctx: &RequestContext) -> Result<CascadeReport, PlacementError> {
        require_admin(ctx, "recompute eligibility")?;
        let report = self.store.with_transaction(|tx| {
            cascade::recompute_all(tx).map_err(PlacementError::from)
        })?;

        if report.is_complete() {
            Ok(report)
        } else {
            Err(PlacementError::PartialCascade(report))
        }
    }

    /// Record the administrative decision. Eligibility is neither consulted nor changed.
    pub fn set_approval(
        &self,
        ctx: &RequestContext,
        student: StudentId,
        approved: bool,
    ) -> Result<(), PlacementError> {
        require_admin(ctx, "change approval")?;
        let updated = self.store.with_connection(|conn| {
            records::store_approval(conn, student, approved).map_err(PlacementError::from)
        })?;
        if updated == 0 {
            return Err(PlacementError::NotFound(Missing::Profile(student)));
        }
        info!(actor = ctx.actor, student = %student, approved, "approval recorded");
        Ok(())
    }

    pub fn list_students(
        &self,
        ctx: &RequestContext,
        department: Option<&str>,
    ) -> Result<Vec<StudentWithProfile>, PlacementError> {
        require_admin(ctx, "list students")?;
        self.store.with_connection(|conn| {
            records::list_students(conn, department).map_err(PlacementError::from)
        })
    }

    pub fn list_eligible(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<StudentWithProfile>, PlacementError> {
        require_admin(ctx, "list eligible students")?;
        self.store
            .with_connection(|conn| records::list_eligible(conn).map_err(PlacementError::from))
    }

    pub fn eligibility_status(
        &self,
        ctx: &RequestContext,
        student: StudentId,
    ) -> Result<EligibilityStatus, PlacementError> {
        require_self_or_admin(ctx, student)?;
        self.store.with_connection(|conn| -> Result<_, PlacementError> {
            let profile = records::fetch_profile(conn, student)?
                .ok_or(PlacementError::NotFound(Missing::Profile(student)))?;
            let criteria =
                records::fetch_criteria(conn)?.ok_or(PlacementError::NotFound(Missing::Criteria))?;
            let assessment = assess(&profile.fields, &criteria);

            Ok(EligibilityStatus {
                student_id: student,
                is_eligible: profile.is_eligible,
                is_approved: profile.is_approved,
                unmet: assessment.unmet().cloned().collect(),
            })
        })
    }

    pub fn register_student(
        &self,
        ctx: &RequestContext,
        student: NewStudent,
    ) -> Result<StudentAccount, PlacementError> {
        require_admin(ctx, "register students")?;
        student.validate()?;

        self.store.with_transaction(|tx| {
            let id = records::insert_student(tx, &student).map_err(|err| {
                if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
                    PlacementError::Validation(ValidationError::Duplicate {
                        field: "username or email",
                    })
                } else {
                    PlacementError::from(err)
                }
            })?;
            info!(actor = ctx.actor, student = %id, "student registered");
            records::fetch_student(tx, id)?.ok_or(PlacementError::NotFound(Missing::Student(id)))
        })
    }

    pub fn student(
        &self,
        ctx: &RequestContext,
        student: StudentId,
    ) -> Result<StudentAccount, PlacementError> {
        require_self_or_admin(ctx, student)?;
        self.store
            .with_connection(|conn| {
                records::fetch_student(conn, student).map_err(PlacementError::from)
            })?
            .ok_or(PlacementError::NotFound(Missing::Student(student)))
    }
}

fn require_admin(ctx: &RequestContext, action: &'static str) -> Result<(), PlacementError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(PlacementError::Forbidden {
            actor: ctx.actor,
            action,
        })
    }
}

fn require_self_or_admin(ctx: &RequestContext, student: StudentId) -> Result<(), PlacementError> {
    if ctx.acts_for(student) {
        Ok(())
    } else {
        Err(PlacementError::Forbidden {
            actor: ctx.actor,
            action: "access another student's records",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Criteria,
    Profile(StudentId),
    Student(StudentId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Criteria => write!(f, "eligibility criteria"),
            Missing::Profile(id) => write!(f, "profile for student {id}"),
            Missing::Student(id) => write!(f, "student {id}"),
        }
    }
}

/// Error raised by the placement service.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("storage unavailable after {attempts} attempt(s)")]
    StorageUnavailable {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Storage(StorageError),
    #[error("eligibility recompute failed for {} student(s)", .0.failures.len())]
    PartialCascade(CascadeReport),
    #[error("actor {actor} may not {action}")]
    Forbidden { actor: i64, action: &'static str },
}

impl From<StorageError> for PlacementError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Connection(ConnectionError::Unavailable { attempts, source }) => {
                PlacementError::StorageUnavailable { attempts, source }
            }
            other => PlacementError::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for PlacementError {
    fn from(value: rusqlite::Error) -> Self {
        PlacementError::Storage(StorageError::Sqlite(value))
    }
}

impl From<CascadeError> for PlacementError {
    fn from(value: CascadeError) -> Self {
        match value {
            CascadeError::ProfileNotFound(student) => {
                PlacementError::NotFound(Missing::Profile(student))
            }
            CascadeError::CriteriaNotFound => PlacementError::NotFound(Missing::Criteria),
            CascadeError::MalformedProfile { source, .. } | CascadeError::Storage(source) => {
                PlacementError::from(source)
            }
        }
    }
}
