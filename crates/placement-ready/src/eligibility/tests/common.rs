use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use rusqlite::{ffi, Connection};
use serde_json::Value;
use tempfile::TempDir;

use crate::eligibility::domain::{
    Criteria, NewStudent, ProfileFields, RequestContext, StudentId,
};
use crate::eligibility::evaluation::evaluate;
use crate::eligibility::{placement_router, PlacementService};
use crate::storage::{
    ConnectionManager, Connector, PlacementStore, RetryPolicy, SqliteConnector,
};

pub(super) struct Fixture {
    pub(super) dir: TempDir,
    pub(super) service: Arc<PlacementService>,
}

impl Fixture {
    pub(super) fn database_path(&self) -> std::path::PathBuf {
        self.dir.path().join("placement.db")
    }

    /// Direct handle for arranging rows the service would never write.
    pub(super) fn raw(&self) -> Connection {
        Connection::open(self.database_path()).expect("raw handle")
    }

    pub(super) fn router(&self) -> axum::Router {
        placement_router(self.service.clone())
    }
}

pub(super) fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let connector = SqliteConnector::new(dir.path().join("placement.db"), Duration::from_secs(2));
    let policy = RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(10),
    };
    let store = PlacementStore::open(ConnectionManager::new(connector, policy)).expect("store");
    let service = Arc::new(PlacementService::new(Arc::new(store)));
    Fixture { dir, service }
}

pub(super) fn admin() -> RequestContext {
    RequestContext::admin(1)
}

pub(super) fn scenario_criteria() -> Criteria {
    Criteria {
        min_attendance: 85.0,
        min_assessment_score: 80.0,
        min_cgpa: 8.5,
        min_leetcode_problems: 100,
        min_projects: 3,
        require_portfolio: true,
        require_leetcode_profile: false,
        require_github_profile: false,
        require_linkedin_profile: false,
    }
}

/// Clears every threshold of [`scenario_criteria`].
pub(super) fn eligible_fields() -> ProfileFields {
    ProfileFields {
        semester_cgpa: 9.0,
        weekly_assessment_score: 85.0,
        attendance_percentage: 90.0,
        leetcode_problems: 120,
        projects: "A,B,C".to_string(),
        domain_specialization: "Systems".to_string(),
        skills: "Rust, SQL".to_string(),
        project_titles: String::new(),
        project_domains: String::new(),
        project_github_links: String::new(),
        portfolio_link: Some("http://x".to_string()),
        leetcode_profile: None,
        github_profile: None,
        linkedin_profile: None,
    }
}

pub(super) fn register(service: &PlacementService, username: &str) -> StudentId {
    service
        .register_student(
            &admin(),
            NewStudent {
                username: username.to_string(),
                email: format!("{username}@campus.test"),
                department: Some("CSE".to_string()),
                specialization: None,
            },
        )
        .expect("student registers")
        .id
}

/// Every stored flag must equal a fresh evaluation against the stored criteria.
pub(super) fn assert_consistent(service: &PlacementService) {
    let criteria = service
        .criteria(&admin())
        .expect("criteria readable")
        .expect("criteria present");
    for entry in service.list_students(&admin(), None).expect("students") {
        if let Some(profile) = entry.profile {
            assert_eq!(
                profile.is_eligible,
                evaluate(&profile.fields, &criteria),
                "stale eligibility for student {}",
                entry.student.id
            );
        }
    }
}

/// Reports the database as locked on every attempt.
pub(super) struct LockedConnector {
    pub(super) calls: Arc<AtomicU32>,
}

impl Connector for LockedConnector {
    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        ))
    }
}

pub(super) fn locked_service() -> (PlacementService<LockedConnector>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let connector = LockedConnector {
        calls: calls.clone(),
    };
    let policy = RetryPolicy {
        max_attempts: 3,
        backoff: Duration::ZERO,
    };
    let store = PlacementStore::new(ConnectionManager::new(connector, policy));
    (PlacementService::new(Arc::new(store)), calls)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
