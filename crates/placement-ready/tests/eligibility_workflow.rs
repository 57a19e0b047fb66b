use std::sync::Arc;
use std::time::Duration;

use placement_ready::config::StorageConfig;
use placement_ready::eligibility::{
    evaluate, Criteria, NewStudent, PlacementError, PlacementService, ProfileSubmission,
    RequestContext,
};
use placement_ready::storage::{schema, PlacementStore, RetryPolicy};

fn storage_config(dir: &tempfile::TempDir) -> StorageConfig {
    StorageConfig {
        database_path: dir.path().join("placement_tracker.db"),
        busy_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        },
    }
}

fn open(config: &StorageConfig) -> PlacementService {
    let store = PlacementStore::from_config(config);
    store.migrate().expect("schema migrates");
    PlacementService::new(Arc::new(store))
}

fn submission(projects: &str) -> ProfileSubmission {
    ProfileSubmission {
        semester_cgpa: "8.8".to_string(),
        weekly_assessment_score: "81".to_string(),
        attendance_percentage: "88.5".to_string(),
        leetcode_problems: "140".to_string(),
        projects: projects.to_string(),
        portfolio_link: "https://portfolio.example/asha".to_string(),
        ..ProfileSubmission::default()
    }
}

#[test]
fn placement_cycle_keeps_flags_consistent_across_restarts() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = storage_config(&dir);
    let admin = RequestContext::admin(1);

    let service = open(&config);
    assert_eq!(
        service.criteria(&admin).expect("readable"),
        Some(Criteria::default())
    );

    let asha = service
        .register_student(
            &admin,
            NewStudent {
                username: "asha".to_string(),
                email: "asha@campus.test".to_string(),
                department: Some("CSE".to_string()),
                specialization: Some("Systems".to_string()),
            },
        )
        .expect("registered")
        .id;
    let profile = service
        .submit_profile(&RequestContext::student(asha), asha, submission("Tracker,Compiler,Chat,Shell"))
        .expect("submitted");
    assert!(profile.is_eligible);

    let mut stricter = Criteria::default();
    stricter.min_projects = 5;
    let report = service
        .upsert_criteria(&admin, stricter.clone())
        .expect("criteria saved");
    assert_eq!((report.evaluated, report.eligible), (1, 0));
    drop(service);

    // A second process start runs the schema guard again without changing anything.
    let service = open(&config);
    let conn = rusqlite::Connection::open(&config.database_path).expect("raw handle");
    assert_eq!(
        schema::user_version(&conn).expect("version"),
        schema::SchemaGuard::default().target_version()
    );

    let stored = service
        .profile(&RequestContext::student(asha), asha)
        .expect("readable")
        .expect("present");
    assert!(!stored.is_eligible);
    assert_eq!(stored.is_eligible, evaluate(&stored.fields, &stricter));
    assert!(service.list_eligible(&admin).expect("listed").is_empty());
}

#[test]
fn students_are_scoped_to_their_own_records() {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = open(&storage_config(&dir));
    let admin = RequestContext::admin(1);
    let asha = service
        .register_student(
            &admin,
            NewStudent {
                username: "asha".to_string(),
                email: "asha@campus.test".to_string(),
                department: None,
                specialization: None,
            },
        )
        .expect("registered")
        .id;

    let stranger = RequestContext::student(placement_ready::eligibility::StudentId(asha.0 + 1));
    assert!(matches!(
        service.submit_profile(&stranger, asha, submission("A,B,C")),
        Err(PlacementError::Forbidden { .. })
    ));
    assert!(matches!(
        service.eligibility_status(&stranger, asha),
        Err(PlacementError::Forbidden { .. })
    ));
}
