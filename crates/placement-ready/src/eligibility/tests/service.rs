use std::sync::atomic::Ordering;
use std::sync::Barrier;
use std::thread;

use rusqlite::params;

use super::common::*;
use crate::eligibility::domain::{
    NewStudent, ProfileSubmission, RequestContext, StudentId, ValidationError,
};
use crate::eligibility::evaluation::Requirement;
use crate::eligibility::{Missing, PlacementError};

#[test]
fn flags_stay_consistent_across_profile_and_criteria_writes() {
    let fixture = fixture();
    let service = &fixture.service;
    let asha = register(service, "asha");
    let ravi = register(service, "ravi");

    service
        .upsert_profile(&admin(), asha, eligible_fields())
        .expect("saved");
    assert_consistent(service);

    let mut weak = eligible_fields();
    weak.weekly_assessment_score = 70.0;
    service
        .upsert_profile(&RequestContext::student(ravi), ravi, weak)
        .expect("saved");
    assert_consistent(service);

    let mut relaxed = scenario_criteria();
    relaxed.min_assessment_score = 65.0;
    service.upsert_criteria(&admin(), relaxed).expect("saved");
    assert_consistent(service);

    let eligible = service.list_eligible(&admin()).expect("listed");
    let ids: Vec<StudentId> = eligible.iter().map(|entry| entry.student.id).collect();
    assert_eq!(ids, vec![asha, ravi]);
}

#[test]
fn profile_update_replaces_previous_submission() {
    let fixture = fixture();
    let student = register(&fixture.service, "asha");
    let first = fixture
        .service
        .upsert_profile(&admin(), student, eligible_fields())
        .expect("created");

    let mut fields = eligible_fields();
    fields.attendance_percentage = 60.0;
    let second = fixture
        .service
        .upsert_profile(&admin(), student, fields)
        .expect("updated");

    assert_eq!(first.id, second.id);
    assert!(first.is_eligible);
    assert!(!second.is_eligible);
    assert_eq!(second.fields.attendance_percentage, 60.0);
}

#[test]
fn students_cannot_touch_other_profiles_or_criteria() {
    let fixture = fixture();
    let owner = register(&fixture.service, "owner");
    let intruder = RequestContext::student(register(&fixture.service, "intruder"));

    assert!(matches!(
        fixture.service.upsert_profile(&intruder, owner, eligible_fields()),
        Err(PlacementError::Forbidden { .. })
    ));
    assert!(matches!(
        fixture.service.upsert_criteria(&intruder, scenario_criteria()),
        Err(PlacementError::Forbidden { .. })
    ));
    assert!(matches!(
        fixture.service.set_approval(&intruder, owner, true),
        Err(PlacementError::Forbidden { .. })
    ));
    assert!(matches!(
        fixture.service.list_students(&intruder, None),
        Err(PlacementError::Forbidden { .. })
    ));
}

#[test]
fn approval_is_independent_of_eligibility() {
    let fixture = fixture();
    let student = register(&fixture.service, "asha");
    let mut fields = eligible_fields();
    fields.semester_cgpa = 5.0;
    fixture
        .service
        .upsert_profile(&admin(), student, fields)
        .expect("saved");

    fixture
        .service
        .set_approval(&admin(), student, true)
        .expect("approved");

    let profile = fixture
        .service
        .profile(&admin(), student)
        .expect("readable")
        .expect("present");
    assert!(profile.is_approved);
    assert!(!profile.is_eligible);
}

#[test]
fn approval_without_profile_is_not_found() {
    let fixture = fixture();
    let student = register(&fixture.service, "asha");

    match fixture.service.set_approval(&admin(), student, true) {
        Err(PlacementError::NotFound(Missing::Profile(id))) => assert_eq!(id, student),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn profile_for_unknown_student_is_not_found() {
    let fixture = fixture();

    match fixture
        .service
        .upsert_profile(&admin(), StudentId(404), eligible_fields())
    {
        Err(PlacementError::NotFound(Missing::Student(StudentId(404)))) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn invalid_input_never_reaches_storage() {
    let fixture = fixture();
    let student = register(&fixture.service, "asha");
    let submission = ProfileSubmission {
        semester_cgpa: "9.0".to_string(),
        weekly_assessment_score: "high".to_string(),
        attendance_percentage: "90".to_string(),
        leetcode_problems: "120".to_string(),
        ..ProfileSubmission::default()
    };

    match fixture.service.submit_profile(&admin(), student, submission) {
        Err(PlacementError::Validation(ValidationError::NotANumber { field, .. })) => {
            assert_eq!(field, "weekly_assessment_score");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(
        fixture.service.profile(&admin(), student).expect("readable"),
        None
    );

    let mut criteria = scenario_criteria();
    criteria.min_attendance = 140.0;
    assert!(matches!(
        fixture.service.upsert_criteria(&admin(), criteria),
        Err(PlacementError::Validation(ValidationError::OutOfRange { .. }))
    ));
}

#[test]
fn duplicate_registration_is_a_validation_error() {
    let fixture = fixture();
    register(&fixture.service, "asha");

    let duplicate = NewStudent {
        username: "asha".to_string(),
        email: "other@campus.test".to_string(),
        department: None,
        specialization: None,
    };
    assert!(matches!(
        fixture.service.register_student(&admin(), duplicate),
        Err(PlacementError::Validation(ValidationError::Duplicate { .. }))
    ));
}

#[test]
fn department_filter_narrows_directory() {
    let fixture = fixture();
    register(&fixture.service, "asha");
    fixture
        .service
        .register_student(
            &admin(),
            NewStudent {
                username: "ravi".to_string(),
                email: "ravi@campus.test".to_string(),
                department: Some("ECE".to_string()),
                specialization: Some("VLSI".to_string()),
            },
        )
        .expect("registered");

    let ece = fixture
        .service
        .list_students(&admin(), Some("ECE"))
        .expect("listed");
    assert_eq!(ece.len(), 1);
    assert_eq!(ece[0].student.username, "ravi");
    assert!(ece[0].profile.is_none());

    let everyone = fixture.service.list_students(&admin(), None).expect("listed");
    assert_eq!(everyone.len(), 2);
}

#[test]
fn status_lists_unmet_requirements() {
    let fixture = fixture();
    let student = register(&fixture.service, "asha");
    let mut fields = eligible_fields();
    fields.leetcode_problems = 40;
    fixture
        .service
        .upsert_profile(&RequestContext::student(student), student, fields)
        .expect("saved");

    let status = fixture
        .service
        .eligibility_status(&RequestContext::student(student), student)
        .expect("status");

    assert!(!status.is_eligible);
    assert!(!status.is_approved);
    let unmet: Vec<Requirement> = status.unmet.iter().map(|check| check.requirement).collect();
    assert_eq!(unmet, vec![Requirement::SolvedProblems]);
}

#[test]
fn locked_storage_surfaces_as_unavailable() {
    let (service, calls) = locked_service();

    match service.criteria(&admin()) {
        Err(PlacementError::StorageUnavailable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected unavailable, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn concurrent_profile_writes_wait_for_the_lock() {
    const WRITERS: usize = 8;
    const ROUNDS: usize = 20;

    let fixture = fixture();
    let service = &fixture.service;
    let students: Vec<StudentId> = (0..WRITERS)
        .map(|n| register(service, &format!("writer{n}")))
        .collect();
    let barrier = Barrier::new(WRITERS);

    let failures: Vec<PlacementError> = thread::scope(|scope| {
        let handles: Vec<_> = students
            .iter()
            .map(|&student| {
                let barrier = &barrier;
                scope.spawn(move || {
                    let ctx = RequestContext::student(student);
                    let mut failures = Vec::new();
                    barrier.wait();
                    for round in 0..ROUNDS {
                        let mut fields = eligible_fields();
                        if round % 2 == 1 {
                            fields.attendance_percentage = 50.0;
                        }
                        if let Err(err) = service.upsert_profile(&ctx, student, fields) {
                            failures.push(err);
                        }
                    }
                    failures
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("writer thread"))
            .collect()
    });

    assert!(failures.is_empty(), "{} writes failed: {:?}", failures.len(), failures.first());
    assert_consistent(service);
    let eligible = service.list_eligible(&admin()).expect("listed");
    assert!(eligible.is_empty(), "last round leaves every writer below attendance");
}

#[test]
fn unreadable_profile_does_not_hide_the_directory() {
    let fixture = fixture();
    let healthy = register(&fixture.service, "asha");
    fixture
        .service
        .upsert_profile(&admin(), healthy, eligible_fields())
        .expect("saved");
    let legacy = register(&fixture.service, "legacy");
    fixture
        .raw()
        .execute(
            "INSERT INTO student_profiles
                (user_id, semester_cgpa, projects, leetcode_problems, weekly_assessment_score,
                 attendance_percentage)
             VALUES (?1, NULL, 'A,B,C', 120, 90.0, 95.0)",
            params![legacy.0],
        )
        .expect("legacy profile inserted");

    let students = fixture.service.list_students(&admin(), None).expect("listed");

    assert_eq!(students.len(), 2);
    assert_eq!(students[0].student.id, healthy);
    assert!(students[0].profile.is_some());
    assert_eq!(students[1].student.id, legacy);
    assert!(students[1].profile.is_none());
}

#[test]
fn criteria_row_is_recreated_when_missing() {
    let fixture = fixture();
    let student = register(&fixture.service, "asha");
    fixture
        .service
        .upsert_profile(&admin(), student, eligible_fields())
        .expect("saved");
    fixture
        .raw()
        .execute("DELETE FROM eligibility_criteria", [])
        .expect("criteria removed");
    assert_eq!(fixture.service.criteria(&admin()).expect("readable"), None);

    let mut strict = scenario_criteria();
    strict.min_cgpa = 9.5;
    let report = fixture
        .service
        .upsert_criteria(&admin(), strict.clone())
        .expect("criteria stored");

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.eligible, 0);
    let (id, rows): (i64, i64) = fixture
        .raw()
        .query_row(
            "SELECT MIN(id), COUNT(*) FROM eligibility_criteria",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("criteria readable");
    assert_eq!((id, rows), (1, 1));
    assert_eq!(fixture.service.criteria(&admin()).expect("readable"), Some(strict));
    assert!(!fixture
        .service
        .profile(&admin(), student)
        .expect("readable")
        .expect("present")
        .is_eligible);
}
