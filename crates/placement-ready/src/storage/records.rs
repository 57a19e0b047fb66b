//! Row mapping for criteria, profiles, and the student directory.
//!
//! Functions take a plain `&Connection` so callers can compose them inside one
//! transaction or savepoint.

use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::warn;

use crate::eligibility::domain::{
    Criteria, NewStudent, Profile, ProfileFields, StudentAccount, StudentId, StudentWithProfile,
};

/// Primary key of the singleton criteria row.
pub const CRITERIA_ID: i64 = 1;

const CRITERIA_COLUMNS: &str = "min_attendance, min_assessment_score, min_cgpa, \
     min_leetcode_problems, min_projects, require_portfolio, require_leetcode_profile, \
     require_github_profile, require_linkedin_profile";

const PROFILE_COLUMNS: &str = "sp.id AS profile_id, sp.user_id AS profile_student_id, \
     sp.semester_cgpa, sp.weekly_assessment_score, sp.attendance_percentage, \
     sp.leetcode_problems, sp.projects, sp.domain_specialization, sp.skills, \
     sp.project_titles, sp.project_domains, sp.project_github_links, sp.portfolio_link, \
     sp.leetcode_profile, sp.github_profile, sp.linkedin_profile, sp.is_eligible, \
     sp.is_approved";

const STUDENT_COLUMNS: &str = "u.id AS student_id, u.username, u.email, u.department, \
     u.specialization";

pub fn fetch_criteria(conn: &Connection) -> rusqlite::Result<Option<Criteria>> {
    conn.query_row(
        &format!("SELECT {CRITERIA_COLUMNS} FROM eligibility_criteria WHERE id = ?1"),
        params![CRITERIA_ID],
        criteria_from_row,
    )
    .optional()
}

fn criteria_from_row(row: &Row<'_>) -> rusqlite::Result<Criteria> {
    Ok(Criteria {
        min_attendance: row.get("min_attendance")?,
        min_assessment_score: row.get("min_assessment_score")?,
        min_cgpa: row.get("min_cgpa")?,
        min_leetcode_problems: row.get("min_leetcode_problems")?,
        min_projects: row.get("min_projects")?,
        require_portfolio: row.get("require_portfolio")?,
        require_leetcode_profile: row.get("require_leetcode_profile")?,
        require_github_profile: row.get("require_github_profile")?,
        require_linkedin_profile: row.get("require_linkedin_profile")?,
    })
}

/// Update the singleton row, inserting it when absent. Returns `true` on insert.
pub fn upsert_criteria(conn: &Connection, criteria: &Criteria) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE eligibility_criteria SET
            min_attendance = ?2,
            min_assessment_score = ?3,
            min_cgpa = ?4,
            min_leetcode_problems = ?5,
            min_projects = ?6,
            require_portfolio = ?7,
            require_leetcode_profile = ?8,
            require_github_profile = ?9,
            require_linkedin_profile = ?10
         WHERE id = ?1",
        params![
            CRITERIA_ID,
            criteria.min_attendance,
            criteria.min_assessment_score,
            criteria.min_cgpa,
            criteria.min_leetcode_problems,
            criteria.min_projects,
            criteria.require_portfolio,
            criteria.require_leetcode_profile,
            criteria.require_github_profile,
            criteria.require_linkedin_profile,
        ],
    )?;
    if updated > 0 {
        return Ok(false);
    }

    conn.execute(
        &format!(
            "INSERT INTO eligibility_criteria (id, {CRITERIA_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            CRITERIA_ID,
            criteria.min_attendance,
            criteria.min_assessment_score,
            criteria.min_cgpa,
            criteria.min_leetcode_problems,
            criteria.min_projects,
            criteria.require_portfolio,
            criteria.require_leetcode_profile,
            criteria.require_github_profile,
            criteria.require_linkedin_profile,
        ],
    )?;
    Ok(true)
}

pub fn fetch_profile(conn: &Connection, student: StudentId) -> rusqlite::Result<Option<Profile>> {
    conn.query_row(
        &format!(
            "SELECT {PROFILE_COLUMNS} FROM student_profiles sp
             WHERE sp.user_id = ?1 ORDER BY sp.id LIMIT 1"
        ),
        params![student.0],
        profile_from_row,
    )
    .optional()
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get("profile_id")?,
        student_id: StudentId(row.get("profile_student_id")?),
        fields: ProfileFields {
            semester_cgpa: row.get("semester_cgpa")?,
            weekly_assessment_score: row.get("weekly_assessment_score")?,
            attendance_percentage: row.get("attendance_percentage")?,
            leetcode_problems: row.get("leetcode_problems")?,
            projects: text(row, "projects")?,
            domain_specialization: text(row, "domain_specialization")?,
            skills: text(row, "skills")?,
            project_titles: text(row, "project_titles")?,
            project_domains: text(row, "project_domains")?,
            project_github_links: text(row, "project_github_links")?,
            portfolio_link: row.get("portfolio_link")?,
            leetcode_profile: row.get("leetcode_profile")?,
            github_profile: row.get("github_profile")?,
            linkedin_profile: row.get("linkedin_profile")?,
        },
        is_eligible: row.get("is_eligible")?,
        is_approved: row.get("is_approved")?,
    })
}

/// Descriptive columns were nullable in older schemas.
fn text(row: &Row<'_>, column: &str) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(column)?.unwrap_or_default())
}

/// Insert or update the profile keyed by student. Returns `true` on insert.
///
/// Never touches `is_eligible` or `is_approved`.
pub fn upsert_profile(
    conn: &Connection,
    student: StudentId,
    fields: &ProfileFields,
) -> rusqlite::Result<bool> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM student_profiles WHERE user_id = ?1 LIMIT 1",
            params![student.0],
            |row| row.get(0),
        )
        .optional()?;

    let values: &[&dyn ToSql] = &[
        &student.0,
        &fields.semester_cgpa,
        &fields.domain_specialization,
        &fields.skills,
        &fields.projects,
        &fields.project_titles,
        &fields.project_domains,
        &fields.project_github_links,
        &fields.leetcode_problems,
        &fields.leetcode_profile,
        &fields.github_profile,
        &fields.linkedin_profile,
        &fields.portfolio_link,
        &fields.weekly_assessment_score,
        &fields.attendance_percentage,
    ];

    match existing {
        Some(_) => {
            conn.execute(
                "UPDATE student_profiles SET
                    semester_cgpa = ?2, domain_specialization = ?3, skills = ?4,
                    projects = ?5, project_titles = ?6, project_domains = ?7,
                    project_github_links = ?8, leetcode_problems = ?9, leetcode_profile = ?10,
                    github_profile = ?11, linkedin_profile = ?12, portfolio_link = ?13,
                    weekly_assessment_score = ?14, attendance_percentage = ?15
                 WHERE user_id = ?1",
                values,
            )?;
            Ok(false)
        }
        None => {
            conn.execute(
                "INSERT INTO student_profiles
                    (user_id, semester_cgpa, domain_specialization, skills, projects,
                     project_titles, project_domains, project_github_links, leetcode_problems,
                     leetcode_profile, github_profile, linkedin_profile, portfolio_link,
                     weekly_assessment_score, attendance_percentage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                values,
            )?;
            Ok(true)
        }
    }
}

/// Every student that currently has a profile, in id order.
pub fn profile_student_ids(conn: &Connection) -> rusqlite::Result<Vec<StudentId>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT user_id FROM student_profiles ORDER BY user_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0).map(StudentId))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Only the consistency cascade calls this.
pub fn store_eligibility(
    conn: &Connection,
    student: StudentId,
    eligible: bool,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE student_profiles SET is_eligible = ?2 WHERE user_id = ?1",
        params![student.0, eligible],
    )
}

pub fn store_approval(
    conn: &Connection,
    student: StudentId,
    approved: bool,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE student_profiles SET is_approved = ?2 WHERE user_id = ?1",
        params![student.0, approved],
    )
}

pub fn insert_student(conn: &Connection, student: &NewStudent) -> rusqlite::Result<StudentId> {
    conn.execute(
        "INSERT INTO users (username, password, email, role, department, specialization)
         VALUES (?1, '', ?2, 'student', ?3, ?4)",
        params![
            student.username.trim(),
            student.email.trim(),
            student.department,
            student.specialization,
        ],
    )?;
    Ok(StudentId(conn.last_insert_rowid()))
}

pub fn fetch_student(
    conn: &Connection,
    student: StudentId,
) -> rusqlite::Result<Option<StudentAccount>> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLUMNS} FROM users u WHERE u.id = ?1 AND u.role = 'student'"),
        params![student.0],
        student_from_row,
    )
    .optional()
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<StudentAccount> {
    Ok(StudentAccount {
        id: StudentId(row.get("student_id")?),
        username: row.get("username")?,
        email: row.get("email")?,
        department: row.get("department")?,
        specialization: row.get("specialization")?,
    })
}

/// A profile that cannot be decoded is listed without its profile rather than failing the
/// whole listing.
fn student_with_profile(row: &Row<'_>) -> rusqlite::Result<StudentWithProfile> {
    let student = student_from_row(row)?;
    let profile = match row.get::<_, Option<i64>>("profile_id")? {
        Some(_) => match profile_from_row(row) {
            Ok(profile) => Some(profile),
            Err(err) if is_malformed_row(&err) => {
                warn!(student = %student.id, error = %err, "skipping unreadable profile");
                None
            }
            Err(err) => return Err(err),
        },
        None => None,
    };
    Ok(StudentWithProfile { student, profile })
}

/// Decode failures caused by the stored values themselves, as opposed to the database.
pub fn is_malformed_row(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

/// All students, optionally restricted to one department, with their profile if any.
pub fn list_students(
    conn: &Connection,
    department: Option<&str>,
) -> rusqlite::Result<Vec<StudentWithProfile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS}, {PROFILE_COLUMNS}
         FROM users u
         LEFT JOIN student_profiles sp ON sp.user_id = u.id
         WHERE u.role = 'student' AND (?1 IS NULL OR u.department = ?1)
         ORDER BY u.id"
    ))?;
    let rows = stmt
        .query_map(params![department], student_with_profile)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_eligible(conn: &Connection) -> rusqlite::Result<Vec<StudentWithProfile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS}, {PROFILE_COLUMNS}
         FROM users u
         JOIN student_profiles sp ON sp.user_id = u.id
         WHERE u.role = 'student' AND sp.is_eligible = 1
         ORDER BY u.id"
    ))?;
    let rows = stmt
        .query_map([], student_with_profile)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
