use std::io::Write;

use chrono::NaiveDate;
use placement_ready::eligibility::StudentWithProfile;
use serde::Serialize;

/// One line of the eligible-students sheet handed to recruiters.
#[derive(Debug, Serialize)]
struct EligibleRow<'a> {
    student_id: i64,
    username: &'a str,
    email: &'a str,
    department: &'a str,
    specialization: &'a str,
    semester_cgpa: f64,
    attendance_percentage: f64,
    weekly_assessment_score: f64,
    leetcode_problems: u32,
    projects: &'a str,
    domain_specialization: &'a str,
    skills: &'a str,
    portfolio_link: &'a str,
    github_profile: &'a str,
    linkedin_profile: &'a str,
    leetcode_profile: &'a str,
    is_approved: bool,
}

impl<'a> EligibleRow<'a> {
    fn from_entry(entry: &'a StudentWithProfile) -> Option<Self> {
        let profile = entry.profile.as_ref()?;
        let fields = &profile.fields;
        Some(Self {
            student_id: entry.student.id.0,
            username: &entry.student.username,
            email: &entry.student.email,
            department: entry.student.department.as_deref().unwrap_or_default(),
            specialization: entry.student.specialization.as_deref().unwrap_or_default(),
            semester_cgpa: fields.semester_cgpa,
            attendance_percentage: fields.attendance_percentage,
            weekly_assessment_score: fields.weekly_assessment_score,
            leetcode_problems: fields.leetcode_problems,
            projects: &fields.projects,
            domain_specialization: &fields.domain_specialization,
            skills: &fields.skills,
            portfolio_link: fields.portfolio_link.as_deref().unwrap_or_default(),
            github_profile: fields.github_profile.as_deref().unwrap_or_default(),
            linkedin_profile: fields.linkedin_profile.as_deref().unwrap_or_default(),
            leetcode_profile: fields.leetcode_profile.as_deref().unwrap_or_default(),
            is_approved: profile.is_approved,
        })
    }
}

/// Write the eligible listing as CSV with a header row. Entries without a profile are skipped.
pub(crate) fn write_eligible_csv<W: Write>(
    writer: W,
    students: &[StudentWithProfile],
) -> Result<usize, std::io::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut written = 0;
    for row in students.iter().filter_map(EligibleRow::from_entry) {
        csv.serialize(row)?;
        written += 1;
    }
    csv.flush()?;
    Ok(written)
}

pub(crate) fn export_filename(date: NaiveDate) -> String {
    format!("eligible_students_{}.csv", date.format("%Y%m%d"))
}
