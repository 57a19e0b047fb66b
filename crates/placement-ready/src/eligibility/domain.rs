use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a student account in the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub i64);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single authoritative set of eligibility thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Criteria {
    pub min_attendance: f64,
    pub min_assessment_score: f64,
    pub min_cgpa: f64,
    pub min_leetcode_problems: u32,
    pub min_projects: u32,
    pub require_portfolio: bool,
    pub require_leetcode_profile: bool,
    pub require_github_profile: bool,
    pub require_linkedin_profile: bool,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
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
}

impl Criteria {
    pub fn validate(&self) -> Result<(), ValidationError> {
        bounded("min_attendance", self.min_attendance, MAX_PERCENTAGE)?;
        bounded("min_assessment_score", self.min_assessment_score, f64::MAX)?;
        bounded("min_cgpa", self.min_cgpa, MAX_CGPA)?;
        Ok(())
    }
}

const MAX_PERCENTAGE: f64 = 100.0;
const MAX_CGPA: f64 = 10.0;

fn bounded(field: &'static str, value: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

/// Student-submitted profile data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileFields {
    pub semester_cgpa: f64,
    pub weekly_assessment_score: f64,
    pub attendance_percentage: f64,
    pub leetcode_problems: u32,
    /// Comma-delimited project names.
    #[serde(default)]
    pub projects: String,
    #[serde(default)]
    pub domain_specialization: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub project_titles: String,
    #[serde(default)]
    pub project_domains: String,
    #[serde(default)]
    pub project_github_links: String,
    pub portfolio_link: Option<String>,
    pub leetcode_profile: Option<String>,
    pub github_profile: Option<String>,
    pub linkedin_profile: Option<String>,
}

impl ProfileFields {
    /// Number of comma-separated tokens; an empty field counts as zero projects.
    ///
    /// Empty tokens are counted (`"A,,B"` is three projects).
    pub fn project_count(&self) -> usize {
        if self.projects.is_empty() {
            0
        } else {
            self.projects.split(',').count()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        bounded("semester_cgpa", self.semester_cgpa, MAX_CGPA)?;
        bounded(
            "weekly_assessment_score",
            self.weekly_assessment_score,
            f64::MAX,
        )?;
        bounded(
            "attendance_percentage",
            self.attendance_percentage,
            MAX_PERCENTAGE,
        )?;
        Ok(())
    }

    /// Trim links and drop blank ones so "present" always means non-empty.
    pub fn normalized(mut self) -> Self {
        for link in [
            &mut self.portfolio_link,
            &mut self.leetcode_profile,
            &mut self.github_profile,
            &mut self.linkedin_profile,
        ] {
            *link = link
                .take()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        self
    }
}

/// Form-style submission where every field arrives as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSubmission {
    pub semester_cgpa: String,
    pub weekly_assessment_score: String,
    pub attendance_percentage: String,
    pub leetcode_problems: String,
    #[serde(default)]
    pub projects: String,
    #[serde(default)]
    pub domain_specialization: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub project_titles: String,
    #[serde(default)]
    pub project_domains: String,
    #[serde(default)]
    pub project_github_links: String,
    #[serde(default)]
    pub portfolio_link: String,
    #[serde(default)]
    pub leetcode_profile: String,
    #[serde(default)]
    pub github_profile: String,
    #[serde(default)]
    pub linkedin_profile: String,
}

impl TryFrom<ProfileSubmission> for ProfileFields {
    type Error = ValidationError;

    fn try_from(submission: ProfileSubmission) -> Result<Self, Self::Error> {
        let fields = ProfileFields {
            semester_cgpa: decimal("semester_cgpa", &submission.semester_cgpa)?,
            weekly_assessment_score: decimal(
                "weekly_assessment_score",
                &submission.weekly_assessment_score,
            )?,
            attendance_percentage: decimal(
                "attendance_percentage",
                &submission.attendance_percentage,
            )?,
            leetcode_problems: whole("leetcode_problems", &submission.leetcode_problems)?,
            projects: submission.projects.trim().to_string(),
            domain_specialization: submission.domain_specialization,
            skills: submission.skills,
            project_titles: submission.project_titles,
            project_domains: submission.project_domains,
            project_github_links: submission.project_github_links,
            portfolio_link: Some(submission.portfolio_link),
            leetcode_profile: Some(submission.leetcode_profile),
            github_profile: Some(submission.github_profile),
            linkedin_profile: Some(submission.linkedin_profile),
        }
        .normalized();

        fields.validate()?;
        Ok(fields)
    }
}

fn decimal(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| ValidationError::NotANumber {
            field,
            value: raw.to_string(),
        })
}

fn whole(field: &'static str, raw: &str) -> Result<u32, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| ValidationError::NotAWholeNumber {
            field,
            value: raw.to_string(),
        })
}

/// Rejected input. Raised before anything reaches storage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be a number, got {value:?}")]
    NotANumber { field: &'static str, value: String },
    #[error("{field} must be a non-negative whole number, got {value:?}")]
    NotAWholeNumber { field: &'static str, value: String },
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{field} is already registered")]
    Duplicate { field: &'static str },
}

/// Stored profile. `is_eligible` is only ever written by the cascade and `is_approved`
/// only by the approval step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: i64,
    pub student_id: StudentId,
    #[serde(flatten)]
    pub fields: ProfileFields,
    pub is_eligible: bool,
    pub is_approved: bool,
}

/// Directory entry for a student. Credentials live with the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentAccount {
    pub id: StudentId,
    pub username: String,
    pub email: String,
    pub department: Option<String>,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewStudent {
    pub username: String,
    pub email: String,
    pub department: Option<String>,
    pub specialization: Option<String>,
}

impl NewStudent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::Missing { field: "username" });
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::Missing { field: "email" });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentWithProfile {
    #[serde(flatten)]
    pub student: StudentAccount,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller, supplied by the transport for every core call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: i64,
    pub role: Role,
}

impl RequestContext {
    pub fn admin(actor: i64) -> Self {
        Self {
            actor,
            role: Role::Admin,
        }
    }

    pub fn student(student: StudentId) -> Self {
        Self {
            actor: student.0,
            role: Role::Student,
        }
    }

    /// Context for operator tooling running outside any request.
    pub fn operator() -> Self {
        Self::admin(0)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn acts_for(&self, student: StudentId) -> bool {
        self.is_admin() || (self.role == Role::Student && self.actor == student.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> ProfileSubmission {
        ProfileSubmission {
            semester_cgpa: "9.1".to_string(),
            weekly_assessment_score: " 82 ".to_string(),
            attendance_percentage: "90".to_string(),
            leetcode_problems: "150".to_string(),
            projects: "Tracker,Compiler,Chat".to_string(),
            portfolio_link: "  https://portfolio.example ".to_string(),
            github_profile: "   ".to_string(),
            ..ProfileSubmission::default()
        }
    }

    #[test]
    fn submission_parses_numbers_and_normalizes_links() {
        let fields = ProfileFields::try_from(submission()).expect("valid submission");

        assert_eq!(fields.semester_cgpa, 9.1);
        assert_eq!(fields.weekly_assessment_score, 82.0);
        assert_eq!(fields.leetcode_problems, 150);
        assert_eq!(
            fields.portfolio_link.as_deref(),
            Some("https://portfolio.example")
        );
        assert_eq!(fields.github_profile, None);
        assert_eq!(fields.linkedin_profile, None);
    }

    #[test]
    fn submission_rejects_non_numeric_score() {
        let mut raw = submission();
        raw.weekly_assessment_score = "eighty".to_string();

        match ProfileFields::try_from(raw) {
            Err(ValidationError::NotANumber { field, value }) => {
                assert_eq!(field, "weekly_assessment_score");
                assert_eq!(value, "eighty");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn submission_rejects_fractional_problem_count_and_blank_cgpa() {
        let mut raw = submission();
        raw.leetcode_problems = "12.5".to_string();
        assert!(matches!(
            ProfileFields::try_from(raw),
            Err(ValidationError::NotAWholeNumber { .. })
        ));

        let mut raw = submission();
        raw.semester_cgpa = String::new();
        assert_eq!(
            ProfileFields::try_from(raw),
            Err(ValidationError::Missing {
                field: "semester_cgpa"
            })
        );
    }

    #[test]
    fn submission_rejects_attendance_above_hundred() {
        let mut raw = submission();
        raw.attendance_percentage = "101".to_string();
        assert!(matches!(
            ProfileFields::try_from(raw),
            Err(ValidationError::OutOfRange {
                field: "attendance_percentage",
                ..
            })
        ));
    }

    #[test]
    fn project_count_uses_naive_split() {
        let mut fields = ProfileFields::try_from(submission()).expect("valid");
        assert_eq!(fields.project_count(), 3);

        fields.projects = String::new();
        assert_eq!(fields.project_count(), 0);

        fields.projects = "A,,B".to_string();
        assert_eq!(fields.project_count(), 3);

        fields.projects = "A,".to_string();
        assert_eq!(fields.project_count(), 2);
    }

    #[test]
    fn criteria_rejects_nan_and_negative_thresholds() {
        let mut criteria = Criteria::default();
        assert!(criteria.validate().is_ok());

        criteria.min_cgpa = f64::NAN;
        assert!(criteria.validate().is_err());

        criteria.min_cgpa = 8.0;
        criteria.min_assessment_score = -1.0;
        assert!(matches!(
            criteria.validate(),
            Err(ValidationError::OutOfRange {
                field: "min_assessment_score",
                ..
            })
        ));
    }

    #[test]
    fn criteria_payload_rejects_unknown_fields() {
        let payload = serde_json::json!({
            "min_attendance": 85.0,
            "min_assessment_score": 80.0,
            "min_cgpa": 8.5,
            "min_leetcode_problems": 100,
            "min_projects": 3,
            "require_portfolio": true,
            "require_leetcode_profile": false,
            "require_github_profile": false,
            "require_linkedin_profile": false,
            "require_blog": true
        });
        assert!(serde_json::from_value::<Criteria>(payload).is_err());
    }

    #[test]
    fn context_scopes_students_to_themselves() {
        let own = StudentId(7);
        let ctx = RequestContext::student(own);

        assert!(ctx.acts_for(own));
        assert!(!ctx.acts_for(StudentId(8)));
        assert!(RequestContext::operator().acts_for(StudentId(8)));
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("guest"), None);
    }
}
