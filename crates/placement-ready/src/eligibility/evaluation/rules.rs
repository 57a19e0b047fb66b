use super::super::domain::{Criteria, ProfileFields};
use super::Requirement;

pub(crate) fn meets(requirement: Requirement, profile: &ProfileFields, criteria: &Criteria) -> bool {
    match requirement {
        Requirement::Attendance => profile.attendance_percentage >= criteria.min_attendance,
        Requirement::AssessmentScore => {
            profile.weekly_assessment_score >= criteria.min_assessment_score
        }
        Requirement::Cgpa => profile.semester_cgpa >= criteria.min_cgpa,
        Requirement::SolvedProblems => profile.leetcode_problems >= criteria.min_leetcode_problems,
        Requirement::Projects => profile.project_count() >= criteria.min_projects as usize,
        Requirement::PortfolioLink => {
            !criteria.require_portfolio || has_link(&profile.portfolio_link)
        }
        Requirement::LeetcodeProfile => {
            !criteria.require_leetcode_profile || has_link(&profile.leetcode_profile)
        }
        Requirement::GithubProfile => {
            !criteria.require_github_profile || has_link(&profile.github_profile)
        }
        Requirement::LinkedinProfile => {
            !criteria.require_linkedin_profile || has_link(&profile.linkedin_profile)
        }
    }
}

fn has_link(link: &Option<String>) -> bool {
    link.as_deref().is_some_and(|value| !value.is_empty())
}

pub(crate) fn describe(
    requirement: Requirement,
    profile: &ProfileFields,
    criteria: &Criteria,
) -> String {
    match requirement {
        Requirement::Attendance => format!(
            "attendance {:.1}% against minimum {:.1}%",
            profile.attendance_percentage, criteria.min_attendance
        ),
        Requirement::AssessmentScore => format!(
            "assessment score {:.1} against minimum {:.1}",
            profile.weekly_assessment_score, criteria.min_assessment_score
        ),
        Requirement::Cgpa => format!(
            "cgpa {:.2} against minimum {:.2}",
            profile.semester_cgpa, criteria.min_cgpa
        ),
        Requirement::SolvedProblems => format!(
            "{} solved problems against minimum {}",
            profile.leetcode_problems, criteria.min_leetcode_problems
        ),
        Requirement::Projects => format!(
            "{} project(s) against minimum {}",
            profile.project_count(),
            criteria.min_projects
        ),
        Requirement::PortfolioLink => {
            link_note("portfolio link", criteria.require_portfolio, &profile.portfolio_link)
        }
        Requirement::LeetcodeProfile => link_note(
            "leetcode profile",
            criteria.require_leetcode_profile,
            &profile.leetcode_profile,
        ),
        Requirement::GithubProfile => link_note(
            "github profile",
            criteria.require_github_profile,
            &profile.github_profile,
        ),
        Requirement::LinkedinProfile => link_note(
            "linkedin profile",
            criteria.require_linkedin_profile,
            &profile.linkedin_profile,
        ),
    }
}

fn link_note(label: &str, required: bool, link: &Option<String>) -> String {
    match (required, has_link(link)) {
        (false, _) => format!("{label} not required"),
        (true, true) => format!("{label} provided"),
        (true, false) => format!("{label} required but missing"),
    }
}
