mod rules;

use super::domain::{Criteria, ProfileFields};
use serde::{Deserialize, Serialize};

/// One eligibility dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Attendance,
    AssessmentScore,
    Cgpa,
    SolvedProblems,
    Projects,
    PortfolioLink,
    LeetcodeProfile,
    GithubProfile,
    LinkedinProfile,
}

impl Requirement {
    pub const ALL: [Requirement; 9] = [
        Requirement::Attendance,
        Requirement::AssessmentScore,
        Requirement::Cgpa,
        Requirement::SolvedProblems,
        Requirement::Projects,
        Requirement::PortfolioLink,
        Requirement::LeetcodeProfile,
        Requirement::GithubProfile,
        Requirement::LinkedinProfile,
    ];
}

/// Outcome for a single dimension, kept for dashboards and audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCheck {
    pub requirement: Requirement,
    pub met: bool,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub eligible: bool,
    pub checks: Vec<RequirementCheck>,
}

impl Assessment {
    pub fn unmet(&self) -> impl Iterator<Item = &RequirementCheck> {
        self.checks.iter().filter(|check| !check.met)
    }
}

/// A student is eligible iff every dimension is met. Comparisons are inclusive.
pub fn evaluate(profile: &ProfileFields, criteria: &Criteria) -> bool {
    Requirement::ALL
        .iter()
        .all(|requirement| rules::meets(*requirement, profile, criteria))
}

/// Same decision as [`evaluate`], with a note per dimension.
pub fn assess(profile: &ProfileFields, criteria: &Criteria) -> Assessment {
    let checks: Vec<RequirementCheck> = Requirement::ALL
        .iter()
        .map(|requirement| RequirementCheck {
            requirement: *requirement,
            met: rules::meets(*requirement, profile, criteria),
            notes: rules::describe(*requirement, profile, criteria),
        })
        .collect();

    Assessment {
        eligible: checks.iter().all(|check| check.met),
        checks,
    }
}
