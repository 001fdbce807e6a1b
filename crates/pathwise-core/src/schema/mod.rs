//! Roadmap data model.
//!
//! These types are the strongly-typed form of everything that crosses the
//! core boundary: inbound requests, the roadmap a provider produces, and the
//! pieces it is made of. Untyped candidates (model output, hand-built JSON)
//! become these types only through [`validate_roadmap`] /
//! [`validate_module`].

pub mod diff;
pub mod validate;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use diff::{ModuleChanges, diff_modules};
pub use validate::{
    FieldIssue, IssueKind, ValidationError, validate_generation_request, validate_module,
    validate_roadmap, validate_update_request,
};

/// Study hours per week assumed when relating module hours to
/// `estimated_weeks`.
pub const HOURS_PER_WEEK: u32 = 10;

/// Longest roadmap accepted, two years.
pub const MAX_ESTIMATED_WEEKS: u32 = 104;

/// Drift (in weeks) between declared and implied duration above which the
/// pacing is reported as inconsistent.
pub const PACING_TOLERANCE_WEEKS: u32 = 4;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Experience level of a learner, and difficulty of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    /// Every accepted wire value, in declaration order.
    pub const VALUES: &'static [&'static str] = &["beginner", "intermediate", "advanced"];
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for ExperienceLevel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(EnumParseError {
                type_name: "experience level",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------

/// Kind of learning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Documentation,
    Video,
    Course,
    Book,
    Article,
    Tool,
}

impl ResourceType {
    /// Every accepted wire value, in declaration order.
    pub const VALUES: &'static [&'static str] =
        &["documentation", "video", "course", "book", "article", "tool"];
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Documentation => "documentation",
            Self::Video => "video",
            Self::Course => "course",
            Self::Book => "book",
            Self::Article => "article",
            Self::Tool => "tool",
        };
        f.write_str(s)
    }
}

impl FromStr for ResourceType {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documentation" => Ok(Self::Documentation),
            "video" => Ok(Self::Video),
            "course" => Ok(Self::Course),
            "book" => Ok(Self::Book),
            "article" => Ok(Self::Article),
            "tool" => Ok(Self::Tool),
            other => Err(EnumParseError {
                type_name: "resource type",
                value: other.to_owned(),
            }),
        }
    }
}

/// Error returned when parsing an unrecognized enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub type_name: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.type_name, self.value)
    }
}

impl std::error::Error for EnumParseError {}

/// Whether a result came from a fresh generation or a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Creation,
    Modification,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Creation => "creation",
            Self::Modification => "modification",
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A learner's self-assessed skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillAssessment {
    pub skill: String,
    /// 1 to 10.
    pub score: u8,
    pub level: ExperienceLevel,
}

/// Free-form learning preferences, passed to the prompt verbatim.
pub type Preferences = serde_json::Map<String, serde_json::Value>;

/// Request to generate a new roadmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub user_goal: String,
    #[serde(default)]
    pub user_skills: Vec<SkillAssessment>,
    #[serde(default = "default_experience_level")]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub user_id: String,
}

fn default_experience_level() -> ExperienceLevel {
    ExperienceLevel::Beginner
}

/// Request to revise an existing roadmap with a natural-language instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub roadmap_id: String,
    pub user_prompt: String,
    /// When absent the roadmap is fetched from the attached store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_roadmap: Option<Roadmap>,
    #[serde(default)]
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Roadmap
// ---------------------------------------------------------------------------

/// A single learning resource attached to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub url: String,
    /// Free text, e.g. "3 hours".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub difficulty: ExperienceLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_recommended: Option<String>,
}

/// Hands-on project closing a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    pub description: String,
    pub deliverables: Vec<String>,
    pub estimated_hours: u32,
}

/// One ordered unit of a roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Unique within the owning roadmap.
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_hours: u32,
    /// Set semantics: no duplicates, first-seen order.
    pub skills_taught: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub learning_objectives: Vec<String>,
    /// Ids of modules that should be completed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    /// Never empty.
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
}

/// Structured, ordered learning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub career_goal: String,
    pub estimated_weeks: u32,
    #[serde(default = "default_difficulty_progression")]
    pub difficulty_progression: String,
    /// Ordered by intended learning sequence. Never empty.
    pub modules: Vec<Module>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

pub(crate) fn default_difficulty_progression() -> String {
    "beginner -> intermediate -> advanced".to_string()
}

/// How a roadmap's declared duration compares to its module hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub total_hours: u32,
    pub implied_weeks: u32,
    pub declared_weeks: u32,
}

impl Pacing {
    /// Absolute difference between declared and implied weeks.
    pub fn drift(&self) -> u32 {
        self.declared_weeks.abs_diff(self.implied_weeks)
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() <= PACING_TOLERANCE_WEEKS
    }
}

/// Weeks needed for `total_hours` at `hours_per_week`, rounded up, at least 1.
pub fn weeks_for_hours(total_hours: u32, hours_per_week: u32) -> u32 {
    let per_week = hours_per_week.max(1);
    total_hours.div_ceil(per_week).max(1)
}

impl Roadmap {
    /// Sum of module hours.
    pub fn total_hours(&self) -> u32 {
        self.modules.iter().map(|m| m.estimated_hours).sum()
    }

    /// Compare `estimated_weeks` with the duration implied by module hours.
    pub fn pacing(&self, hours_per_week: u32) -> Pacing {
        let total_hours = self.total_hours();
        Pacing {
            total_hours,
            implied_weeks: weeks_for_hours(total_hours, hours_per_week),
            declared_weeks: self.estimated_weeks,
        }
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }
}
