//! Total validation of untyped roadmap candidates.
//!
//! Every input is either turned into a typed value or rejected with the full
//! list of field-path-qualified issues. Validation never stops at the first
//! problem, and it never coerces: an unknown enum value or a numeric string is
//! an issue here (the parser owns repairs).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    ExperienceLevel, GenerationRequest, Module, Project, Resource, ResourceType, Roadmap,
    MAX_ESTIMATED_WEEKS, UpdateRequest, default_difficulty_progression,
};

/// Path used for issues about the candidate as a whole.
const ROOT: &str = "$";

/// Classification of a single validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    WrongType,
    InvalidEnum,
    NotPositive,
    OutOfRange,
    Empty,
    Duplicate,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "missing",
            Self::WrongType => "wrong_type",
            Self::InvalidEnum => "invalid_enum",
            Self::NotPositive => "not_positive",
            Self::OutOfRange => "out_of_range",
            Self::Empty => "empty",
            Self::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

/// One problem found at one field path, e.g. `modules[2].resources[0].type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.message, self.kind)
    }
}

/// A candidate (or request) failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} validation issue(s): {}", .issues.len(), join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    /// Issues as `path: message` lines, for diagnostics and reformat prompts.
    pub fn diagnostics(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    /// True when every issue path starts with one of `prefixes`.
    pub fn only_under(&self, prefixes: &[String]) -> bool {
        !self.issues.is_empty()
            && self
                .issues
                .iter()
                .all(|issue| prefixes.iter().any(|p| is_within(&issue.path, p)))
    }
}

/// `path` equals `prefix` or names a field/element nested below it.
pub(crate) fn is_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Validate an untyped roadmap candidate.
///
/// Missing or empty ids are synthesized deterministically: modules get
/// `module-<position>` (suffixed when taken) and the roadmap gets
/// `roadmap-<uuid v5 of the candidate>`, so validating the same candidate
/// twice yields the same roadmap.
pub fn validate_roadmap(candidate: &Value) -> Result<Roadmap, ValidationError> {
    let mut checker = Checker::default();
    let roadmap = checker.roadmap(candidate);
    checker.finish(roadmap)
}

/// Validate a single module candidate (module-patch contract).
pub fn validate_module(candidate: &Value) -> Result<Module, ValidationError> {
    let mut checker = Checker::default();
    let module = checker.module(candidate, "").map(|mut module| {
        if module.id.is_empty() {
            module.id = "module-1".to_string();
        }
        module
    });
    checker.finish(module)
}

/// Check an inbound generation request.
pub fn validate_generation_request(request: &GenerationRequest) -> Result<(), ValidationError> {
    let mut checker = Checker::default();
    if request.user_goal.trim().is_empty() {
        checker.push("user_goal", IssueKind::Empty, "goal must not be empty");
    }
    for (i, skill) in request.user_skills.iter().enumerate() {
        if skill.skill.trim().is_empty() {
            checker.push(
                format!("user_skills[{i}].skill"),
                IssueKind::Empty,
                "skill name must not be empty",
            );
        }
        if !(1..=10).contains(&skill.score) {
            checker.push(
                format!("user_skills[{i}].score"),
                IssueKind::OutOfRange,
                format!("score must be between 1 and 10, found {}", skill.score),
            );
        }
    }
    checker.finish(Some(()))
}

/// Check an inbound update request.
pub fn validate_update_request(request: &UpdateRequest) -> Result<(), ValidationError> {
    let mut checker = Checker::default();
    if request.roadmap_id.trim().is_empty() {
        checker.push("roadmap_id", IssueKind::Empty, "roadmap id must not be empty");
    }
    if request.user_prompt.trim().is_empty() {
        checker.push(
            "user_prompt",
            IssueKind::Empty,
            "modification instruction must not be empty",
        );
    }
    checker.finish(Some(()))
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Default)]
struct Checker {
    issues: Vec<FieldIssue>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            path: path.into(),
            kind,
            message: message.into(),
        });
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(value) if self.issues.is_empty() => Ok(value),
            _ => Err(ValidationError::new(self.issues)),
        }
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                let path = if path.is_empty() { ROOT } else { path };
                self.push(
                    path,
                    IssueKind::WrongType,
                    format!("expected an object, found {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Required string that may be empty.
    fn text(&mut self, obj: &Map<String, Value>, prefix: &str, key: &str) -> Option<String> {
        let path = join(prefix, key);
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.push(path, IssueKind::Missing, "required field is missing");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.push(
                    path,
                    IssueKind::WrongType,
                    format!("expected a string, found {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Required non-blank string.
    fn string(&mut self, obj: &Map<String, Value>, prefix: &str, key: &str) -> Option<String> {
        let value = self.text(obj, prefix, key)?;
        if value.trim().is_empty() {
            self.push(join(prefix, key), IssueKind::Empty, "must not be empty");
            return None;
        }
        Some(value)
    }

    fn optional_string(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
    ) -> Option<Option<String>> {
        match obj.get(key) {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(s)) if s.trim().is_empty() => Some(None),
            Some(Value::String(s)) => Some(Some(s.clone())),
            Some(other) => {
                self.push(
                    join(prefix, key),
                    IssueKind::WrongType,
                    format!("expected a string, found {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Ids: absent, null and blank all mean "synthesize one" (empty string).
    fn identifier(&mut self, obj: &Map<String, Value>, prefix: &str) -> Option<String> {
        match obj.get("id") {
            None | Some(Value::Null) => Some(String::new()),
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(other) => {
                self.push(
                    join(prefix, "id"),
                    IssueKind::WrongType,
                    format!("expected a string id, found {}", type_name(other)),
                );
                None
            }
        }
    }

    fn positive_integer(&mut self, obj: &Map<String, Value>, prefix: &str, key: &str) -> Option<u32> {
        let path = join(prefix, key);
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.push(path, IssueKind::Missing, "required field is missing");
                None
            }
            Some(Value::Number(n)) => match n.as_i64() {
                Some(v) if v <= 0 => {
                    self.push(path, IssueKind::NotPositive, format!("must be positive, found {v}"));
                    None
                }
                Some(v) => match u32::try_from(v) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        self.push(path, IssueKind::OutOfRange, format!("{v} is too large"));
                        None
                    }
                },
                None => {
                    self.push(
                        path,
                        IssueKind::WrongType,
                        format!("expected an integer, found {n}"),
                    );
                    None
                }
            },
            Some(other) => {
                self.push(
                    path,
                    IssueKind::WrongType,
                    format!("expected an integer, found {}", type_name(other)),
                );
                None
            }
        }
    }

    fn enumeration<T: FromStr>(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
        allowed: &[&str],
    ) -> Option<T> {
        let raw = self.string(obj, prefix, key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.push(
                    join(prefix, key),
                    IssueKind::InvalidEnum,
                    format!("expected one of {}, found {raw:?}", allowed.join(", ")),
                );
                None
            }
        }
    }

    fn string_list(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
        required: bool,
    ) -> Option<Vec<String>> {
        let path = join(prefix, key);
        let items = match obj.get(key) {
            None | Some(Value::Null) if required => {
                self.push(path, IssueKind::Missing, "required field is missing");
                return None;
            }
            None | Some(Value::Null) => return Some(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.push(
                    path,
                    IssueKind::WrongType,
                    format!("expected an array of strings, found {}", type_name(other)),
                );
                return None;
            }
        };

        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::String(s) if s.trim().is_empty() => {
                    self.push(format!("{path}[{i}]"), IssueKind::Empty, "must not be empty");
                    ok = false;
                }
                Value::String(s) => out.push(s.clone()),
                other => {
                    self.push(
                        format!("{path}[{i}]"),
                        IssueKind::WrongType,
                        format!("expected a string, found {}", type_name(other)),
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(out)
    }

    fn timestamp(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &str,
        key: &str,
    ) -> Option<Option<DateTime<Utc>>> {
        match obj.get(key) {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Some(Some(ts.with_timezone(&Utc))),
                Err(e) => {
                    self.push(
                        join(prefix, key),
                        IssueKind::WrongType,
                        format!("expected an RFC 3339 timestamp: {e}"),
                    );
                    None
                }
            },
            Some(other) => {
                self.push(
                    join(prefix, key),
                    IssueKind::WrongType,
                    format!("expected an RFC 3339 timestamp, found {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Required, non-empty array whose elements are checked with `each`.
    fn non_empty_array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        prefix: &str,
        key: &str,
    ) -> Option<&'a Vec<Value>> {
        let path = join(prefix, key);
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.push(path, IssueKind::Missing, "required field is missing");
                None
            }
            Some(Value::Array(items)) if items.is_empty() => {
                self.push(path, IssueKind::Empty, "at least one entry is required");
                None
            }
            Some(Value::Array(items)) => Some(items),
            Some(other) => {
                self.push(
                    path,
                    IssueKind::WrongType,
                    format!("expected an array, found {}", type_name(other)),
                );
                None
            }
        }
    }

    // -- structures ---------------------------------------------------------

    fn resource(&mut self, value: &Value, path: &str) -> Option<Resource> {
        let obj = self.object(value, path)?;
        let title = self.string(obj, path, "title");
        let resource_type =
            self.enumeration::<ResourceType>(obj, path, "type", ResourceType::VALUES);
        let url = self.string(obj, path, "url");
        let duration = self.optional_string(obj, path, "duration");
        let difficulty =
            self.enumeration::<ExperienceLevel>(obj, path, "difficulty", ExperienceLevel::VALUES);
        let why_recommended = self.optional_string(obj, path, "why_recommended");
        Some(Resource {
            title: title?,
            resource_type: resource_type?,
            url: url?,
            duration: duration?,
            difficulty: difficulty?,
            why_recommended: why_recommended?,
        })
    }

    fn project(&mut self, value: &Value, path: &str) -> Option<Project> {
        let obj = self.object(value, path)?;
        let title = self.string(obj, path, "title");
        let description = self.string(obj, path, "description");
        let deliverables = self.string_list(obj, path, "deliverables", true);
        let estimated_hours = self.positive_integer(obj, path, "estimated_hours");
        Some(Project {
            title: title?,
            description: description?,
            deliverables: deliverables?,
            estimated_hours: estimated_hours?,
        })
    }

    /// Module with its id left empty when it has to be synthesized.
    fn module(&mut self, value: &Value, path: &str) -> Option<Module> {
        let obj = self.object(value, path)?;
        let id = self.identifier(obj, path);
        let title = self.string(obj, path, "title");
        let description = self.string(obj, path, "description");
        let estimated_hours = self.positive_integer(obj, path, "estimated_hours");
        let skills_taught = self.string_list(obj, path, "skills_taught", true).map(dedup);
        let learning_objectives = self.string_list(obj, path, "learning_objectives", false);
        let prerequisites = self.string_list(obj, path, "prerequisites", false);
        let assessment = self.optional_string(obj, path, "assessment");

        let resources = self.non_empty_array(obj, path, "resources").and_then(|items| {
            let prefix = join(path, "resources");
            let checked: Vec<Option<Resource>> = items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resource(item, &format!("{prefix}[{i}]")))
                .collect();
            checked.into_iter().collect::<Option<Vec<_>>>()
        });

        let project = match obj.get("project") {
            None | Some(Value::Null) => Some(None),
            Some(value) => self.project(value, &join(path, "project")).map(Some),
        };

        Some(Module {
            id: id?,
            title: title?,
            description: description?,
            estimated_hours: estimated_hours?,
            skills_taught: skills_taught?,
            learning_objectives: learning_objectives?,
            prerequisites: prerequisites?,
            assessment: assessment?,
            resources: resources?,
            project: project?,
        })
    }

    fn modules(&mut self, obj: &Map<String, Value>) -> Option<Vec<Module>> {
        let items = self.non_empty_array(obj, "", "modules")?;
        let mut checked: Vec<Option<Module>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.module(item, &format!("modules[{i}]")))
            .collect();
        self.assign_module_ids(&mut checked);
        checked.into_iter().collect()
    }

    /// Flag duplicate ids, then fill in missing ones by position.
    fn assign_module_ids(&mut self, modules: &mut [Option<Module>]) {
        let mut taken = HashSet::new();
        for (i, module) in modules.iter().enumerate() {
            let Some(module) = module else { continue };
            if module.id.is_empty() {
                continue;
            }
            if !taken.insert(module.id.clone()) {
                self.push(
                    format!("modules[{i}].id"),
                    IssueKind::Duplicate,
                    format!("module id {:?} is used more than once", module.id),
                );
            }
        }

        for (i, module) in modules.iter_mut().enumerate() {
            let Some(module) = module else { continue };
            if !module.id.is_empty() {
                continue;
            }
            let base = format!("module-{}", i + 1);
            let mut candidate = base.clone();
            let mut suffix = 2;
            while taken.contains(&candidate) {
                candidate = format!("{base}-{suffix}");
                suffix += 1;
            }
            taken.insert(candidate.clone());
            module.id = candidate;
        }
    }

    fn roadmap(&mut self, candidate: &Value) -> Option<Roadmap> {
        let obj = self.object(candidate, "")?;
        let id = self.identifier(obj, "");
        let user_id = self.text(obj, "", "user_id");
        let title = self.string(obj, "", "title");
        let career_goal = self.string(obj, "", "career_goal");
        let estimated_weeks = self
            .positive_integer(obj, "", "estimated_weeks")
            .and_then(|weeks| {
                if weeks > MAX_ESTIMATED_WEEKS {
                    self.push(
                        "estimated_weeks",
                        IssueKind::OutOfRange,
                        format!("must be at most {MAX_ESTIMATED_WEEKS} weeks, found {weeks}"),
                    );
                    return None;
                }
                Some(weeks)
            });
        let difficulty_progression = self.optional_string(obj, "", "difficulty_progression");
        let modules = self.modules(obj);
        let created_at = self.timestamp(obj, "", "created_at");
        let updated_at = self.timestamp(obj, "", "updated_at");

        let id = id.map(|id| {
            if id.is_empty() {
                synthesized_roadmap_id(candidate)
            } else {
                id
            }
        });

        Some(Roadmap {
            id: id?,
            user_id: user_id?,
            title: title?,
            career_goal: career_goal?,
            estimated_weeks: estimated_weeks?,
            difficulty_progression: difficulty_progression?
                .unwrap_or_else(default_difficulty_progression),
            modules: modules?,
            created_at: created_at?,
            updated_at: updated_at?,
        })
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn synthesized_roadmap_id(candidate: &Value) -> String {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, candidate.to_string().as_bytes());
    format!("roadmap-{digest}")
}
