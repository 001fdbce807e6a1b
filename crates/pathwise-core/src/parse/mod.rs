//! Response parser and repairer.
//!
//! Turns a provider's [`RawOutput`] into a validated [`Roadmap`] (or a single
//! [`Module`] for the patch contract):
//!
//! 1. decode the content directly;
//! 2. on failure, apply bounded textual repairs (strip prose and fences,
//!    drop trailing commas) and decode again;
//! 3. validate; on failure coerce numeric strings on integer fields, fill in
//!    non-essential fields, drop invalid optional projects and validate
//!    again;
//! 4. report whatever issues remain as a [`ParseError`].
//!
//! Parsing is deterministic: the same raw output always yields the same
//! result.

pub mod repair;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::prompt::{MODULE_CONTRACT, OutputContract, ROADMAP_CONTRACT};
use crate::provider::{RawContent, RawOutput};
use crate::schema::validate::is_within;
use crate::schema::{
    ExperienceLevel, GenerationRequest, MAX_ESTIMATED_WEEKS, Module, Roadmap, UpdateRequest,
    ValidationError, validate_module, validate_roadmap, weeks_for_hours,
};

pub use repair::Repair;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Values used to fill non-essential roadmap fields the provider left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadmapDefaults {
    pub user_id: String,
    pub title: String,
    pub career_goal: String,
    /// Difficulty for resources that do not state one.
    pub difficulty: ExperienceLevel,
    pub hours_per_week: u32,
}

impl RoadmapDefaults {
    pub fn for_generation(request: &GenerationRequest, hours_per_week: u32) -> Self {
        Self {
            user_id: request.user_id.clone(),
            title: format!("Learning roadmap: {}", request.user_goal.trim()),
            career_goal: request.user_goal.trim().to_string(),
            difficulty: request.experience_level,
            hours_per_week,
        }
    }

    pub fn for_update(request: &UpdateRequest, existing: &Roadmap, hours_per_week: u32) -> Self {
        let difficulty = existing
            .modules
            .iter()
            .flat_map(|m| m.resources.first())
            .map(|r| r.difficulty)
            .next()
            .unwrap_or(ExperienceLevel::Beginner);
        Self {
            user_id: if request.user_id.is_empty() {
                existing.user_id.clone()
            } else {
                request.user_id.clone()
            },
            title: existing.title.clone(),
            career_goal: existing.career_goal.clone(),
            difficulty,
            hours_per_week,
        }
    }
}

/// What the caller expects the provider to have produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutput {
    Roadmap(RoadmapDefaults),
    /// A single module; `difficulty` fills resources that omit one.
    Module { difficulty: ExperienceLevel },
}

impl ExpectedOutput {
    pub fn contract(&self) -> &'static OutputContract {
        match self {
            Self::Roadmap(_) => &ROADMAP_CONTRACT,
            Self::Module { .. } => &MODULE_CONTRACT,
        }
    }
}

/// A successfully parsed structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Roadmap(Roadmap),
    Module(Module),
}

/// Result of a parse plus the repairs needed to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub parsed: Parsed,
    pub repairs: Vec<Repair>,
}

/// Provider output that could not be turned into the expected structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object could be recovered: {reason}")]
    NoJson { reason: String, repairs: Vec<Repair> },

    #[error("output does not match the {contract} contract: {source}")]
    Invalid {
        contract: &'static str,
        source: ValidationError,
        repairs: Vec<Repair>,
    },
}

impl ParseError {
    pub fn repairs(&self) -> &[Repair] {
        match self {
            Self::NoJson { repairs, .. } | Self::Invalid { repairs, .. } => repairs,
        }
    }

    /// Problems for a reformat prompt or a failure report.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines = match self {
            Self::NoJson { reason, .. } => vec![format!("no JSON object: {reason}")],
            Self::Invalid { source, .. } => source.diagnostics(),
        };
        lines.extend(self.repairs().iter().map(|r| format!("repair applied: {r}")));
        lines
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse raw provider output against the expected contract.
pub fn parse(raw: &RawOutput, expected: &ExpectedOutput) -> Result<ParseOutcome, ParseError> {
    let mut repairs = Vec::new();
    let parsed = match expected {
        ExpectedOutput::Roadmap(defaults) => {
            Parsed::Roadmap(roadmap_with_repairs(raw, defaults, &mut repairs)?)
        }
        ExpectedOutput::Module { difficulty } => {
            Parsed::Module(module_with_repairs(raw, *difficulty, &mut repairs)?)
        }
    };

    if !repairs.is_empty() {
        tracing::debug!(
            repairs = ?repairs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "provider output repaired"
        );
    }
    Ok(ParseOutcome { parsed, repairs })
}

/// Parse a full roadmap.
pub fn parse_roadmap(raw: &RawOutput, defaults: &RoadmapDefaults) -> Result<Roadmap, ParseError> {
    roadmap_with_repairs(raw, defaults, &mut Vec::new())
}

/// Parse a single module (patch contract).
pub fn parse_module(raw: &RawOutput, difficulty: ExperienceLevel) -> Result<Module, ParseError> {
    module_with_repairs(raw, difficulty, &mut Vec::new())
}

fn roadmap_with_repairs(
    raw: &RawOutput,
    defaults: &RoadmapDefaults,
    repairs: &mut Vec<Repair>,
) -> Result<Roadmap, ParseError> {
    let candidates = decode(raw)?;
    first_valid(candidates, &ROADMAP_CONTRACT, repairs, |candidate, repairs| {
        validate_with_repairs(
            candidate,
            repairs,
            &ROADMAP_CONTRACT,
            |value| synthesize_roadmap_fields(value, defaults),
            "modules[{}].project",
            validate_roadmap,
        )
    })
}

fn module_with_repairs(
    raw: &RawOutput,
    difficulty: ExperienceLevel,
    repairs: &mut Vec<Repair>,
) -> Result<Module, ParseError> {
    let candidates = decode(raw)?;
    first_valid(candidates, &MODULE_CONTRACT, repairs, |candidate, repairs| {
        validate_with_repairs(
            candidate,
            repairs,
            &MODULE_CONTRACT,
            |value| synthesize_module_fields(value, "", difficulty),
            "project",
            validate_module,
        )
    })
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A JSON object recovered from the output and the repairs that produced it.
struct Decoded {
    value: Value,
    repairs: Vec<Repair>,
    /// Length of the source text; the longest candidate explains failures.
    span_len: usize,
}

/// Recover every candidate JSON object, in order of appearance. Structured
/// content is the only candidate and is taken as is.
fn decode(raw: &RawOutput) -> Result<Vec<Decoded>, ParseError> {
    match &raw.content {
        RawContent::Structured(value) => Ok(vec![Decoded {
            value: value.clone(),
            repairs: Vec::new(),
            span_len: usize::MAX,
        }]),
        RawContent::Text(text) => decode_text(text, raw.truncated),
    }
}

fn decode_text(text: &str, truncated: bool) -> Result<Vec<Decoded>, ParseError> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(vec![Decoded {
            value,
            repairs: Vec::new(),
            span_len: trimmed.len(),
        }]);
    }

    let mut candidates = Vec::new();
    let mut last_error = None;
    for span in repair::object_spans(trimmed) {
        let mut repairs = Vec::new();
        if span != trimmed {
            repairs.push(Repair::StrippedWrapping);
        }
        let value = match serde_json::from_str::<Value>(span) {
            Ok(value) => value,
            Err(e) => {
                last_error = Some(e.to_string());
                let Some(fixed) = repair::remove_trailing_commas(span) else {
                    continue;
                };
                let Ok(value) = serde_json::from_str::<Value>(&fixed) else {
                    continue;
                };
                repairs.push(Repair::RemovedTrailingCommas);
                value
            }
        };
        candidates.push(Decoded {
            value,
            repairs,
            span_len: span.len(),
        });
    }
    if !candidates.is_empty() {
        return Ok(candidates);
    }

    let mut reason = last_error.unwrap_or_else(|| "output contains no JSON object".to_string());
    if truncated {
        reason.push_str(" (the provider stopped at its output limit)");
    }
    Err(ParseError::NoJson {
        reason,
        repairs: Vec::new(),
    })
}

/// Take the first candidate that validates. When none does, report the
/// failure of the longest one, which is the most likely intended answer.
fn first_valid<T>(
    candidates: Vec<Decoded>,
    contract: &OutputContract,
    repairs: &mut Vec<Repair>,
    mut accept: impl FnMut(&mut Value, &mut Vec<Repair>) -> Result<T, ParseError>,
) -> Result<T, ParseError> {
    let mut failure: Option<(usize, ParseError, Vec<Repair>)> = None;
    for Decoded {
        mut value,
        repairs: mut applied,
        span_len,
    } in candidates
    {
        match accept(&mut value, &mut applied) {
            Ok(parsed) => {
                let unknown = contract.unknown_fields(&value);
                if !unknown.is_empty() {
                    tracing::debug!(fields = ?unknown, "ignoring fields outside the output contract");
                }
                repairs.extend(applied);
                return Ok(parsed);
            }
            Err(err) => {
                if failure.as_ref().is_none_or(|(len, ..)| span_len > *len) {
                    failure = Some((span_len, err, applied));
                }
            }
        }
    }

    match failure {
        Some((_, err, applied)) => {
            repairs.extend(applied);
            Err(err)
        }
        None => Err(ParseError::NoJson {
            reason: "output contains no JSON object".to_string(),
            repairs: Vec::new(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Structural repairs
// ---------------------------------------------------------------------------

/// Validate; on failure repair the candidate in place and validate again.
///
/// `project_path` is the path pattern of optional projects (`{}` stands for
/// the module index).
fn validate_with_repairs<T>(
    candidate: &mut Value,
    repairs: &mut Vec<Repair>,
    contract: &'static OutputContract,
    synthesize: impl Fn(&mut Value) -> Vec<String>,
    project_path: &str,
    validate: impl Fn(&Value) -> Result<T, ValidationError>,
) -> Result<T, ParseError> {
    if let Ok(value) = validate(candidate) {
        return Ok(value);
    }

    let coerced = contract.coerce_numbers(candidate);
    if !coerced.is_empty() {
        repairs.push(Repair::CoercedNumbers(coerced));
    }
    let filled = synthesize(candidate);
    if !filled.is_empty() {
        repairs.push(Repair::SynthesizedFields(filled));
    }

    let err = match validate(candidate) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let dropped = drop_invalid_projects(candidate, &err, project_path);
    if dropped.is_empty() {
        return Err(invalid(contract.name, err, repairs));
    }
    repairs.extend(dropped.into_iter().map(Repair::DroppedInvalidProject));
    validate(candidate).map_err(|err| invalid(contract.name, err, repairs))
}

fn invalid(contract: &'static str, source: ValidationError, repairs: &[Repair]) -> ParseError {
    ParseError::Invalid {
        contract,
        source,
        repairs: repairs.to_vec(),
    }
}

/// Fill roadmap-level and resource-level fields that can be derived.
fn synthesize_roadmap_fields(candidate: &mut Value, defaults: &RoadmapDefaults) -> Vec<String> {
    let Value::Object(root) = candidate else {
        return Vec::new();
    };
    let mut filled = Vec::new();

    if !matches!(root.get("user_id"), Some(Value::String(_))) {
        root.insert("user_id".to_string(), Value::from(defaults.user_id.clone()));
        filled.push("user_id".to_string());
    }
    for (key, default) in [("title", &defaults.title), ("career_goal", &defaults.career_goal)] {
        if is_blank(root.get(key)) && !default.trim().is_empty() {
            root.insert(key.to_string(), Value::from(default.clone()));
            filled.push(key.to_string());
        }
    }
    if is_blank(root.get("estimated_weeks")) {
        if let Some(hours) = total_module_hours(root) {
            let weeks = weeks_for_hours(hours, defaults.hours_per_week).min(MAX_ESTIMATED_WEEKS);
            root.insert("estimated_weeks".to_string(), Value::from(weeks));
            filled.push("estimated_weeks".to_string());
        }
    }

    if let Some(Value::Array(modules)) = root.get_mut("modules") {
        for (i, module) in modules.iter_mut().enumerate() {
            filled.extend(synthesize_module_fields(
                module,
                &format!("modules[{i}]"),
                defaults.difficulty,
            ));
        }
    }
    filled
}

/// Fill missing resource difficulties.
fn synthesize_module_fields(
    module: &mut Value,
    prefix: &str,
    difficulty: ExperienceLevel,
) -> Vec<String> {
    let mut filled = Vec::new();
    let Some(Value::Array(resources)) = module.get_mut("resources") else {
        return filled;
    };
    for (j, resource) in resources.iter_mut().enumerate() {
        let Value::Object(map) = resource else { continue };
        if is_blank(map.get("difficulty")) {
            map.insert("difficulty".to_string(), Value::from(difficulty.to_string()));
            let path = format!("resources[{j}].difficulty");
            filled.push(if prefix.is_empty() {
                path
            } else {
                format!("{prefix}.{path}")
            });
        }
    }
    filled
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Sum of module hours, when every module states a positive integer.
fn total_module_hours(root: &Map<String, Value>) -> Option<u32> {
    let Some(Value::Array(modules)) = root.get("modules") else {
        return None;
    };
    if modules.is_empty() {
        return None;
    }
    modules.iter().try_fold(0u32, |total, module| {
        let hours = module.get("estimated_hours")?.as_u64()?;
        let hours = u32::try_from(hours).ok().filter(|h| *h > 0)?;
        total.checked_add(hours)
    })
}

/// Remove optional projects that carry validation issues.
///
/// Returns the paths of the removed projects.
fn drop_invalid_projects(candidate: &mut Value, err: &ValidationError, pattern: &str) -> Vec<String> {
    let mut dropped = Vec::new();
    if pattern.contains("{}") {
        let Some(Value::Array(modules)) = candidate.get_mut("modules") else {
            return dropped;
        };
        for (i, module) in modules.iter_mut().enumerate() {
            let path = pattern.replace("{}", &i.to_string());
            if err.issues.iter().any(|issue| is_within(&issue.path, &path)) {
                if let Value::Object(map) = module {
                    map.remove("project");
                    dropped.push(path);
                }
            }
        }
    } else if err.issues.iter().any(|issue| is_within(&issue.path, pattern)) {
        if let Value::Object(map) = candidate {
            map.remove("project");
            dropped.push(pattern.to_string());
        }
    }
    dropped
}
