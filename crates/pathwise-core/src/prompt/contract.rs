//! Output contracts: the single field table describing what a provider must
//! return.
//!
//! The prompt builder renders a contract into an annotated template, and the
//! parser walks the same table to coerce numeric fields and to spot field
//! names the contract does not know. Keeping one table means the prompt and
//! the parser cannot drift apart.

use serde_json::Value;

use crate::schema::{ExperienceLevel, ResourceType};

/// Wire type of one contract field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    String,
    /// Positive integer.
    Integer,
    StringList,
    /// One of the listed strings, exactly.
    Enum(&'static [&'static str]),
    Object(&'static [FieldSpec]),
    ObjectList(&'static [FieldSpec]),
}

/// One field of a contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub description: &'static str,
}

const fn field(
    name: &'static str,
    ty: FieldType,
    required: bool,
    description: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required,
        description,
    }
}

const RESOURCE_FIELDS: &[FieldSpec] = &[
    field("title", FieldType::String, true, "Resource title"),
    field("type", FieldType::Enum(ResourceType::VALUES), true, "Kind of resource"),
    field("url", FieldType::String, true, "Link to the resource"),
    field("duration", FieldType::String, false, "Free text, e.g. \"3 hours\""),
    field(
        "difficulty",
        FieldType::Enum(ExperienceLevel::VALUES),
        true,
        "Level the resource targets",
    ),
    field(
        "why_recommended",
        FieldType::String,
        false,
        "One sentence on why this resource fits the learner",
    ),
];

const PROJECT_FIELDS: &[FieldSpec] = &[
    field("title", FieldType::String, true, "Project title"),
    field("description", FieldType::String, true, "What to build"),
    field("deliverables", FieldType::StringList, true, "Concrete outputs, in order"),
    field("estimated_hours", FieldType::Integer, true, "Hours to complete the project"),
];

const MODULE_FIELDS: &[FieldSpec] = &[
    field("id", FieldType::String, false, "Unique within the roadmap, e.g. \"module-1\""),
    field("title", FieldType::String, true, "Module title"),
    field("description", FieldType::String, true, "What the module covers"),
    field("estimated_hours", FieldType::Integer, true, "Study hours for the module"),
    field("skills_taught", FieldType::StringList, true, "Skill names, no duplicates"),
    field("learning_objectives", FieldType::StringList, false, "What the learner can do afterwards"),
    field("prerequisites", FieldType::StringList, false, "Ids of modules to finish first"),
    field("assessment", FieldType::String, false, "How progress is checked"),
    field(
        "resources",
        FieldType::ObjectList(RESOURCE_FIELDS),
        true,
        "At least one learning resource",
    ),
    field("project", FieldType::Object(PROJECT_FIELDS), false, "Optional hands-on project"),
];

const ROADMAP_FIELDS: &[FieldSpec] = &[
    field("id", FieldType::String, false, "Leave out; assigned by the service"),
    field("user_id", FieldType::String, false, "Leave out; copied from the request"),
    field("title", FieldType::String, true, "Roadmap title"),
    field("career_goal", FieldType::String, true, "The learner's goal, restated"),
    field(
        "estimated_weeks",
        FieldType::Integer,
        true,
        "Total duration in weeks at the weekly study hours given in the context",
    ),
    field(
        "difficulty_progression",
        FieldType::String,
        false,
        "e.g. \"beginner -> intermediate -> advanced\"",
    ),
    field(
        "modules",
        FieldType::ObjectList(MODULE_FIELDS),
        true,
        "Ordered by learning sequence, at least one",
    ),
];

/// A named, self-describing output schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputContract {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// A complete roadmap.
pub const ROADMAP_CONTRACT: OutputContract = OutputContract {
    name: "roadmap",
    fields: ROADMAP_FIELDS,
};

/// A single module (patch contract).
pub const MODULE_CONTRACT: OutputContract = OutputContract {
    name: "module",
    fields: MODULE_FIELDS,
};

impl OutputContract {
    /// Render the contract as an annotated JSON template.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);
        out.push_str(&format!(
            "Return exactly one JSON object (a {}) with these fields. \
             Fields marked optional may be omitted; do not add other fields.\n\n",
            self.name
        ));
        render_fields(&mut out, self.fields, 0);
        out
    }

    /// Every field path the contract knows, e.g. `modules[].resources[].type`.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_paths(&mut paths, self.fields, "");
        paths
    }

    /// Replace numeric strings with numbers on integer fields.
    ///
    /// Returns the concrete paths that were changed.
    pub fn coerce_numbers(&self, value: &mut Value) -> Vec<String> {
        let mut changed = Vec::new();
        coerce_object(value, self.fields, "", &mut changed);
        changed
    }

    /// Concrete paths of object keys the contract does not declare.
    pub fn unknown_fields(&self, value: &Value) -> Vec<String> {
        let mut unknown = Vec::new();
        collect_unknown(value, self.fields, "", &mut unknown);
        unknown
    }
}

fn type_label(ty: &FieldType) -> String {
    match ty {
        FieldType::String => "string".to_string(),
        FieldType::Integer => "positive integer".to_string(),
        FieldType::StringList => "array of strings".to_string(),
        FieldType::Enum(values) => format!("one of {}", values.join(" | ")),
        FieldType::Object(_) => "object".to_string(),
        FieldType::ObjectList(_) => "array of objects".to_string(),
    }
}

fn render_fields(out: &mut String, fields: &[FieldSpec], depth: usize) {
    let indent = "  ".repeat(depth);
    for spec in fields {
        let presence = if spec.required { "required" } else { "optional" };
        out.push_str(&format!(
            "{indent}\"{}\": <{}> // {presence}. {}\n",
            spec.name,
            type_label(&spec.ty),
            spec.description
        ));
        match spec.ty {
            FieldType::Object(children) | FieldType::ObjectList(children) => {
                render_fields(out, children, depth + 1);
            }
            _ => {}
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn collect_paths(paths: &mut Vec<String>, fields: &[FieldSpec], prefix: &str) {
    for spec in fields {
        let path = join(prefix, spec.name);
        match spec.ty {
            FieldType::Object(children) => {
                paths.push(path.clone());
                collect_paths(paths, children, &path);
            }
            FieldType::ObjectList(children) => {
                let path = format!("{path}[]");
                paths.push(path.clone());
                collect_paths(paths, children, &path);
            }
            _ => paths.push(path),
        }
    }
}

/// Visit each object in `value` that `fields` describes, with its path.
fn for_each_child<'v>(
    value: &'v Value,
    spec: &FieldSpec,
    path: &str,
    mut visit: impl FnMut(&'v Value, &'static [FieldSpec], String),
) {
    match (spec.ty, value) {
        (FieldType::Object(children), Value::Object(_)) => visit(value, children, path.to_string()),
        (FieldType::ObjectList(children), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                visit(item, children, format!("{path}[{i}]"));
            }
        }
        _ => {}
    }
}

fn coerce_object(value: &mut Value, fields: &[FieldSpec], prefix: &str, changed: &mut Vec<String>) {
    let Value::Object(map) = value else { return };
    for spec in fields {
        let Some(slot) = map.get_mut(spec.name) else { continue };
        let path = join(prefix, spec.name);
        match spec.ty {
            FieldType::Integer => {
                if let Some(number) = slot.as_str().and_then(numeric_string) {
                    *slot = Value::from(number);
                    changed.push(path);
                }
            }
            FieldType::Object(children) => coerce_object(slot, children, &path, changed),
            FieldType::ObjectList(children) => {
                if let Value::Array(items) = slot {
                    for (i, item) in items.iter_mut().enumerate() {
                        coerce_object(item, children, &format!("{path}[{i}]"), changed);
                    }
                }
            }
            _ => {}
        }
    }
}

/// `"12"`, `" 12 "` and `"12.0"` become 12; anything else is left alone.
fn numeric_string(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    match s.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < 1e12 => Some(f as i64),
        _ => None,
    }
}

fn collect_unknown(value: &Value, fields: &[FieldSpec], prefix: &str, unknown: &mut Vec<String>) {
    let Value::Object(map) = value else { return };
    for key in map.keys() {
        if !fields.iter().any(|spec| spec.name == key) {
            unknown.push(join(prefix, key));
        }
    }
    for spec in fields {
        if let Some(child) = map.get(spec.name) {
            let path = join(prefix, spec.name);
            for_each_child(child, spec, &path, |item, children, item_path| {
                collect_unknown(item, children, &item_path, unknown);
            });
        }
    }
}
