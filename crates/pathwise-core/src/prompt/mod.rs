//! Prompt construction.
//!
//! Turns generation, update and reformat requests into a provider-neutral
//! [`PromptPayload`]: system framing, the structured facts as JSON, and the
//! rendered output contract. Pure logic, no I/O.

pub mod contract;

use serde::Serialize;
use serde_json::{Value, json};

use crate::schema::{GenerationRequest, Roadmap, SkillAssessment, UpdateRequest};

pub use contract::{FieldSpec, FieldType, MODULE_CONTRACT, OutputContract, ROADMAP_CONTRACT};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a payload asks the provider to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Generation,
    Update,
    Reformat,
}

/// Provider-neutral instruction payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub kind: PromptKind,
    /// System framing: role, rules, task.
    pub instructions: String,
    /// Rendered [`OutputContract`].
    pub expected_output_contract: String,
    /// Structured facts the provider works from.
    pub context: Value,
}

impl PromptPayload {
    /// System message for chat backends.
    pub fn system_text(&self) -> &str {
        &self.instructions
    }

    /// User message for chat backends: context, then the output contract.
    pub fn user_text(&self) -> String {
        let context = serde_json::to_string_pretty(&self.context)
            .unwrap_or_else(|_| self.context.to_string());
        let mut text = String::with_capacity(context.len() + self.expected_output_contract.len() + 128);
        text.push_str("## Context\n\n```json\n");
        text.push_str(&context);
        text.push_str("\n```\n\n## Output format\n\n");
        text.push_str(&self.expected_output_contract);
        text.push_str("\nRespond with the JSON object only, without commentary or code fences.\n");
        text
    }

    /// Single text prompt for text-only backends.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system_text(), self.user_text())
    }
}

// ---------------------------------------------------------------------------
// Skill gap analysis
// ---------------------------------------------------------------------------

/// Score at or above which a skill counts as a strength.
const STRENGTH_MIN_SCORE: u8 = 7;
/// Score at or below which a skill counts as a growth area.
const GROWTH_MAX_SCORE: u8 = 3;
const TOP_SKILLS: usize = 5;
const TOP_STRENGTHS: usize = 3;

/// Skills ordered for the prompt, plus strengths and growth areas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillGapAnalysis {
    pub top_skills: Vec<String>,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
}

/// Order skills by score (highest first, ties keep input order) and derive
/// strengths and growth areas.
pub fn analyze_skills(skills: &[SkillAssessment]) -> SkillGapAnalysis {
    let mut sorted: Vec<&SkillAssessment> = skills.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    SkillGapAnalysis {
        top_skills: sorted
            .iter()
            .take(TOP_SKILLS)
            .map(|s| format!("{} ({}/10, {})", s.skill, s.score, s.level))
            .collect(),
        strengths: sorted
            .iter()
            .filter(|s| s.score >= STRENGTH_MIN_SCORE)
            .take(TOP_STRENGTHS)
            .map(|s| s.skill.clone())
            .collect(),
        growth_areas: sorted
            .iter()
            .filter(|s| s.score <= GROWTH_MAX_SCORE)
            .map(|s| s.skill.clone())
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

const ROLE: &str = "You are an expert learning-path designer. You build structured, \
realistic study roadmaps made of ordered modules, each with concrete resources.";

const GENERATION_RULES: &str = r#"## Rules

1. Order modules by learning sequence; later modules may list earlier module ids in `prerequisites`.
2. Start at the learner's experience level and build on their strengths. Spend more time on growth areas.
3. Every module needs at least one resource with a real, stable URL (official documentation, well-known courses or books).
4. `estimated_hours` is the study time for the module. `estimated_weeks` must match the total hours at the weekly pace given in the context and may not exceed 104.
5. Use only the enum values listed in the output format, in lower case.
6. Respect the learner's preferences (learning style, time commitment) when choosing resources.
"#;

const UPDATE_RULES: &str = r#"## Rules

1. Apply only the changes the instruction implies. "Add more X" adds or extends modules about X; "reduce the timeline by N weeks" lowers hours and `estimated_weeks`.
2. Keep every module the instruction does not affect exactly as it is: same `id`, same content, same position.
3. New modules get new, unique ids. Never reuse the id of a removed module for different content.
4. Keep `estimated_weeks` consistent with the total module hours at the weekly pace given in the context.
5. Return the complete roadmap, not only the changed modules.
"#;

/// Build the prompt for a fresh roadmap.
pub fn build_generation_prompt(request: &GenerationRequest, hours_per_week: u32) -> PromptPayload {
    let mut instructions = String::with_capacity(2048);
    instructions.push_str(ROLE);
    instructions.push_str("\n\n## Task\n\n");
    instructions.push_str(
        "Design a personalized learning roadmap that takes the learner from their current \
         skills to the goal in the context.\n\n",
    );
    instructions.push_str(GENERATION_RULES);

    let mut skills: Vec<&SkillAssessment> = request.user_skills.iter().collect();
    skills.sort_by(|a, b| b.score.cmp(&a.score));

    let context = json!({
        "goal": request.user_goal,
        "experience_level": request.experience_level,
        "skills": skills,
        "skill_analysis": analyze_skills(&request.user_skills),
        "preferences": request.preferences,
        "hours_per_week": hours_per_week,
    });

    PromptPayload {
        kind: PromptKind::Generation,
        instructions,
        expected_output_contract: ROADMAP_CONTRACT.render(),
        context,
    }
}

/// Build the prompt revising `existing` according to `request.user_prompt`.
pub fn build_update_prompt(
    request: &UpdateRequest,
    existing: &Roadmap,
    hours_per_week: u32,
) -> PromptPayload {
    let mut instructions = String::with_capacity(2048);
    instructions.push_str(ROLE);
    instructions.push_str("\n\n## Task\n\n");
    instructions.push_str(
        "Revise the existing roadmap in the context according to the learner's \
         modification request. Preserve everything the request does not touch.\n\n",
    );
    instructions.push_str(UPDATE_RULES);

    let modules: Vec<Value> = existing
        .modules
        .iter()
        .map(|m| json!({ "id": m.id, "title": m.title, "estimated_hours": m.estimated_hours }))
        .collect();

    let context = json!({
        "roadmap_id": request.roadmap_id,
        "modification_request": request.user_prompt,
        "module_summary": modules,
        "current_roadmap": existing,
        "hours_per_week": hours_per_week,
    });

    PromptPayload {
        kind: PromptKind::Update,
        instructions,
        expected_output_contract: ROADMAP_CONTRACT.render(),
        context,
    }
}

/// Ask the provider to reformat (not regenerate) its previous output.
pub fn build_reformat_prompt(
    previous_output: &str,
    issues: &[String],
    contract: &OutputContract,
) -> PromptPayload {
    let mut instructions = String::with_capacity(1024);
    instructions.push_str(
        "Your previous answer could not be used because it does not match the required \
         JSON format.\n\n## Task\n\nReformat the previous output so that it matches the \
         output format exactly. Keep its content; do not write a new answer. Fix every \
         listed problem.\n",
    );

    PromptPayload {
        kind: PromptKind::Reformat,
        instructions,
        expected_output_contract: contract.render(),
        context: json!({
            "previous_output": previous_output,
            "problems": issues,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ExperienceLevel;

    fn skill(name: &str, score: u8) -> SkillAssessment {
        SkillAssessment {
            skill: name.to_string(),
            score,
            level: ExperienceLevel::Intermediate,
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            user_goal: "Become a data engineer".to_string(),
            user_skills: vec![skill("sql", 5), skill("python", 8), skill("spark", 2)],
            experience_level: ExperienceLevel::Intermediate,
            preferences: serde_json::from_value(json!({ "learning_style": "hands-on" }))
                .unwrap(),
            user_id: "u-1".to_string(),
        }
    }

    #[test]
    fn skill_analysis_orders_and_buckets() {
        let skills = vec![
            skill("a", 9),
            skill("b", 7),
            skill("c", 8),
            skill("d", 10),
            skill("e", 1),
            skill("f", 3),
        ];
        let analysis = analyze_skills(&skills);
        assert_eq!(analysis.top_skills.len(), 5);
        assert_eq!(analysis.top_skills[0], "d (10/10, intermediate)");
        assert_eq!(analysis.strengths, vec!["d", "a", "c"]);
        assert_eq!(analysis.growth_areas, vec!["f", "e"]);
    }

    #[test]
    fn empty_skills_yield_empty_analysis() {
        let analysis = analyze_skills(&[]);
        assert!(analysis.top_skills.is_empty());
        assert!(analysis.strengths.is_empty());
        assert!(analysis.growth_areas.is_empty());
    }

    #[test]
    fn generation_prompt_carries_facts_and_contract() {
        let prompt = build_generation_prompt(&request(), 10);
        assert_eq!(prompt.kind, PromptKind::Generation);
        assert_eq!(prompt.context["goal"], "Become a data engineer");
        assert_eq!(prompt.context["experience_level"], "intermediate");
        assert_eq!(prompt.context["skills"][0]["skill"], "python");
        assert_eq!(prompt.context["preferences"]["learning_style"], "hands-on");
        assert_eq!(prompt.context["hours_per_week"], 10);
        assert_eq!(prompt.context["skill_analysis"]["growth_areas"][0], "spark");
        assert!(prompt.expected_output_contract.contains("\"estimated_weeks\""));
    }

    #[test]
    fn rendered_prompt_contains_all_sections() {
        let prompt = build_generation_prompt(&request(), 10);
        let text = prompt.render();
        assert!(text.starts_with(ROLE));
        assert!(text.contains("## Rules"));
        assert!(text.contains("## Context"));
        assert!(text.contains("## Output format"));
        assert!(text.contains("Become a data engineer"));
        assert!(prompt.user_text().contains("```json"));
        assert!(!prompt.system_text().contains("## Context"));
    }

    #[test]
    fn reformat_prompt_lists_problems() {
        let issues = vec!["modules[0].resources: required field is missing (missing)".to_string()];
        let prompt = build_reformat_prompt("{\"title\": \"x\"}", &issues, &ROADMAP_CONTRACT);
        assert_eq!(prompt.kind, PromptKind::Reformat);
        assert!(prompt.instructions.contains("do not write a new answer"));
        assert_eq!(prompt.context["problems"][0], issues[0]);
        assert_eq!(prompt.context["previous_output"], "{\"title\": \"x\"}");
    }
}
