//! Module-level comparison of two roadmaps.

use serde::Serialize;

use super::Module;

/// Module ids grouped by how they changed between two roadmap versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ModuleChanges {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare modules by id. Content equality decides changed vs unchanged.
///
/// Ids keep the order they have in `after` (added, changed, unchanged) or
/// `before` (removed).
pub fn diff_modules(before: &[Module], after: &[Module]) -> ModuleChanges {
    let mut changes = ModuleChanges::default();

    for module in after {
        match before.iter().find(|m| m.id == module.id) {
            None => changes.added.push(module.id.clone()),
            Some(previous) if previous == module => changes.unchanged.push(module.id.clone()),
            Some(_) => changes.changed.push(module.id.clone()),
        }
    }
    for module in before {
        if !after.iter().any(|m| m.id == module.id) {
            changes.removed.push(module.id.clone());
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExperienceLevel, Resource, ResourceType};

    fn module(id: &str, hours: u32) -> Module {
        Module {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: "d".to_string(),
            estimated_hours: hours,
            skills_taught: vec![],
            learning_objectives: vec![],
            prerequisites: vec![],
            assessment: None,
            resources: vec![Resource {
                title: "r".to_string(),
                resource_type: ResourceType::Video,
                url: "https://example.com".to_string(),
                duration: None,
                difficulty: ExperienceLevel::Intermediate,
                why_recommended: None,
            }],
            project: None,
        }
    }

    #[test]
    fn classifies_every_id() {
        let before = vec![module("a", 10), module("b", 10), module("c", 10)];
        let after = vec![module("a", 10), module("b", 15), module("d", 5)];
        let changes = diff_modules(&before, &after);
        assert_eq!(changes.added, vec!["d"]);
        assert_eq!(changes.removed, vec!["c"]);
        assert_eq!(changes.changed, vec!["b"]);
        assert_eq!(changes.unchanged, vec!["a"]);
        assert!(!changes.is_noop());
    }

    #[test]
    fn identical_lists_are_noop() {
        let modules = vec![module("a", 1), module("b", 2)];
        let changes = diff_modules(&modules, &modules);
        assert!(changes.is_noop());
        assert_eq!(changes.unchanged, vec!["a", "b"]);
    }
}
