//! `pathwise providers` command: list adapters and whether they are usable.

use pathwise_core::config::CoreConfig;
use pathwise_core::provider::ProviderFactory;

/// One line per registered provider.
#[derive(Debug, PartialEq, Eq)]
pub struct ProviderStatus {
    pub name: String,
    pub active: bool,
    pub model: String,
    /// `None` when the adapter can be constructed.
    pub problem: Option<String>,
}

pub fn provider_statuses(factory: &ProviderFactory, config: &CoreConfig) -> Vec<ProviderStatus> {
    let active = config.active_provider.trim().to_lowercase();
    factory
        .list_available()
        .into_iter()
        .map(|name| {
            let model = config.settings_for(&name).model;
            let problem = factory.create_provider(&name, config).err().map(|e| e.to_string());
            ProviderStatus {
                active: name == active,
                name,
                model,
                problem,
            }
        })
        .collect()
}

/// Run the providers command.
pub fn run_providers(config: &CoreConfig) {
    let statuses = provider_statuses(&ProviderFactory::with_builtin(), config);
    println!("Providers:");
    for status in &statuses {
        let marker = if status.active { "*" } else { " " };
        let state = match &status.problem {
            None => "ready".to_string(),
            Some(problem) => format!("not ready: {problem}"),
        };
        println!("  {marker} {:<8} {:<20} {state}", status.name, status.model);
    }
    if !statuses.iter().any(|s| s.active) {
        println!();
        println!("Active provider {:?} is not registered.", config.active_provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwise_core::config::{ApiKey, ProviderSettings};

    #[test]
    fn reports_readiness_per_provider() {
        let mut openai = ProviderSettings::defaults_for("openai");
        openai.api_key = Some(ApiKey::new("sk-test"));
        let config = CoreConfig::default()
            .with_provider("openai", openai)
            .with_active("openai");

        let statuses = provider_statuses(&ProviderFactory::with_builtin(), &config);
        let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["google", "ollama", "openai"]);

        let google = &statuses[0];
        assert!(!google.active);
        assert!(google.problem.as_deref().unwrap().contains("GOOGLE_API_KEY"));

        let ollama = &statuses[1];
        assert_eq!(ollama.model, "llama2");
        assert!(ollama.problem.is_none());

        let openai = &statuses[2];
        assert!(openai.active);
        assert!(openai.problem.is_none());
    }
}
