//! Provider factory -- a registry of adapter constructors, keyed by name.
//!
//! The factory constructs the single active adapter from [`CoreConfig`] at
//! startup. It caches nothing: every `create_provider` call builds a new
//! adapter.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::google::GoogleProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::trait_def::RoadmapProvider;
use super::{google, ollama, openai};
use crate::config::{ConfigError, CoreConfig, ProviderSettings};

/// Builds an adapter from its settings.
pub type ProviderConstructor =
    Arc<dyn Fn(&ProviderSettings) -> Result<Arc<dyn RoadmapProvider>, ConfigError> + Send + Sync>;

/// Name -> constructor registry.
///
/// # Example
///
/// ```ignore
/// let factory = ProviderFactory::with_builtin();
/// let provider = factory.create_provider("openai", &config)?;
/// ```
#[derive(Default, Clone)]
pub struct ProviderFactory {
    constructors: BTreeMap<String, ProviderConstructor>,
}

/// Registry keys are trimmed and lower-cased.
fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl ProviderFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the `openai`, `google` and `ollama` adapters registered.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register(openai::NAME, |settings| {
            Ok(Arc::new(OpenAiProvider::from_settings(settings)?) as Arc<dyn RoadmapProvider>)
        });
        factory.register(google::NAME, |settings| {
            Ok(Arc::new(GoogleProvider::from_settings(settings)?) as Arc<dyn RoadmapProvider>)
        });
        factory.register(ollama::NAME, |settings| {
            Ok(Arc::new(OllamaProvider::from_settings(settings)?) as Arc<dyn RoadmapProvider>)
        });
        factory
    }

    /// Register a constructor. Replaces any constructor with the same name.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&ProviderSettings) -> Result<Arc<dyn RoadmapProvider>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(normalize(name), Arc::new(constructor));
    }

    /// Names of every registered adapter.
    pub fn list_available(&self) -> BTreeSet<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&normalize(name))
    }

    /// Build the adapter registered under `name` with its settings from
    /// `config`.
    pub fn create_provider(
        &self,
        name: &str,
        config: &CoreConfig,
    ) -> Result<Arc<dyn RoadmapProvider>, ConfigError> {
        let key = normalize(name);
        let Some(constructor) = self.constructors.get(&key) else {
            return Err(ConfigError::UnknownProvider {
                name: name.to_string(),
                available: self
                    .list_available()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };

        let settings = config.settings_for(&key);
        let provider = constructor(&settings)?;
        tracing::info!(provider = %key, model = %provider.model(), "provider initialised");
        Ok(provider)
    }

    /// Build the adapter named by `config.active_provider`.
    pub fn create_active(&self, config: &CoreConfig) -> Result<Arc<dyn RoadmapProvider>, ConfigError> {
        self.create_provider(&config.active_provider, config)
    }
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("providers", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ApiKey;
    use crate::prompt::PromptPayload;
    use crate::provider::{ModelInfo, ProviderError, RawOutput};

    struct FakeProvider {
        model: String,
    }

    #[async_trait]
    impl RoadmapProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                provider: "fake".to_string(),
                model: self.model.clone(),
                max_output_tokens: 1,
                temperature: 0.0,
                capabilities: vec![],
            }
        }

        async fn generate(
            &self,
            _prompt: &PromptPayload,
            _timeout: Duration,
        ) -> Result<RawOutput, ProviderError> {
            Ok(RawOutput::text(&self.model, "{}"))
        }
    }

    #[test]
    fn builtin_names() {
        let factory = ProviderFactory::with_builtin();
        let names: Vec<String> = factory.list_available().into_iter().collect();
        assert_eq!(names, vec!["google", "ollama", "openai"]);
        assert!(factory.contains(" OpenAI "));
    }

    #[test]
    fn unknown_provider_lists_available() {
        let factory = ProviderFactory::with_builtin();
        let err = factory
            .create_provider("anthropic", &CoreConfig::default())
            .err()
            .expect("expected an error");
        match err {
            ConfigError::UnknownProvider { name, available } => {
                assert_eq!(name, "anthropic");
                assert_eq!(available, "google, ollama, openai");
            }
            other => panic!("expected UnknownProvider, got: {other}"),
        }
    }

    #[test]
    fn missing_credential_is_misconfigured() {
        let factory = ProviderFactory::with_builtin();
        let err = factory
            .create_active(&CoreConfig::default())
            .err()
            .expect("expected an error");
        assert!(
            matches!(err, ConfigError::MisconfiguredProvider { ref provider, .. } if provider == "google"),
            "expected MisconfiguredProvider, got: {err}"
        );
    }

    #[test]
    fn names_are_case_insensitive() {
        let factory = ProviderFactory::with_builtin();
        let mut config = CoreConfig::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderSettings {
                api_key: Some(ApiKey::new("sk-test")),
                ..ProviderSettings::defaults_for("openai")
            },
        );
        let provider = factory.create_provider("  OpenAI", &config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-3.5-turbo");
    }

    #[test]
    fn registered_constructor_receives_settings() {
        let mut factory = ProviderFactory::new();
        factory.register("Fake", |settings| {
            Ok(Arc::new(FakeProvider {
                model: settings.model.clone(),
            }) as Arc<dyn RoadmapProvider>)
        });
        let config = CoreConfig::default().with_provider(
            "fake",
            ProviderSettings {
                model: "fake-large".to_string(),
                ..ProviderSettings::defaults_for("fake")
            },
        );
        let provider = factory.create_provider("fake", &config).unwrap();
        assert_eq!(provider.model(), "fake-large");
        assert_eq!(format!("{factory:?}"), "ProviderFactory { providers: [\"fake\"] }");
    }
}
