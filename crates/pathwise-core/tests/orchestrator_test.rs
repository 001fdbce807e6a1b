//! End-to-end tests for the roadmap orchestrator against scripted providers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use pathwise_core::error::{Advice, ErrorKind};
use pathwise_core::orchestrator::{OrchestratorConfig, RoadmapOrchestrator};
use pathwise_core::prompt::PromptKind;
use pathwise_core::provider::{ProviderError, RawOutput};
use pathwise_core::schema::{GenerationRequest, UpdateType, validate_roadmap};
use pathwise_test_utils::{
    CountingStore, FailingStore, ScriptedProvider, generation_request, roadmap_json, roadmap_text,
    stored_roadmap, update_request,
};

// ===========================================================================
// Helpers
// ===========================================================================

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        call_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(provider: &Arc<ScriptedProvider>) -> RoadmapOrchestrator {
    RoadmapOrchestrator::new(provider.clone(), config())
}

// ===========================================================================
// Generation
// ===========================================================================

#[tokio::test]
async fn learn_python_generates_a_valid_roadmap() {
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(3)));
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let roadmap = result.roadmap.clone().unwrap();
    assert!(roadmap.id.starts_with("roadmap-"));
    assert_eq!(roadmap.user_id, "user-1");
    assert_eq!(roadmap.modules.len(), 3);
    assert!(roadmap.modules.iter().all(|m| !m.resources.is_empty()));

    let metadata = &result.metadata;
    assert_eq!(metadata.update_type, UpdateType::Creation);
    assert_eq!(metadata.ai_provider, "scripted");
    assert_eq!(metadata.ai_model, "scripted-1");
    assert_eq!(metadata.modules_count, Some(3));
    assert_eq!(metadata.total_estimated_hours, Some(30));
    assert_eq!(metadata.attempts, 1);

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].kind, PromptKind::Generation);
    assert_eq!(prompts[0].context["goal"], "Learn Python");
    assert_eq!(prompts[0].context["hours_per_week"], 10);
}

#[tokio::test]
async fn learn_python_without_skills_yields_one_module() {
    let request: GenerationRequest = serde_json::from_value(json!({
        "user_goal": "Learn Python",
        "user_skills": [],
        "experience_level": "beginner",
        "preferences": {}
    }))
    .unwrap();
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(1)));
    let result = orchestrator(&provider)
        .generate(&request, &CancellationToken::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(result.metadata.update_type, UpdateType::Creation);
    let roadmap = result.roadmap.unwrap();
    assert_eq!(roadmap.modules.len(), 1);
    assert_eq!(roadmap.career_goal, "Learn Python");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn fenced_output_with_trailing_commas_is_repaired() {
    let body = r#"Here is your roadmap:

```json
{
  "title": "Python",
  "career_goal": "Learn Python",
  "estimated_weeks": "2",
  "modules": [
    {
      "id": "basics",
      "title": "Basics",
      "description": "Syntax and types",
      "estimated_hours": "15",
      "skills_taught": ["python",],
      "resources": [
        {"title": "Tutorial", "type": "documentation", "url": "https://docs.python.org/3/tutorial/", "difficulty": "beginner",},
      ],
    },
  ],
}
```

Good luck!"#;
    let provider = Arc::new(ScriptedProvider::new().then_text(body));
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let roadmap = result.roadmap.unwrap();
    assert_eq!(roadmap.estimated_weeks, 2);
    assert_eq!(roadmap.modules[0].estimated_hours, 15);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn structured_output_is_used_as_is() {
    let provider = Arc::new(ScriptedProvider::new().then_structured(roadmap_json(2)));
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.metadata.modules_count, Some(2));
}

#[tokio::test]
async fn unusable_output_triggers_exactly_one_reformat() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_text("Python is a great first language. Start with the basics!")
            .then_text(roadmap_text(1)),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.metadata.attempts, 2);
    assert_eq!(
        provider.prompt_kinds(),
        vec![PromptKind::Generation, PromptKind::Reformat]
    );
    let reformat = &provider.prompts()[1];
    assert_eq!(
        reformat.context["previous_output"],
        "Python is a great first language. Start with the basics!"
    );
    assert!(!reformat.context["problems"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn second_unusable_output_fails_with_parse_error() {
    let mut invalid = roadmap_json(1);
    invalid["modules"][0]["resources"] = json!([]);
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_text(invalid.to_string())
            .then_text(invalid.to_string()),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.roadmap.is_none());
    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::Parse);
    assert_eq!(report.advice, Advice::Retry);
    assert!(
        report.diagnostics.iter().any(|d| d.contains("modules[0].resources")),
        "diagnostics: {:?}",
        report.diagnostics
    );
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn empty_goal_is_rejected_before_any_call() {
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(1)));
    let result = orchestrator(&provider)
        .generate(&generation_request("   "), &CancellationToken::new())
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::Validation);
    assert_eq!(report.advice, Advice::Rephrase);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn concurrent_requests_share_one_orchestrator() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_text(roadmap_text(1))
            .then_text(roadmap_text(2)),
    );
    let orchestrator = orchestrator(&provider);
    let cancel = CancellationToken::new();
    let first = generation_request("Learn Python");
    let second = generation_request("Learn Rust");

    let (a, b) = futures::join!(
        orchestrator.generate(&first, &cancel),
        orchestrator.generate(&second, &cancel)
    );
    let (a, b) = (a.roadmap.unwrap(), b.roadmap.unwrap());
    assert_ne!(a.id, b.id);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn successful_roadmap_round_trips_through_validation() {
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(2)));
    let roadmap = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await
        .into_result()
        .unwrap();

    let value = serde_json::to_value(&roadmap).unwrap();
    assert_eq!(validate_roadmap(&value).unwrap(), roadmap);
}

// ===========================================================================
// Retries and timeouts
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn rate_limits_stop_at_the_attempt_ceiling() {
    let rate_limited = || ProviderError::RateLimited { retry_after: None };
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(rate_limited())
            .then_error(rate_limited())
            .then_error(rate_limited())
            .then_text(roadmap_text(1)),
    );
    let started = tokio::time::Instant::now();
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::RateLimited);
    assert_eq!(report.advice, Advice::Wait);
    assert!(report.retryable);
    assert_eq!(result.metadata.attempts, 3);
    assert_eq!(provider.calls(), 3);

    // Two backoffs, each at most base * 2^(n-1) plus a quarter of jitter.
    let policy = config().retry;
    let budget: Duration = (1..policy.max_attempts)
        .map(|attempt| policy.backoff(attempt).mul_f64(1.25))
        .sum();
    let elapsed = started.elapsed();
    assert!(
        elapsed <= budget + Duration::from_millis(50),
        "retries took {elapsed:?}, budget {budget:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_retry_counts_against_the_attempt_ceiling() {
    let rate_limited = || ProviderError::RateLimited { retry_after: None };
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(rate_limited())
            .then_error(rate_limited())
            .then_after(Duration::from_secs(60), Ok(RawOutput::text("slow", roadmap_text(1))))
            .then_text(roadmap_text(1)),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::Timeout);
    assert_eq!(result.metadata.attempts, 3);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn single_attempt_policy_does_not_retry_timeouts() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_after(Duration::from_secs(60), Ok(RawOutput::text("slow", roadmap_text(1))))
            .then_text(roadmap_text(1)),
    );
    let mut config = config();
    config.retry.max_attempts = 1;
    let result = RoadmapOrchestrator::new(provider.clone(), config)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    assert_eq!(result.error.unwrap().kind, ErrorKind::Timeout);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_retry() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(ProviderError::Unavailable {
                message: "502 from upstream".to_string(),
            })
            .then_error(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            })
            .then_text(roadmap_text(1)),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.metadata.attempts, 3);
}

#[tokio::test]
async fn authentication_failure_is_not_retried() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(ProviderError::Authentication {
                message: "invalid API key".to_string(),
            })
            .then_text(roadmap_text(1)),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::Authentication);
    assert_eq!(report.advice, Advice::Fatal);
    assert!(!report.retryable);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_retried_once() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_after(Duration::from_secs(60), Ok(RawOutput::text("slow", roadmap_text(1))))
            .then_text(roadmap_text(1)),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.metadata.attempts, 2);
    assert_eq!(result.metadata.ai_model, "scripted-1");
}

#[tokio::test(start_paused = true)]
async fn second_timeout_is_reported() {
    let slow = || Ok(RawOutput::text("slow", roadmap_text(1)));
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_after(Duration::from_secs(60), slow())
            .then_after(Duration::from_secs(60), slow())
            .then_text(roadmap_text(1)),
    );
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::Timeout);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn rejected_prompt_is_fatal() {
    let provider = Arc::new(ScriptedProvider::new().then_error(ProviderError::Rejected {
        message: "blocked by safety filter".to_string(),
    }));
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;
    assert_eq!(result.error.unwrap().kind, ErrorKind::Rejected);
}

#[tokio::test]
async fn malformed_envelope_without_body_is_terminal() {
    let provider = Arc::new(ScriptedProvider::new().then_error(
        ProviderError::MalformedUpstreamResponse {
            message: "unexpected content type".to_string(),
            raw: None,
        },
    ));
    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &CancellationToken::new())
        .await;
    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::MalformedResponse);
    assert_eq!(provider.calls(), 1);
}

// ===========================================================================
// Cancellation
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_an_in_flight_call() {
    let provider = Arc::new(ScriptedProvider::new().then_after(
        Duration::from_secs(3),
        Ok(RawOutput::text("slow", roadmap_text(1))),
    ));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &cancel)
        .await;
    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::Cancelled);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retries() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(5)),
            })
            .then_text(roadmap_text(1)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let result = orchestrator(&provider)
        .generate(&generation_request("Learn Python"), &cancel)
        .await;
    assert_eq!(result.error.unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(provider.calls(), 1);
}

// ===========================================================================
// Updates
// ===========================================================================

#[tokio::test]
async fn update_keeps_identity_and_reports_module_changes() {
    let existing = stored_roadmap("roadmap-42", 3);
    let created_at = existing.created_at;
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(4)));

    let request = update_request("roadmap-42", "Add a module on testing", Some(existing));
    let result = orchestrator(&provider)
        .update(&request, &CancellationToken::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let roadmap = result.roadmap.clone().unwrap();
    assert_eq!(roadmap.id, "roadmap-42");
    assert_eq!(roadmap.user_id, "user-1");
    assert_eq!(roadmap.created_at, created_at);
    assert!(roadmap.updated_at.is_some());

    let metadata = &result.metadata;
    assert_eq!(metadata.update_type, UpdateType::Modification);
    assert_eq!(
        metadata.modification_prompt.as_deref(),
        Some("Add a module on testing")
    );
    let changes = metadata.module_changes.as_ref().unwrap();
    assert_eq!(changes.added, vec!["module-4"]);
    assert_eq!(changes.unchanged, vec!["module-1", "module-2", "module-3"]);
    assert!(changes.removed.is_empty());
    assert!(changes.changed.is_empty());

    let prompt = &provider.prompts()[0];
    assert_eq!(prompt.kind, PromptKind::Update);
    assert_eq!(prompt.context["roadmap_id"], "roadmap-42");
    assert_eq!(prompt.context["module_summary"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn update_touching_one_module_leaves_the_rest_equal() {
    let existing = stored_roadmap("roadmap-9", 3);
    let mut revised = roadmap_json(3);
    revised["modules"][1]["estimated_hours"] = json!(20);
    let provider = Arc::new(ScriptedProvider::new().then_structured(revised));

    let request = update_request("roadmap-9", "Spend more time on part 2", Some(existing.clone()));
    let result = orchestrator(&provider)
        .update(&request, &CancellationToken::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let roadmap = result.roadmap.clone().unwrap();
    assert_eq!(roadmap.modules.len(), 3);
    assert_eq!(roadmap.modules[0], existing.modules[0]);
    assert_eq!(roadmap.modules[2], existing.modules[2]);
    assert_eq!(roadmap.modules[1].estimated_hours, 20);

    let changes = result.metadata.module_changes.unwrap();
    assert_eq!(changes.changed, vec!["module-2"]);
    assert_eq!(changes.unchanged, vec!["module-1", "module-3"]);
}

#[tokio::test]
async fn update_fetches_missing_roadmap_from_store() {
    let store = Arc::new(CountingStore::new([stored_roadmap("roadmap-7", 2)]));
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(2)));
    let orchestrator = orchestrator(&provider).with_store(store.clone());

    let result = orchestrator
        .update(
            &update_request("roadmap-7", "Make it shorter", None),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.roadmap.unwrap().id, "roadmap-7");
    assert_eq!(store.fetches(), 1);
    assert!(result.metadata.module_changes.unwrap().is_noop());
}

#[tokio::test]
async fn unknown_roadmap_is_not_found_without_provider_call() {
    let store = Arc::new(CountingStore::new([]));
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(1)));
    let orchestrator = orchestrator(&provider).with_store(store.clone());

    let result = orchestrator
        .update(
            &update_request("roadmap-missing", "Add SQL", None),
            &CancellationToken::new(),
        )
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::NotFound);
    assert_eq!(report.advice, Advice::Fatal);
    assert!(report.message.contains("roadmap-missing"));
    assert_eq!(store.fetches(), 1);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn store_outage_is_reported_as_store_unavailable() {
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(1)));
    let orchestrator = orchestrator(&provider).with_store(Arc::new(FailingStore));

    let result = orchestrator
        .update(
            &update_request("roadmap-1", "Add SQL", None),
            &CancellationToken::new(),
        )
        .await;

    let report = result.error.unwrap();
    assert_eq!(report.kind, ErrorKind::StoreUnavailable);
    assert!(report.message.contains("connection refused"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn blank_instruction_is_a_validation_error() {
    let provider = Arc::new(ScriptedProvider::new().then_text(roadmap_text(1)));
    let request = update_request("roadmap-1", "  ", Some(stored_roadmap("roadmap-1", 1)));
    let result = orchestrator(&provider)
        .update(&request, &CancellationToken::new())
        .await;
    assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
    assert_eq!(provider.calls(), 0);
}
