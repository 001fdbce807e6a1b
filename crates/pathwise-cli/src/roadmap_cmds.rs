//! `pathwise generate`, `pathwise update` and `pathwise show`.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use pathwise_core::orchestrator::{GenerationResult, RoadmapOrchestrator};
use pathwise_core::provider::ProviderFactory;
use pathwise_core::schema::{GenerationRequest, Roadmap, UpdateRequest, validate_roadmap};
use pathwise_core::store::RoadmapStore;

use crate::config::PathwiseConfig;
use crate::store::JsonDirStore;

/// Run the generate command: read a request, print the result as JSON.
pub async fn run_generate(config: &PathwiseConfig, request_path: &Path, save: bool) -> Result<()> {
    let raw = read_input(request_path)?;
    let request: GenerationRequest = serde_json::from_str(&raw)
        .with_context(|| format!("invalid generation request in {}", request_path.display()))?;

    let store = JsonDirStore::new(&config.store_dir);
    let orchestrator = orchestrator(config, &store)?;
    let cancel = cancel_on_ctrl_c();

    let result = orchestrator.generate(&request, &cancel).await;
    finish(result, &store, save)
}

/// Run the update command. The roadmap comes from `--from` when given,
/// otherwise from the store.
pub async fn run_update(
    config: &PathwiseConfig,
    roadmap_id: &str,
    prompt: &str,
    from: Option<&Path>,
    save: bool,
) -> Result<()> {
    let existing = from.map(read_roadmap).transpose()?;
    let request = UpdateRequest {
        roadmap_id: roadmap_id.to_string(),
        user_prompt: prompt.to_string(),
        user_id: existing.as_ref().map(|r| r.user_id.clone()).unwrap_or_default(),
        existing_roadmap: existing,
    };

    let store = JsonDirStore::new(&config.store_dir);
    let orchestrator = orchestrator(config, &store)?;
    let cancel = cancel_on_ctrl_c();

    let result = orchestrator.update(&request, &cancel).await;
    finish(result, &store, save)
}

/// Run the show command: print a saved roadmap.
pub async fn run_show(config: &PathwiseConfig, roadmap_id: Option<&str>, json: bool) -> Result<()> {
    let store = JsonDirStore::new(&config.store_dir);

    let Some(roadmap_id) = roadmap_id else {
        let ids = store.list()?;
        if ids.is_empty() {
            println!("No saved roadmaps in {}", store.dir().display());
        }
        for id in ids {
            println!("{id}");
        }
        return Ok(());
    };

    let roadmap = store
        .fetch_roadmap(roadmap_id)
        .await
        .with_context(|| format!("cannot show roadmap {roadmap_id}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&roadmap)?);
    } else {
        print_summary(&roadmap, config.core.hours_per_week);
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

fn orchestrator(config: &PathwiseConfig, store: &JsonDirStore) -> Result<RoadmapOrchestrator> {
    let factory = ProviderFactory::with_builtin();
    let orchestrator = RoadmapOrchestrator::from_config(&factory, &config.core)
        .context("cannot start the roadmap orchestrator")?;
    Ok(orchestrator.with_store(Arc::new(store.clone())))
}

/// Print the result, save on success if asked, and turn failure into an
/// error for the exit code.
fn finish(result: GenerationResult, store: &JsonDirStore, save: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&result)?);

    match result.into_result() {
        Ok(roadmap) => {
            if save {
                let path = store.save(&roadmap)?;
                eprintln!("Saved roadmap {} to {}", roadmap.id, path.display());
            }
            Ok(())
        }
        Err(report) => bail!("{} (kind: {}, advice: {:?})", report.message, report.kind, report.advice),
    }
}

/// Read a file, or stdin when the path is `-`.
fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_roadmap(path: &Path) -> Result<Roadmap> {
    let raw = read_input(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))?;
    validate_roadmap(&value).with_context(|| format!("{} is not a valid roadmap", path.display()))
}

/// Token cancelled by the first Ctrl+C; a second one force-exits.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nCancelling request (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });
    cancel
}

fn print_summary(roadmap: &Roadmap, hours_per_week: u32) {
    let pacing = roadmap.pacing(hours_per_week);
    println!("Roadmap: {} ({})", roadmap.title, roadmap.id);
    println!("Goal: {}", roadmap.career_goal);
    println!(
        "Duration: {} weeks, {} hours ({} weeks at {hours_per_week}h/week)",
        roadmap.estimated_weeks, pacing.total_hours, pacing.implied_weeks
    );
    println!("Progression: {}", roadmap.difficulty_progression);
    if let Some(created_at) = roadmap.created_at {
        println!("Created: {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(updated_at) = roadmap.updated_at {
        println!("Updated: {}", updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    println!("Modules:");
    for (i, module) in roadmap.modules.iter().enumerate() {
        println!(
            "  {}. {} [{}] {}h",
            i + 1,
            module.title,
            module.id,
            module.estimated_hours
        );
        for resource in &module.resources {
            println!("       - {} ({}): {}", resource.title, resource.resource_type, resource.url);
        }
        if let Some(project) = &module.project {
            println!("       project: {} ({}h)", project.title, project.estimated_hours);
        }
    }
}
