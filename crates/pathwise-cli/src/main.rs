mod config;
mod providers_cmd;
mod roadmap_cmds;
mod store;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use config::PathwiseConfig;

#[derive(Parser)]
#[command(name = "pathwise", about = "LLM-backed learning roadmap generator")]
struct Cli {
    /// Provider to use (overrides PATHWISE_AI_PROVIDER and the config file)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a pathwise config file
    Init {
        /// Active provider: google, openai or ollama
        #[arg(long, default_value = "google")]
        ai_provider: String,
        /// API key for the provider
        #[arg(long)]
        api_key: Option<String>,
        /// Model identifier (defaults to the provider's default model)
        #[arg(long)]
        model: Option<String>,
        /// Endpoint override, e.g. a remote Ollama host
        #[arg(long)]
        base_url: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// List providers and whether they are configured
    Providers,
    /// Generate a roadmap from a request JSON file ("-" reads stdin)
    Generate {
        /// Path to the generation request JSON
        request: PathBuf,
        /// Save the roadmap in the roadmap directory
        #[arg(long)]
        save: bool,
    },
    /// Revise a roadmap from a natural-language instruction
    Update {
        /// Roadmap ID to revise
        roadmap_id: String,
        /// What to change, e.g. "add more SQL practice"
        #[arg(long)]
        prompt: String,
        /// Read the current roadmap from this file instead of the roadmap directory
        #[arg(long)]
        from: Option<PathBuf>,
        /// Save the revised roadmap in the roadmap directory
        #[arg(long)]
        save: bool,
    },
    /// Show a saved roadmap (omit the ID to list saved roadmaps)
    Show {
        /// Roadmap ID to show
        roadmap_id: Option<String>,
        /// Print the raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Execute the `pathwise init` command: write config file.
fn cmd_init(
    provider: &str,
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let provider = provider.trim().to_lowercase();
    let mut cfg = config::ConfigFile::default();
    cfg.ai.provider = Some(provider.clone());
    let Some(section) = cfg.provider_mut(&provider) else {
        anyhow::bail!("unknown provider {provider:?} (available: google, ollama, openai)");
    };
    section.api_key = api_key.clone();
    section.model = model;
    section.base_url = base_url;

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  ai.provider = {provider}");
    if let Some(key) = &api_key {
        println!("  {provider}.api_key = {}", mask(key));
    } else if provider != "ollama" {
        println!();
        println!(
            "No API key stored. Set {}_API_KEY or re-run with --api-key.",
            provider.to_uppercase()
        );
    }
    println!();
    println!("Next: run `pathwise providers` to check the setup.");

    Ok(())
}

/// First and last four characters of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Init {
            ai_provider,
            api_key,
            model,
            base_url,
            force,
        } => {
            cmd_init(&ai_provider, api_key, model, base_url, force)?;
        }
        Commands::Providers => {
            let resolved = PathwiseConfig::resolve(cli.provider.as_deref())?;
            providers_cmd::run_providers(&resolved.core);
        }
        Commands::Generate { request, save } => {
            let resolved = PathwiseConfig::resolve(cli.provider.as_deref())?;
            roadmap_cmds::run_generate(&resolved, &request, save).await?;
        }
        Commands::Update {
            roadmap_id,
            prompt,
            from,
            save,
        } => {
            let resolved = PathwiseConfig::resolve(cli.provider.as_deref())?;
            roadmap_cmds::run_update(&resolved, &roadmap_id, &prompt, from.as_deref(), save).await?;
        }
        Commands::Show { roadmap_id, json } => {
            let resolved = PathwiseConfig::resolve(cli.provider.as_deref())?;
            roadmap_cmds::run_show(&resolved, roadmap_id.as_deref(), json).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pathwise", &mut std::io::stdout());
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_requires_a_prompt() {
        assert!(Cli::try_parse_from(["pathwise", "update", "roadmap-1"]).is_err());
        let cli = Cli::try_parse_from([
            "pathwise",
            "update",
            "roadmap-1",
            "--prompt",
            "add SQL",
            "--provider",
            "ollama",
        ])
        .unwrap();
        assert_eq!(cli.provider.as_deref(), Some("ollama"));
        assert!(matches!(cli.command, Commands::Update { ref prompt, .. } if prompt == "add SQL"));
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask("sk-1234567890abcd"), "sk-1...abcd");
        assert_eq!(mask("short"), "*****");
    }
}
