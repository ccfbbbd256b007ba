mod config;

use clap::{Parser, Subcommand};
use config::MeridianConfig;
use meridian_agent::{build_provider, default_profiles};
use meridian_core::{
    AgentRole, AgentTask, ExperienceStore, ReasoningPattern, RetrievalProvider,
};
use meridian_memory::{JsonlExperienceStore, KeywordRetriever};
use meridian_orchestrator::Supervisor;
use meridian_quality::SelfCorrectionLoop;
use meridian_reasoning::ReasoningEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meridian", about = "Meridian — agent task orchestration and self-correction")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "meridian.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a task graph and print the run report
    Run {
        /// JSON file holding an array of tasks
        #[arg(long)]
        tasks: PathBuf,
        /// Directory of text files recalled as memory when enabled
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Reason about a question with one pattern and print the chain
    Reason {
        /// linear, chain_of_thought, tree_of_thought, multi_perspective,
        /// critique_and_refine or ensemble
        #[arg(short, long, default_value = "chain_of_thought")]
        pattern: ReasoningPattern,
        question: String,
    },
    /// Answer a query from a corpus and self-correct the answer
    Correct {
        /// Directory of text files to retrieve from
        #[arg(long)]
        corpus: Option<PathBuf>,
        query: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout carries only the JSON report.
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
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = MeridianConfig::load(&cli.config).await?;
    let provider = build_provider(&config.model);

    match cli.command {
        Commands::Run { tasks, corpus } => {
            let text = tokio::fs::read_to_string(&tasks).await.map_err(|e| {
                anyhow::anyhow!("Failed to read tasks file '{}': {e}", tasks.display())
            })?;
            let tasks: Vec<AgentTask> = serde_json::from_str(&text)?;
            info!(tasks = tasks.len(), "Loaded task graph");

            let mut supervisor = Supervisor::new(
                provider,
                default_profiles(&config.model),
                config.reasoning(),
                config.capabilities,
                config.orchestrator.clone(),
            );
            if let Some(store) = experience_store(&config).await {
                supervisor = supervisor.with_experience_store(store);
            }
            if let Some(dir) = corpus {
                supervisor = supervisor.with_retriever(load_corpus(Some(&dir)).await?);
            }

            let report = supervisor.run(tasks).await;
            print_json(&report)?;
        }
        Commands::Reason { pattern, question } => {
            let engine = ReasoningEngine::new(provider);
            let task = AgentTask::new("question", AgentRole::Analyst, serde_json::json!(question));
            let chain = engine.reason(&task, "", pattern, &config.reasoning()).await;
            print_json(&chain)?;
        }
        Commands::Correct { corpus, query } => {
            let retriever = load_corpus(corpus.as_deref()).await?;
            let mut correction = SelfCorrectionLoop::from_providers(
                provider,
                retriever,
                &config.model.model_id,
                config.correction.clone(),
            );
            if let Some(store) = experience_store(&config).await {
                correction = correction.with_experience_store(store);
            }
            let result = correction.run(&query).await;
            print_json(&result)?;
        }
    }

    Ok(())
}

/// JSONL store under the data dir, when experience recording is enabled.
async fn experience_store(config: &MeridianConfig) -> Option<Arc<dyn ExperienceStore>> {
    if !config.capabilities.experience_enabled {
        return None;
    }
    match JsonlExperienceStore::new(config.experience_path()).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Experience store unavailable, not recording");
            None
        }
    }
}

async fn load_corpus(dir: Option<&Path>) -> anyhow::Result<Arc<dyn RetrievalProvider>> {
    let retriever = match dir {
        Some(dir) => KeywordRetriever::from_dir(dir).await?,
        None => {
            warn!("No corpus given, answers will have no sources");
            KeywordRetriever::new()
        }
    };
    Ok(Arc::new(retriever))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
