use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use foundry_core::orchestrator::Outcome;

/// Foundry - build validated software agents from natural language
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an agent from an instruction and persist it on acceptance
    Build {
        /// Natural-language description of the agent to build
        instruction: String,

        /// Directory agent manifests are written under
        #[arg(long, value_name = "DIR", default_value = "agents")]
        output_dir: PathBuf,

        /// LLM provider ("google" or "openai"); overrides FOUNDRY_PROVIDER
        #[arg(long)]
        provider: Option<String>,

        /// Abort the build after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            instruction,
            output_dir,
            provider,
            timeout,
            json,
        } => {
            if let Some(provider) = provider {
                std::env::set_var("FOUNDRY_PROVIDER", provider);
            }

            let orchestrator = foundry_llm::orchestrator_from_env(output_dir)?;

            let cancel = CancellationToken::new();
            if let Some(secs) = timeout {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    cancel.cancel();
                });
            }

            let outcome = orchestrator.build_with_cancel(&instruction, cancel).await?;
            render(&outcome, json)?;
        }
    }

    Ok(())
}

fn render(outcome: &Outcome, json: bool) -> anyhow::Result<()> {
    let report = outcome.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match outcome {
        Outcome::Accepted {
            verdict, artifact, ..
        } => {
            println!("ACCEPTED after {} attempt(s)", report.attempts);
            println!(
                "  agent:     {} ({})",
                report.role.as_deref().unwrap_or("?"),
                report.agent_id.map(|id| id.to_string()).unwrap_or_default()
            );
            println!("  score:     {:.2} (variance {:.3})", verdict.average_score, verdict.variance);
            println!("  artifact:  {}", artifact.location.display());
        }
        Outcome::Escalated { rationale, .. } => {
            println!("ESCALATED after {} attempt(s)", report.attempts);
            println!("  {rationale}");
        }
        Outcome::Rejected { error } => {
            println!("REJECTED: {error}");
        }
    }

    Ok(())
}
