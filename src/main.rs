// src/main.rs

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use debloat::config::Config;
use debloat::metrics::{self, MetricsStore};
use debloat::orchestrator::batch::{BatchDefaults, run_batch, write_template};
use debloat::orchestrator::{Job, run_job};
use debloat::prompts::{self, ResolvedPrompt};
use debloat::provider::{ModelId, ProviderRegistry};

#[derive(Parser)]
#[command(name = "debloat")]
#[command(about = "Identify and remove software bloat using LLMs", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove bloat from a single file
    Run {
        /// Path to the file with bloated code
        #[arg(long)]
        code_file: PathBuf,

        /// LLM model to use (claude-3-7-sonnet, gpt-4o, gemini-2-0-flash, deepseek-r1)
        #[arg(long)]
        llm_model: String,

        /// Built-in prompt id (detailed, minimal)
        #[arg(long, conflicts_with = "custom_prompt")]
        prompt: Option<String>,

        /// Custom prompt text used instead of a built-in prompt
        #[arg(long)]
        custom_prompt: Option<String>,

        /// Write the debloated code here instead of updating the original
        #[arg(long)]
        export_path: Option<PathBuf>,

        /// Metrics store path (default: DEBLOAT_METRICS_FILE or debloat_metrics.csv)
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Process a batch of files from a manifest
    Batch {
        /// Path to the manifest CSV (see `debloat template`)
        #[arg(long)]
        manifest: PathBuf,

        /// Default model for rows without a model column
        #[arg(long)]
        llm_model: Option<String>,

        /// Default built-in prompt id for rows without a prompt column
        #[arg(long, conflicts_with = "custom_prompt")]
        prompt: Option<String>,

        /// Default custom prompt text for rows without a prompt column
        #[arg(long)]
        custom_prompt: Option<String>,

        /// Directory to export debloated files into (originals untouched)
        #[arg(long)]
        export_dir: Option<PathBuf>,

        /// Metrics store path (default: DEBLOAT_METRICS_FILE or debloat_metrics.csv)
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Create an empty batch manifest template
    Template {
        /// Where to write the template
        #[arg(long, default_value = "batch_files.csv")]
        output: PathBuf,
    },
}

fn select_prompt(
    prompt: Option<&str>,
    custom_prompt: Option<&str>,
) -> Result<ResolvedPrompt, debloat::DebloatError> {
    match (prompt, custom_prompt) {
        (_, Some(text)) => Ok(ResolvedPrompt::custom(text)),
        (Some(id), None) => prompts::resolve_id(id),
        (None, None) => Ok(prompts::default_prompt()),
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Run {
            code_file,
            llm_model,
            prompt,
            custom_prompt,
            export_path,
            metrics_file,
        } => {
            let model = ModelId::from_str(&llm_model)?;
            let prompt = select_prompt(prompt.as_deref(), custom_prompt.as_deref())?;
            if !code_file.is_file() {
                bail!("code file not found: {}", code_file.display());
            }

            let registry = ProviderRegistry::from_config(&config);
            let store = MetricsStore::new(
                metrics_file.unwrap_or_else(|| PathBuf::from(&config.metrics_path)),
            );
            info!("using prompt '{}'", prompt.id);

            let job = Job {
                source_path: code_file,
                model,
                prompt,
                export_path,
            };
            let report = run_job(&job, &registry, &store).await?;
            info!(
                "bloat removal completed: {} ({} -> {} lines, {:.2}% reduction, backup at {})",
                report.output_path.display(),
                report.lines_before,
                report.lines_after,
                report.reduction_percent,
                report.backup_path.display()
            );
            info!("results recorded in {}", store.path().display());
        }

        Command::Batch {
            manifest,
            llm_model,
            prompt,
            custom_prompt,
            export_dir,
            metrics_file,
        } => {
            let model = llm_model.as_deref().map(ModelId::from_str).transpose()?;
            let prompt = select_prompt(prompt.as_deref(), custom_prompt.as_deref())?;

            let registry = ProviderRegistry::from_config(&config);
            let store = MetricsStore::new(
                metrics_file.unwrap_or_else(|| PathBuf::from(&config.metrics_path)),
            );
            let defaults = BatchDefaults {
                model,
                prompt,
                export_dir,
                pause: Duration::from_secs(config.batch_pause_secs),
            };

            // Individual job failures are reported but do not fail the
            // process; only a manifest that cannot be processed does.
            let result = run_batch(&manifest, &defaults, &registry, &store).await?;
            info!(
                "batch finished: {} succeeded, {} failed out of {}",
                result.successes(),
                result.failures(),
                result.outcomes.len()
            );

            let summary = metrics::summarize(&store.load()?);
            info!(
                "metrics store {}: {} rows, mean reduction {:.2}%, {} lines removed in total",
                store.path().display(),
                summary.jobs,
                summary.mean_reduction_percent,
                summary.lines_removed
            );
        }

        Command::Template { output } => {
            write_template(&output)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = Config::from_env();
    info!(
        "configured backends: {}",
        if config.configured_backends().is_empty() {
            "none".to_string()
        } else {
            config.configured_backends().join(", ")
        }
    );

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
