//! PromptGuard CLI
//!
//! Classify text with the built-in guardrail tasks and manage the local model
//! cache.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use promptguard_classifiers::{ClassificationResult, Dtype, ModelOptions, Pipeline, TaskRegistry};
use promptguard_hub::ArtifactCache;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

mod config;

use config::{CliConfig, HubOverrides};

#[derive(Parser, Debug)]
#[command(name = "promptguard")]
#[command(about = "Prompt-injection, jailbreak and PII classification", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "PROMPT_GUARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Cache root for downloaded models
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Never download; use cached files only
    #[arg(long, global = true)]
    offline: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one or more texts
    Classify(ClassifyArgs),
    /// Download every file of a model into the cache
    Download(ModelArgs),
    /// Exit 0 when the model is available without downloading, 1 otherwise
    Ready(ModelArgs),
    /// Print the resolved cache root
    CacheDir,
    /// List the available tasks
    Tasks,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Task name
    #[arg(short, long, default_value = "prompt-injection")]
    task: String,

    /// Registry id overriding the task's default model
    #[arg(short, long)]
    model: Option<String>,

    /// Model precision (fp32, fp16, q8, int8, q4, q4f16)
    #[arg(long)]
    dtype: Option<Dtype>,

    /// Read model files from this directory instead of the registry
    #[arg(long)]
    local_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Decision threshold in [0, 1]
    #[arg(long)]
    threshold: Option<f32>,

    /// Print one JSON object per input
    #[arg(long)]
    json: bool,

    /// Texts to classify
    #[arg(required = true)]
    text: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let overrides = HubOverrides {
        cache_dir: cli.cache_dir.clone(),
        offline: cli.offline,
    };
    let config = CliConfig::load(cli.config.as_deref(), &overrides)?;
    debug!("Configuration: {:?}", config);

    let hub = config.hub.clone();
    promptguard_hub::configure(|global| *global = hub);

    match cli.command {
        Command::Classify(args) => classify(&config, args),
        Command::Download(args) => {
            let pipeline = build_pipeline(&config, &args, None)?;
            pipeline.preload()?;
            info!("{} is ready", pipeline.model_id());
            Ok(ExitCode::SUCCESS)
        }
        Command::Ready(args) => {
            let pipeline = build_pipeline(&config, &args, None)?;
            let ready = pipeline.ready();
            println!("{}", if ready { "ready" } else { "not ready" });
            Ok(if ready { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Command::CacheDir => {
            let root = ArtifactCache::new(config.hub.clone()).resolve_root(None);
            println!("{}", root.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Tasks => {
            for name in TaskRegistry::tasks() {
                let definition = TaskRegistry::definition(name)?;
                println!(
                    "{:<16} {:<44} {}",
                    definition.name, definition.default_model, definition.description
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn classify(config: &CliConfig, args: ClassifyArgs) -> Result<ExitCode> {
    let mut pipeline = build_pipeline(config, &args.model, args.threshold)?;

    for result in pipeline.classify_batch(&args.text)? {
        if args.json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            print_result(&result);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn build_pipeline(config: &CliConfig, args: &ModelArgs, threshold: Option<f32>) -> Result<Pipeline> {
    let flags = ModelOptions {
        dtype: args.dtype,
        local_path: args.local_path.clone(),
        threshold,
        ..Default::default()
    };
    let (model, options) = config.resolve(&args.task, args.model.clone(), flags);

    let pipeline = TaskRegistry::new(config.hub.clone()).pipeline(&args.task, model.as_deref(), options)?;
    debug!("Built {:?}", pipeline);
    Ok(pipeline)
}

fn print_result(result: &ClassificationResult) {
    println!(
        "{}\t{:.4}\t{}\t{}",
        result.label,
        result.score,
        if result.is_positive { "positive" } else { "negative" },
        result.input_text
    );
}

/// Initialize tracing
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("promptguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("promptguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
