mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pythonic_common::config::{EvaluatorConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pythonic")]
#[command(about = "Mission: Pythonic evaluator - run submissions and validate level content", long_about = None)]
struct Cli {
    /// Evaluator config file (defaults are used when the default path is absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a submission and print the raw result
    Run {
        /// Python source file
        file: PathBuf,

        /// Name of a file to create in the working directory first
        #[arg(long, requires = "required_content")]
        required_file: Option<String>,

        /// Local file whose content is written to --required-file
        #[arg(long, requires = "required_file")]
        required_content: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Evaluate a submission against a level's rubric
    Evaluate {
        /// Python source file
        file: PathBuf,

        /// Level id (e.g. level_001)
        #[arg(short, long)]
        level: String,

        /// Levels directory
        #[arg(long, default_value = "levels")]
        levels: PathBuf,
    },

    /// Check that every level loads and its solution passes its own rubric
    Validate {
        /// Levels directory
        #[arg(long, default_value = "levels")]
        levels: PathBuf,
    },

    /// List loaded levels
    Levels {
        /// Levels directory
        #[arg(long, default_value = "levels")]
        levels: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EvaluatorConfig> {
    let config = match path {
        Some(path) => EvaluatorConfig::load(&path)?,
        None => EvaluatorConfig::load_default()?,
    };
    let config = config.with_env_overrides()?;
    tracing::debug!(
        default_path = DEFAULT_CONFIG_PATH,
        backend = ?config.backend,
        timeout_ms = config.timeout_ms,
        "Configuration loaded"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    let config = load_config(cli.config)?;

    let success = match cli.command {
        Commands::Run {
            file,
            required_file,
            required_content,
            json,
        } => {
            commands::run_file(&config, &file, required_file, required_content.as_deref(), json)
                .await?
        }
        Commands::Evaluate {
            file,
            level,
            levels,
        } => commands::evaluate_file(&config, &file, &level, &levels).await?,
        Commands::Validate { levels } => commands::validate_levels(&config, &levels).await?,
        Commands::Levels { levels } => commands::list_levels(&levels)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
