use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prc_core::capture::Submission;
use prc_schemas::{environment::AmbientConditions, tree::StatusFlag};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod workflow;

#[derive(Parser)]
#[command(name = "prc", version, about = "Execute Process Route Cards")]
struct Cli {
    #[arg(long, default_value = "prc.yaml")]
    config: PathBuf,

    /// Overrides `catalog_dir` from the config file.
    #[arg(long)]
    catalog_dir: Option<PathBuf>,

    /// Overrides `store_dir` from the config file.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    #[arg(long)]
    audit_log: Option<PathBuf>,

    #[arg(long)]
    operator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start a new execution from a catalog template")]
    Init {
        template_id: String,
        execution_id: String,
    },

    #[command(about = "Show the ordered steps and their status")]
    Timeline { execution_id: String },

    #[command(about = "Capture data for one step")]
    Submit {
        execution_id: String,
        step_number: usize,
        /// Submission as JSON, e.g. '{"kind":"sub_step","sub_step_id":100,"value":0.5}'.
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// Reads the submission JSON from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Acknowledges an out-of-range entry by id. Repeatable.
        #[arg(long = "ack")]
        acknowledged: Vec<u32>,
    },

    #[command(about = "Record an approval or mark a step complete")]
    Approve {
        execution_id: String,
        step_number: usize,
        #[arg(value_enum)]
        flag: Approval,
    },

    #[command(about = "Show the acceptable catalyst quantity for a line")]
    Catalyst {
        execution_id: String,
        line_id: u32,
        #[arg(long)]
        temperature: f64,
        #[arg(long)]
        humidity: f64,
        /// Classifies this quantity against the range.
        #[arg(long)]
        quantity: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Approval {
    Production,
    Ctq,
    PartialCtq,
    Complete,
}

impl From<Approval> for StatusFlag {
    fn from(approval: Approval) -> Self {
        match approval {
            Approval::Production => StatusFlag::ProductionApproved,
            Approval::Ctq => StatusFlag::CtqApproved,
            Approval::PartialCtq => StatusFlag::PartialCtqApproved,
            Approval::Complete => StatusFlag::StepCompleted,
        }
    }
}

fn read_submission(data: Option<String>, file: Option<PathBuf>) -> Result<Submission> {
    let json = match (data, file) {
        (Some(data), _) => data,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read submission file: {:?}", path))?,
        (None, None) => anyhow::bail!("Provide the submission with --data or --file"),
    };
    serde_json::from_str(&json).context("Failed to parse submission JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PRC_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = config::AppConfig::load(&cli.config)?;
    if let Some(dir) = cli.catalog_dir {
        config.catalog_dir = dir;
    }
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    if cli.audit_log.is_some() {
        config.audit_log = cli.audit_log;
    }
    if cli.operator.is_some() {
        config.operator = cli.operator;
    }

    match cli.command {
        Commands::Init {
            template_id,
            execution_id,
        } => {
            let catalog = config::Catalog::load(&config.catalog_dir)?;
            workflow::init_execution(&config, &catalog, &template_id, &execution_id).await
        }
        Commands::Timeline { execution_id } => {
            let controller = workflow::open(&config, &execution_id).await?;
            workflow::print_timeline(&controller);
            Ok(())
        }
        Commands::Submit {
            execution_id,
            step_number,
            data,
            file,
            acknowledged,
        } => {
            let submission = read_submission(data, file)?;
            workflow::submit(&config, &execution_id, step_number, submission, &acknowledged).await
        }
        Commands::Approve {
            execution_id,
            step_number,
            flag,
        } => workflow::approve(&config, &execution_id, step_number, flag.into()).await,
        Commands::Catalyst {
            execution_id,
            line_id,
            temperature,
            humidity,
            quantity,
        } => {
            let conditions = AmbientConditions {
                temperature,
                humidity,
            };
            workflow::evaluate_catalyst(&config, &execution_id, line_id, conditions, quantity).await
        }
    }
}
