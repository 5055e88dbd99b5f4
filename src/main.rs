use anyhow::Result;
use clap::{Parser, Subcommand};
use piano_flow::cli::{OutputEvent, OutputHandler, OutputMode, commands, create_handler};
use piano_flow::config::EngineConfig;
use piano_flow::handlers::Collaborators;
use piano_flow::logging::init_logging;
use piano_flow::store::SqliteStore;
use piano_flow::workflow::WorkflowEngine;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "piano-flow")]
#[command(about = "Workflow automation for piano service businesses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Explicit config file (highest precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides [store] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition file without publishing
    Validate {
        /// Definition file (.toml or .json)
        file: PathBuf,
    },

    /// Validate and activate a workflow definition
    Publish {
        /// Definition file (.toml or .json)
        file: PathBuf,
    },

    /// List published workflows
    Workflows,

    /// Start a run of one workflow
    Trigger {
        workflow: String,

        /// Actor or event that started the run
        #[arg(long = "by")]
        triggered_by: String,

        /// Run data as a JSON object
        #[arg(long)]
        data: Option<String>,
    },

    /// Fire a business event at every workflow listening on it
    Emit {
        event: String,

        #[arg(long = "by")]
        triggered_by: String,

        #[arg(long)]
        data: Option<String>,
    },

    /// Acknowledge the step a paused run is waiting on
    Resume {
        context: String,

        /// Data patch returned by the task, as a JSON object
        #[arg(long, conflicts_with = "fail")]
        data: Option<String>,

        /// Report the awaited work as failed
        #[arg(long)]
        fail: Option<String>,
    },

    /// Cancel a running or paused run
    Cancel { context: String },

    /// Show one run
    Status { context: String },

    /// List runs
    Runs {
        /// Only runs with this status (running, paused, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Resume delayed runs whose deadline has passed
    Tick,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let config = EngineConfig::load(Some(&cwd), cli.config.as_deref())?;
    let _log_guard = init_logging(cli.debug, cli.quiet || cli.json, &config.logging)?;

    let handler = create_handler(OutputMode::from_flags(cli.json, cli.quiet));

    let exit_code = match run(cli.command, cli.db, &config, &*handler).await {
        Ok(code) => code,
        Err(e) => {
            handler.emit(OutputEvent::Error {
                error: format!("{:#}", e),
            });
            1
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(
    command: Commands,
    db: Option<PathBuf>,
    config: &EngineConfig,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    if let Commands::Validate { file } = &command {
        return commands::validate_definition(file, handler);
    }

    let db_path = match db {
        Some(path) => path,
        None => config.store.resolve_path()?,
    };
    let store = Arc::new(SqliteStore::open(&db_path)?);
    let collaborators = Collaborators::tracing(config.defaults.notification_ack);
    let engine = WorkflowEngine::from_config(config, store, collaborators);

    match command {
        Commands::Validate { .. } => unreachable!("handled before opening the store"),
        Commands::Publish { file } => commands::publish_definition(&engine, &file, handler),
        Commands::Workflows => commands::list_workflows(&engine, handler),
        Commands::Trigger {
            workflow,
            triggered_by,
            data,
        } => {
            commands::trigger_workflow(&engine, &workflow, &triggered_by, data.as_deref(), handler)
                .await
        }
        Commands::Emit {
            event,
            triggered_by,
            data,
        } => commands::emit_event(&engine, &event, &triggered_by, data.as_deref(), handler).await,
        Commands::Resume {
            context,
            data,
            fail,
        } => {
            commands::resume_run(&engine, &context, data.as_deref(), fail.as_deref(), handler)
                .await
        }
        Commands::Cancel { context } => commands::cancel_run(&engine, &context, handler).await,
        Commands::Status { context } => commands::show_status(&engine, &context, handler),
        Commands::Runs { status } => commands::list_runs(&engine, status.as_deref(), handler),
        Commands::Tick => commands::tick(&engine, handler).await,
    }
}
