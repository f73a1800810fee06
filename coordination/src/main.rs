//! Command-line front end for the decision engine and coordination sessions
//!
//! # Usage
//!
//! ```bash
//! # Run one decision request and print the result
//! decision-coordination decide --type task_assignment --context '{"task_type":"refactor"}'
//!
//! # Coordinate over filesystem inboxes under DECISION_WORKSPACE_ROOT
//! decision-coordination coordinate --decision-id d-1 --type coordination \
//!     --mode majority --participants alpha,beta,gamma
//!
//! # Answer an input request as a participant
//! decision-coordination respond --agent alpha --session <id> --payload '{"decision":"ship"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use decision_coordination::{
    CoordinationMode, DecisionConfig, DecisionCoordinationSystem, DecisionEngine, DecisionRequest,
    DecisionType, EventBus, FsInboxTransport, JsonFileDecisionRepository,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (DECISION_* environment variables still apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persist results as JSON files in this directory
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one decision request
    Decide {
        /// Decision type, e.g. task_assignment
        #[arg(long = "type")]
        decision_type: DecisionType,

        /// Decision data as a JSON object
        #[arg(long, default_value = "{}")]
        context: String,

        #[arg(long, default_value = "cli")]
        requester: String,
    },

    /// Run one coordination session over filesystem inboxes
    Coordinate {
        #[arg(long)]
        decision_id: Option<String>,

        #[arg(long = "type", default_value = "coordination")]
        decision_type: DecisionType,

        #[arg(long, default_value = "majority")]
        mode: CoordinationMode,

        /// Comma-separated participant ids
        #[arg(long, value_delimiter = ',', required = true)]
        participants: Vec<String>,
    },

    /// Write a participant's answer to an input request
    Respond {
        #[arg(long)]
        agent: String,

        #[arg(long)]
        session: String,

        /// Answer payload as JSON
        #[arg(long)]
        payload: String,
    },

    /// Show pending messages in an agent's inbox
    Inbox {
        #[arg(long)]
        agent: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("decision_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => DecisionConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DecisionConfig::default(),
    };
    config.apply_env();

    let bus = EventBus::new().shared();
    let mut engine = DecisionEngine::new(config.engine.clone()).with_event_bus(Arc::clone(&bus));
    if let Some(dir) = &args.store {
        let repository = JsonFileDecisionRepository::open(dir)
            .with_context(|| format!("opening decision store at {}", dir.display()))?;
        engine = engine.with_repository(Arc::new(repository));
    }
    let engine = engine.shared();

    let inbox = FsInboxTransport::new(
        config.coordination.workspace_root.clone(),
        config.coordination.poll_interval(),
    );

    match args.command {
        Command::Decide {
            decision_type,
            context,
            requester,
        } => {
            let data = parse_object(&context).context("parsing --context")?;
            let request = DecisionRequest::new(decision_type, &requester, data);
            tracing::info!(request_id = %request.id, %decision_type, "Submitting decision request");

            let Some(result) = engine.process_decision_request(request).await else {
                bail!("request was rejected before processing");
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Coordinate {
            decision_id,
            decision_type,
            mode,
            participants,
        } => {
            let decision_id = decision_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let system = DecisionCoordinationSystem::new(
                engine,
                Arc::new(inbox),
                bus,
                config.coordination.clone(),
            )
            .shared();

            let session_id = system
                .initiate_coordination_session(&decision_id, decision_type, participants, mode)
                .await;
            eprintln!(
                "session {} started; participants answer with `respond --session {}`",
                session_id, session_id
            );

            let session = system
                .await_session(&session_id)
                .await
                .context("session disappeared before it finished")?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }

        Command::Respond {
            agent,
            session,
            payload,
        } => {
            let payload: Value = serde_json::from_str(&payload).context("parsing --payload")?;
            let path = inbox
                .write_response(&agent, &session, payload)
                .await
                .context("writing response")?;
            println!("{}", path.display());
        }

        Command::Inbox { agent } => {
            let messages = inbox.read_inbox(&agent).await.context("reading inbox")?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
    }

    Ok(())
}

fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", other),
    }
}
