//! `mirrord`: run a Mirror instance or inspect its stores from the CLI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use mirror_core::{
    Ed25519SigningKey, MirrorConfig, MirrorError, NullNotifier, Result, SystemClock, UserId,
};
use mirror_journal::ChainVerification;
use mirror_node::{EngineDeps, MirrorEngine};
use mirror_policy::TemplateGenerator;
use mirror_protocol::TcpTransport;

#[derive(Parser)]
#[command(name = "mirrord", about = "Mirror reflective-intelligence engine")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "mirror.toml")]
    config: PathBuf,

    /// Hex-encoded instance signing key; generated fresh when absent
    #[arg(long)]
    signing_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the instance: discover peers and heartbeat until interrupted
    Run,
    /// Verify a user's event hash chain
    VerifyChain {
        user: String,
    },
    /// Replay a user's stream and print the identity snapshot
    Replay {
        user: String,
    },
    /// Export the audit trail
    ExportAudit {
        /// json or csv
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn build_engine(cli: &Cli) -> Result<MirrorEngine> {
    let config = MirrorConfig::load(&cli.config)?;
    let signing_key = match &cli.signing_key {
        Some(hex) => Ed25519SigningKey::from_hex(hex)?,
        None => {
            tracing::warn!("no signing key supplied; generating an ephemeral one");
            Ed25519SigningKey::generate()
        }
    };
    MirrorEngine::new(
        config,
        signing_key,
        EngineDeps {
            generator: Arc::new(TemplateGenerator::new()),
            notifier: Arc::new(NullNotifier),
            clock: Arc::new(SystemClock),
            asr: None,
            transport: Some(Arc::new(TcpTransport::new())),
        },
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    match cli.command {
        Command::Run => {
            tracing::info!(instance = %engine.instance_id(), "mirror instance starting");
            engine.discover_peers().await;
            engine.record_heartbeat();
            tracing::info!("ready; press ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| MirrorError::internal(format!("signal handler: {e}")))?;
            tracing::info!("shutting down");
        }
        Command::VerifyChain { user } => {
            let user_id = UserId::new(user)?;
            match engine.verify_chain(&user_id)? {
                ChainVerification::Ok => println!("ok"),
                ChainVerification::FirstBad(event_id) => {
                    println!("first bad event: {event_id}");
                    std::process::exit(1);
                }
            }
        }
        Command::Replay { user } => {
            let user_id = UserId::new(user)?;
            let outcome = engine.snapshot(&user_id)?;
            println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
            for warning in &outcome.warnings {
                tracing::warn!(?warning, "replay warning");
            }
        }
        Command::ExportAudit { format } => match format.as_str() {
            "json" => println!("{}", engine.audit().export_json()?),
            "csv" => println!("{}", engine.audit().export_csv()?),
            other => {
                return Err(MirrorError::invalid(format!(
                    "unknown export format {other:?}; expected json or csv"
                )))
            }
        },
    }
    Ok(())
}
