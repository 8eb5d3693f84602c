//! cadence - realtime conversation tooling

mod config;
mod replay;

use std::path::{Path, PathBuf};

use anyhow::Context;
use cadence_session::{Notification, SessionConfig};
use cadence_wire::Negotiator;
use clap::{Parser, Subcommand};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

/// cadence - realtime conversation tooling
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to negotiate (default: gpt-4o-realtime-preview-2024-12-17)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Negotiation endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSONL log of server events and print the conversation
    Replay {
        /// File with one server event per line
        file: PathBuf,

        /// Print the conversation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exchange an SDP offer for the server's answer
    Negotiate {
        /// File containing the SDP offer
        offer_file: PathBuf,
    },

    /// Initialize config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("cadence=debug,cadence_session=debug,cadence_wire=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Command::InitConfig = args.command {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();
    let session_config = cfg.session_config(args.model, args.base_url);

    match args.command {
        Command::Replay { file, json } => {
            run_replay(session_config, &file, json, args.verbose).await
        }
        Command::Negotiate { offer_file } => {
            let Some(api_key) = cfg.api_key() else {
                eprintln!("Error: No API key found");
                eprintln!();
                eprintln!("Set your API key with: export OPENAI_API_KEY=your-key");
                eprintln!("Or add it to config file: cadence init-config");
                std::process::exit(1);
            };
            run_negotiate(&session_config, &api_key, &offer_file).await
        }
        Command::InitConfig => Ok(()),
    }
}

async fn run_replay(
    config: SessionConfig,
    file: &Path,
    json: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut session = replay::session(config, &source);

    // Print notifications as they happen
    let printer = verbose.then(|| {
        let mut stream = BroadcastStream::new(session.subscribe());
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(notification) => eprintln!("[{}]", describe(&notification)),
                    Err(e) => eprintln!("[notifications lagged: {}]", e),
                }
            }
        })
    });

    let conversation = replay::run(&mut session).await?;
    drop(session);
    if let Some(printer) = printer {
        printer.await?;
    }

    if json {
        let items: Vec<_> = conversation.iter().map(|item| item.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        println!("{}", replay::render(&conversation));
    }
    Ok(())
}

fn describe(notification: &Notification) -> String {
    match notification {
        Notification::ServerEvent(value) => format!(
            "server event {}",
            value.get("type").and_then(|t| t.as_str()).unwrap_or("?")
        ),
        Notification::SessionCreated(session) => {
            format!("session created ({})", session.model().unwrap_or("-"))
        }
        Notification::SessionUpdated(session) => {
            format!("session updated ({})", session.model().unwrap_or("-"))
        }
        Notification::SessionCleared => "session cleared".to_string(),
        Notification::ConversationChanged(snapshot) => {
            format!("conversation changed ({} items)", snapshot.len())
        }
        Notification::RecordedAudioChanged(info) => format!(
            "recorded audio changed ({} chunks, {} bytes)",
            info.chunks, info.bytes
        ),
    }
}

async fn run_negotiate(
    config: &SessionConfig,
    api_key: &str,
    offer_file: &Path,
) -> anyhow::Result<()> {
    let offer = std::fs::read_to_string(offer_file)
        .with_context(|| format!("Failed to read {}", offer_file.display()))?;

    let negotiator = config.http_negotiator(api_key);
    match negotiator.negotiate(&offer, &config.model).await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e) if e.is_auth() => {
            anyhow::bail!("Authentication rejected by {}: {}", negotiator.base_url(), e)
        }
        Err(e) => Err(e.into()),
    }
}
