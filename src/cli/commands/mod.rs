#[cfg(test)]
mod tests;

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::channels::ChannelManager;
use crate::channels::feishu::FeishuServices;
use crate::channels::feishu::card::build_card;
use crate::config::credentials::configured_credentials;
use crate::config::{Config, get_config_path, load_config};
use crate::providers::{GroqTranscriptionProvider, ImageDescriber, Transcriber, VllmImageParser};
use crate::session::{SessionManager, SessionStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "nanobot-feishu")]
#[command(version = crate::VERSION)]
#[command(about = "Feishu/Lark channel bridge for nanobot")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Feishu channel. Inbound messages are printed as JSON lines; outbound
    /// messages are read as JSON lines from stdin
    Gateway {
        /// Echo mode: reply to every message with its own content
        #[arg(long)]
        echo: bool,
    },
    /// Print the interactive card JSON for a markdown file
    Render { file: PathBuf },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config file location
    Path,
    /// Load and validate the config file
    Check,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway { echo } => gateway(echo).await?,
        Commands::Render { file } => println!("{}", render_file(&file)?),
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Path => println!("{}", get_config_path()?.display()),
            ConfigCommands::Check => println!("{}", check_config(None)?),
        },
    }

    Ok(())
}

fn render_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(serde_json::to_string_pretty(&build_card(&text))?)
}

fn check_config(path: Option<&Path>) -> Result<String> {
    let config = load_config(path)?;
    let mut report = String::from("Configuration OK");
    report.push_str(&format!(
        "\n  feishu: {}",
        if config.channels.feishu.enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    report.push_str(&format!(
        "\n  image parser: {}",
        if config.providers.image_parser.enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    let credentials = configured_credentials(&config);
    if credentials.is_empty() {
        report.push_str("\n  credentials: none");
    } else {
        report.push_str(&format!("\n  credentials: {}", credentials.join(", ")));
    }
    Ok(report)
}

fn setup_services(config: &Config) -> (FeishuServices, Option<Arc<SessionManager>>) {
    let sessions = match SessionManager::in_home() {
        Ok(manager) => Some(Arc::new(manager)),
        Err(e) => {
            warn!("Session storage unavailable: {:#}", e);
            None
        }
    };

    let image_describer = VllmImageParser::from_config(&config.providers.image_parser);
    if image_describer.is_some() {
        info!(
            "Image parser enabled (model: {})",
            config.providers.image_parser.model
        );
    }
    let transcriber = GroqTranscriptionProvider::from_config(&config.providers.groq);
    if transcriber.is_some() {
        info!("Voice transcription enabled");
    }

    let services = FeishuServices {
        image_describer: image_describer.map(|p| Arc::new(p) as Arc<dyn ImageDescriber>),
        transcriber: transcriber.map(|p| Arc::new(p) as Arc<dyn Transcriber>),
        sessions: sessions.clone().map(|s| s as Arc<dyn SessionStore>),
    };
    (services, sessions)
}

/// Append one message to the conversation it belongs to. Failures are logged.
async fn record(sessions: Option<&SessionManager>, key: &str, role: &str, content: &str) {
    let Some(sessions) = sessions else {
        return;
    };
    let result = async {
        let mut session = sessions.get_or_create(key).await?;
        session.add_message(role, content, HashMap::new());
        sessions.save(&session).await
    }
    .await;
    if let Err(e) = result {
        warn!("Failed to record {} message in {}: {:#}", role, key, e);
    }
}

fn echo_reply(msg: &InboundMessage) -> OutboundMessage {
    OutboundMessage {
        channel: msg.channel.clone(),
        chat_id: msg.chat_id.clone(),
        content: format!(
            "[echo] channel={} | sender={} | message: {}",
            msg.channel, msg.sender_id, msg.content
        ),
        reply_to: None,
        media: vec![],
        metadata: msg.metadata.clone(),
    }
}

async fn gateway(echo: bool) -> Result<()> {
    info!("Loading configuration...");
    let config = load_config(None)?;

    let mut bus = MessageBus::from_config(&config.bus);
    let mut inbound_rx = bus
        .take_inbound_rx()
        .ok_or_else(|| anyhow::anyhow!("Inbound receiver already taken"))?;
    let mut outbound_rx = bus
        .take_outbound_rx()
        .ok_or_else(|| anyhow::anyhow!("Outbound receiver already taken"))?;
    let bus = Arc::new(Mutex::new(bus));

    let (services, sessions) = setup_services(&config);
    let channels = Arc::new(ChannelManager::new(&config, bus.clone(), services));
    if channels.enabled_channels().is_empty() {
        warn!("No channels enabled; set channels.feishu.enabled in the config");
    }
    eprintln!(
        "Starting nanobot-feishu gateway{}...",
        if echo { " in ECHO mode" } else { "" }
    );
    eprintln!("Enabled channels: {:?}", channels.enabled_channels());
    channels.start_all().await;

    let outbound_task = {
        let channels = channels.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                debug!(
                    "Consumed outbound message: channel={}, chat_id={}, content_len={}",
                    msg.channel,
                    msg.chat_id,
                    msg.content.len()
                );
                if let Err(e) = channels.send(&msg).await {
                    error!("Error sending message to channels: {}", e);
                    continue;
                }
                if !msg.content.is_empty() {
                    let key = format!("{}:{}", msg.channel, msg.chat_id);
                    record(sessions.as_deref(), &key, "assistant", &msg.content).await;
                }
            }
            warn!("Outbound message receiver closed");
        })
    };

    let inbound_task = {
        let bus = bus.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                record(
                    sessions.as_deref(),
                    &msg.session_key(),
                    "user",
                    &msg.content,
                )
                .await;
                if echo {
                    if let Err(e) = bus.lock().await.publish_outbound(echo_reply(&msg)).await {
                        warn!("Failed to publish echo reply: {}", e);
                    }
                    continue;
                }
                match serde_json::to_string(&msg) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!("Failed to serialize inbound message: {}", e),
                }
            }
        })
    };

    let stdin_task = {
        let bus = bus.clone();
        tokio::spawn(async move {
            if echo {
                return;
            }
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<OutboundMessage>(&line) {
                    Ok(msg) => {
                        if let Err(e) = bus.lock().await.publish_outbound(msg).await {
                            warn!("Failed to publish outbound message: {}", e);
                        }
                    }
                    Err(e) => warn!("Ignoring malformed outbound line: {}", e),
                }
            }
            debug!("stdin closed");
        })
    };

    info!("Gateway running");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nShutting down...");
        }
        _ = outbound_task => {}
        _ = inbound_task => {}
    }

    stdin_task.abort();
    channels.stop_all().await;
    Ok(())
}
