//! Command-line probe for the remote avatar API.
//!
//! Runs one operation against the configured account and prints what the
//! remote answered, interpreted, as JSON.

use anyhow::Context;
use avatar_api::{
    config::Config,
    models::{AvatarDiagnosticsResponse, DiagnosticView, OutcomeResponse, RemoteSessionView},
};
use avatar_core::{
    avatar::AvatarDirectory,
    streaming::{StreamingClient, resolve_voice},
    transport::{HttpTransport, Transport},
    video::{Dimension, VideoClient},
};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

/// Avatar probe - single remote operations with interpreted diagnostics
#[derive(Parser, Debug)]
#[command(name = "probe")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize the raw streaming avatar listing
    Avatars,

    /// Request a streaming token
    Token,

    /// List the sessions the account considers live
    Sessions,

    /// Stop a session by id
    Stop {
        session_id: String,
    },

    /// Render a video and wait for its URL
    Render {
        #[arg(long)]
        avatar_id: String,

        #[arg(long)]
        text: String,

        #[arg(long)]
        voice_id: Option<String>,

        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn diagnostics(client: &StreamingClient) -> Vec<DiagnosticView> {
    client
        .diagnostics()
        .into_iter()
        .map(DiagnosticView::from)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        &config.base_url,
        SecretString::from(config.api_key.expose_secret().to_owned()),
        config.request_timeout,
    )?);

    match cli.command {
        Commands::Avatars => {
            let directory = AvatarDirectory::new(transport, Duration::ZERO);
            let diagnostic = directory.diagnose().await?;
            print_json(&AvatarDiagnosticsResponse::from(diagnostic))?;
        }
        Commands::Token => {
            let mut client = StreamingClient::new(transport);
            let result = client.create_token().await;
            print_json(&json!({
                "token_issued": result.is_ok(),
                "token_len": result.as_ref().map(String::len).unwrap_or(0),
                "diagnostics": diagnostics(&client),
            }))?;
            result?;
        }
        Commands::Sessions => {
            let mut client = StreamingClient::new(transport);
            let sessions = client.list_active_sessions().await?;
            let views: Vec<RemoteSessionView> =
                sessions.into_iter().map(RemoteSessionView::from).collect();
            print_json(&views)?;
        }
        Commands::Stop { session_id } => {
            let mut client = StreamingClient::new(transport);
            let outcome = client.stop_session(&session_id).await;
            print_json(&OutcomeResponse::from(outcome))?;
        }
        Commands::Render {
            avatar_id,
            text,
            voice_id,
            timeout_secs,
        } => {
            let videos = VideoClient::new(transport, config.video_auth, config.video_poll_interval);
            let voice_id = resolve_voice(voice_id.as_deref(), None, &config.default_voice_id);
            let video_id = videos
                .create_video(&avatar_id, &voice_id, &text, Dimension::default())
                .await?;
            eprintln!(
                "Submitted video {}; polling every {:?}...",
                video_id,
                videos.poll_interval()
            );
            let video_url = videos
                .poll_video(&video_id, Duration::from_secs(timeout_secs))
                .await?;
            print_json(&json!({ "video_id": video_id, "video_url": video_url }))?;
        }
    }

    Ok(())
}
