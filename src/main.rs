//! companion: terminal front end.
//!
//!   companion --user alice                  # default persona, companion.yaml found upward
//!   companion --user alice --persona luna   # start with a specific persona
//!   companion --config ./dev.yaml --json-logs
//!
//! Reads one utterance per line from stdin. `/quit` or EOF ends the session
//! and saves the conversation summary to the user's memory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use companion_core::agent_core::safety::SESSION_START_SENTINEL;
use companion_core::agent_core::{ReplySource, Session};
use companion_core::config::{find_config_path, CompanionConfig};
use companion_core::Companion;

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "AI companion with multi-agent tool orchestration", version)]
struct Cli {
    /// Config file (defaults to $COMPANION_CONFIG, then companion.yaml searched upward)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// User id; memory is stored per user
    #[arg(long, short, default_value = "local")]
    user: String,

    /// Starting persona (sydney, marcus, luna, kai)
    #[arg(long, short)]
    persona: Option<String>,

    /// JSON logs on stderr instead of the log file
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        companion_core::init_tracing_json();
    } else {
        companion_core::init_tracing().context("failed to initialize logging")?;
    }

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_path(&std::env::current_dir()?)?,
    };
    let config = CompanionConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::info!(config = %config_path.display(), user = %cli.user, "config loaded");

    let companion = Companion::from_config(&config)?;
    let mut session = companion
        .start_session(&cli.user, cli.persona.as_deref())
        .await?;

    let result = converse(&mut session).await;

    match session.close().await {
        Ok(Some(_)) => tracing::info!(user = %cli.user, "memory updated"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to save memory"),
    }
    companion.shutdown().await;
    result
}

async fn converse(session: &mut Session) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    let speaker = session.persona().display_name;
    let greeting = session.send(SESSION_START_SENTINEL).await?;
    print_reply(&mut stdout, speaker, &greeting.text, greeting.source).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }

        // The speaking persona is the one active before any handoff
        let speaker = session.persona().display_name;
        match session.send(input).await {
            Ok(reply) => {
                print_reply(&mut stdout, speaker, &reply.text, reply.source).await?;
                if reply.handoff.is_some() {
                    let next = session.persona().display_name;
                    stdout
                        .write_all(format!("[now talking to {next}]\n").as_bytes())
                        .await?;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                stdout
                    .write_all(format!("(something went wrong: {e})\n").as_bytes())
                    .await?;
            }
        }
    }
    Ok(())
}

async fn print_reply(
    stdout: &mut tokio::io::Stdout,
    speaker: &str,
    text: &str,
    source: ReplySource,
) -> Result<()> {
    let name = match source {
        ReplySource::Agent => speaker,
        ReplySource::Safety => "Companion",
    };
    stdout.write_all(format!("{name}: {text}\n").as_bytes()).await?;
    Ok(())
}
