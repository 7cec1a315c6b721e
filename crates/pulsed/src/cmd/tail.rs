//! The tail command - stream live events to the terminal
//!
//! Connects to a running server's `/ws` socket and prints one line per
//! event. The server sends batch envelopes; a bare event object is also
//! accepted for transitional compatibility.

use anyhow::{Context, Result};
use clap::Args;
use futures_util::StreamExt;
use pulse_protocol::{BatchEnvelope, Event, EventKind};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Arguments for the tail command
#[derive(Args, Debug)]
pub struct TailArgs {
    /// Stream socket URL of a running server
    #[arg(long, default_value = "ws://127.0.0.1:4177/ws")]
    pub url: String,
}

pub async fn run(args: TailArgs) -> Result<()> {
    let (mut socket, _) = connect_async(&args.url)
        .await
        .with_context(|| format!("connecting to {}", args.url))?;

    eprintln!("connected to {} (ctrl-c to stop)", args.url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = socket.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => print_frame(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        eprintln!("server closed the stream");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        eprintln!("stream error: {e}");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_frame(text: &str) {
    if let Ok(batch) = serde_json::from_str::<BatchEnvelope>(text) {
        for event in &batch.events {
            print_event(event);
        }
    } else if let Ok(event) = serde_json::from_str::<Event>(text) {
        print_event(&event);
    } else {
        eprintln!("unrecognized frame: {text}");
    }
}

fn print_event(event: &Event) {
    let when = chrono::DateTime::from_timestamp(event.ts as i64, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{:.3}", event.ts));

    let summary = match &event.kind {
        EventKind::Session { state, repo_root } => {
            let root = repo_root.as_deref().unwrap_or("-");
            format!("session {} ({root})", state.as_str())
        }
        EventKind::FileTouch { path, kind } => format!("{} {path}", kind.as_str()),
        EventKind::ToolCall {
            tool,
            phase,
            command,
        } => {
            let cmd = command.as_deref().unwrap_or("");
            format!("{tool} {} {cmd}", phase.as_str())
        }
        EventKind::AgentState { state } => format!("agent {}", state.as_str()),
        EventKind::Unknown(u) => {
            if let Some(gap) = &u.gap {
                format!("** gap: {} events dropped **", gap.dropped_count)
            } else {
                u.reason.clone().unwrap_or_else(|| "unknown".to_string())
            }
        }
    };

    let id = event
        .id
        .as_ref()
        .map(|id| id.as_str())
        .unwrap_or("-");

    println!("{when} [{}] {summary} ({id})", event.session_id);
}
