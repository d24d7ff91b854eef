//! Minimal controller: sends one command line and prints what comes back.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tabrelay::protocol::CONTROLLER_PREFIX;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::cli::SendArgs;

pub async fn send(args: &SendArgs) -> Result<()> {
	let line = command_line(&args.command);
	let (ws, _) = connect_async(args.url.as_str())
		.await
		.with_context(|| format!("Failed to connect to {}", args.url))?;
	let (mut ws_tx, mut ws_rx) = ws.split();

	debug!(target = "tabrelay.client", %line, "sending command");
	ws_tx
		.send(Message::Text(line))
		.await
		.context("Failed to send command")?;

	let deadline = tokio::time::sleep(Duration::from_secs(args.wait_secs));
	tokio::pin!(deadline);

	loop {
		tokio::select! {
			_ = &mut deadline => break,
			msg = ws_rx.next() => match msg {
				Some(Ok(Message::Text(text))) => println!("{text}"),
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => return Err(err).context("WebSocket error"),
			},
		}
	}

	let _ = ws_tx.send(Message::Close(None)).await;
	Ok(())
}

/// Joins the words and adds the `main:` prefix when missing.
pub fn command_line(words: &[String]) -> String {
	let line = words.join(" ");
	let prefix = format!("{CONTROLLER_PREFIX}:");
	if line.starts_with(&prefix) {
		line
	} else {
		format!("{prefix}{line}")
	}
}
