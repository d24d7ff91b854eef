//! Axum WebSocket transport for the gateway.
//!
//! Agents and controllers share `/ws`. Each socket gets a [`QueueChannel`]
//! drained by a writer task; the read loop feeds every frame to the
//! [`Gateway`] in arrival order.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tabrelay::{AgentStore, Gateway, GatewayConfig, MemoryStore, Outbound, QueueChannel};
use tokio::net::TcpListener;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::store::JsonFileStore;

/// Binds the configured address and serves until Ctrl+C.
pub async fn run(config: GatewayConfig) -> Result<()> {
	let store: Arc<dyn AgentStore> = match &config.store_path {
		Some(path) => {
			let store = JsonFileStore::new(path);
			info!(target = "tabrelay.server", path = %store.path().display(), "persisting agent state");
			Arc::new(store)
		}
		None => Arc::new(MemoryStore::new()),
	};
	let gateway = Gateway::new(&config, store)?;

	let addr = config.bind_addr();
	let listener = TcpListener::bind(&addr)
		.await
		.with_context(|| format!("Failed to bind gateway to {addr}"))?;
	info!(target = "tabrelay.server", %addr, "gateway listening");

	serve(listener, gateway, shutdown_signal()).await
}

/// Serves `gateway` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, gateway: Gateway, shutdown: F) -> Result<()>
where
	F: Future<Output = ()> + Send + 'static,
{
	let sweeper = gateway.start();
	let result = axum::serve(listener, router(gateway.clone()).into_make_service())
		.with_graceful_shutdown(shutdown)
		.await
		.context("Gateway server error");

	sweeper.abort();
	gateway.flush().await;
	info!(target = "tabrelay.server", "gateway stopped");
	result
}

pub fn router(gateway: Gateway) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route(
			"/ws",
			get(
				|ws: WebSocketUpgrade, State(gateway): State<Gateway>| async move {
					ws.on_upgrade(move |socket| handle_socket(socket, gateway))
				},
			),
		)
		.with_state(gateway)
}

async fn handle_socket(socket: WebSocket, gateway: Gateway) {
	let (channel, rx) = QueueChannel::new();
	let mut conn = gateway.connect(channel);
	let channel_id = conn.channel().id();
	info!(target = "tabrelay.server", channel = %channel_id, "client connected");

	let mut rx_stream = UnboundedReceiverStream::new(rx);
	let (mut ws_tx, mut ws_rx) = socket.split();

	let send_task = tokio::spawn(async move {
		while let Some(item) = rx_stream.next().await {
			let msg = match item {
				Outbound::Text(text) => Message::Text(text.into()),
				Outbound::Probe => Message::Ping(Bytes::new()),
			};
			if ws_tx.send(msg).await.is_err() {
				break;
			}
		}
	});

	while let Some(msg) = ws_rx.next().await {
		match msg {
			Ok(Message::Text(text)) => gateway.on_message(&mut conn, text.as_str()),
			Ok(Message::Pong(_)) => gateway.on_keepalive(&conn),
			Ok(Message::Close(_)) => break,
			Ok(_) => {}
			Err(err) => {
				warn!(target = "tabrelay.server", channel = %channel_id, error = %err, "websocket error");
				break;
			}
		}
	}

	debug!(target = "tabrelay.server", channel = %channel_id, access_code = conn.access_code(), "read loop ended");
	gateway.on_close(conn);
	send_task.abort();
	info!(target = "tabrelay.server", channel = %channel_id, "client disconnected");
}

async fn shutdown_signal() {
	match tokio::signal::ctrl_c().await {
		Ok(()) => info!(target = "tabrelay.server", "received Ctrl+C, shutting down"),
		Err(err) => warn!(target = "tabrelay.server", error = %err, "failed to listen for Ctrl+C"),
	}
}
