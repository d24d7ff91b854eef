//! Shared fixtures for unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::channel::Outbound;
use crate::outcome::{CommandOutcome, OutcomeSink};

/// Sink that keeps every outcome for inspection.
#[derive(Default)]
pub(crate) struct RecordingSink {
	outcomes: Mutex<Vec<CommandOutcome>>,
}

impl RecordingSink {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn outcomes(&self) -> Vec<CommandOutcome> {
		self.outcomes.lock().clone()
	}
}

impl OutcomeSink for RecordingSink {
	fn report(&self, outcome: CommandOutcome) {
		self.outcomes.lock().push(outcome);
	}
}

pub(crate) async fn settle() {
	for _ in 0..16 {
		tokio::task::yield_now().await;
	}
}

/// Drains every queued text frame as JSON, skipping probes.
pub(crate) fn drain_json(rx: &mut UnboundedReceiver<Outbound>) -> Vec<serde_json::Value> {
	let mut frames = Vec::new();
	while let Ok(item) = rx.try_recv() {
		if let Outbound::Text(text) = item {
			frames.push(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)));
		}
	}
	frames
}
