//! The transport seam: a bidirectional message channel per connection.
//!
//! The gateway only ever pushes text and keepalive probes into a channel.
//! Arrival and close notifications flow the other way, from the transport
//! into [`Gateway`](crate::Gateway).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
	/// Allocates a fresh id.
	pub fn next() -> Self {
		ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
	/// The peer is gone; nothing more can be delivered.
	#[error("channel {0} closed")]
	Closed(ChannelId),
}

/// Outbound half of a connection.
///
/// Sends must not block: implementations queue the message and let the
/// transport's writer drain it.
pub trait MessageChannel: Send + Sync + fmt::Debug {
	fn id(&self) -> ChannelId;

	/// Queues a text frame.
	fn send_text(&self, text: String) -> Result<(), ChannelError>;

	/// Queues a transport-level keepalive probe (a WebSocket ping).
	fn probe(&self) -> Result<(), ChannelError>;
}

/// What a [`QueueChannel`] hands to the transport writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
	Text(String),
	Probe,
}

/// [`MessageChannel`] backed by an unbounded queue.
///
/// The transport owns the receiving end and forwards each [`Outbound`] to the
/// socket. Once the receiver is dropped every send fails with
/// [`ChannelError::Closed`].
#[derive(Debug)]
pub struct QueueChannel {
	id: ChannelId,
	tx: mpsc::UnboundedSender<Outbound>,
}

impl QueueChannel {
	pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let channel = Arc::new(Self {
			id: ChannelId::next(),
			tx,
		});
		(channel, rx)
	}

	fn push(&self, item: Outbound) -> Result<(), ChannelError> {
		self.tx.send(item).map_err(|_| ChannelError::Closed(self.id))
	}
}

impl MessageChannel for QueueChannel {
	fn id(&self) -> ChannelId {
		self.id
	}

	fn send_text(&self, text: String) -> Result<(), ChannelError> {
		self.push(Outbound::Text(text))
	}

	fn probe(&self) -> Result<(), ChannelError> {
		self.push(Outbound::Probe)
	}
}
