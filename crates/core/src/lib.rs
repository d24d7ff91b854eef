//! Session liveness and command correlation for the tabrelay gateway.
//!
//! The gateway sits between a controller and a fleet of browser-extension
//! agents. This crate holds everything with state or timing in it:
//!
//! - [`SessionRegistry`] - connected agents keyed by access code, with a
//!   per-session liveness deadline backed by a periodic sweep
//! - [`CommandCorrelator`] - in-flight commands keyed by command id, each
//!   with its own expiry
//! - [`CommandRouter`] - turns `main:` command lines into agent commands and
//!   agent results into outcomes
//! - [`PacketHandler`] - the per-message protocol state machine for agents
//! - [`Gateway`] - classifies inbound text and wires the pieces together
//!
//! Transport and persistence are collaborators behind the [`MessageChannel`]
//! and [`AgentStore`] traits.

pub mod channel;
pub mod config;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod outcome;
pub mod packet;
pub mod router;
pub mod session;
pub mod store;
#[cfg(test)]
mod testing;
mod time;

pub use channel::{ChannelError, ChannelId, MessageChannel, Outbound, QueueChannel};
pub use config::GatewayConfig;
pub use correlator::{CommandCorrelator, PendingCommand};
pub use error::{Error, Result};
pub use gateway::{Connection, Gateway, Inbound};
pub use outcome::{CommandOutcome, ForwardingSink, OutcomeSink, OutcomeStatus};
pub use packet::{PacketHandler, Reply};
pub use router::{ControllerCommand, CommandRouter, Invocation, RouteReport, Target};
pub use session::{AgentSession, EvictReason, SessionRegistry, SweepReport};
pub use store::{AgentRecord, AgentStore, MemoryStore};
pub use tabrelay_protocol as protocol;
