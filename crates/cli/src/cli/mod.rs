
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};
use tabrelay::protocol::DEFAULT_PORT;

/// Relay gateway between controllers and browser-extension agents.
#[derive(Parser, Debug)]
#[command(name = "tabrelay")]
#[command(about = "Relay gateway between controllers and browser-extension agents")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the gateway.
	Serve(ServeArgs),
	/// Send one controller command and print the replies.
	Send(SendArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
	/// Address to bind (default 127.0.0.1).
	#[arg(long, value_name = "HOST")]
	pub host: Option<String>,

	/// Port to listen on.
	#[arg(short, long, value_name = "PORT")]
	pub port: Option<u16>,

	/// Seconds an agent may stay silent before its session is dropped.
	#[arg(long, value_name = "SECS")]
	pub session_timeout_secs: Option<u64>,

	/// Seconds a dispatched command may wait for its result.
	#[arg(long, value_name = "SECS")]
	pub command_timeout_secs: Option<u64>,

	/// JSON file recording agent online/offline state.
	#[arg(long, value_name = "FILE")]
	pub store: Option<PathBuf>,

	/// JSON config file; flags override its values.
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
	/// Gateway WebSocket endpoint.
	#[arg(long, value_name = "URL", default_value_t = default_url())]
	pub url: String,

	/// Seconds to keep printing replies after sending.
	#[arg(long, value_name = "SECS", default_value_t = 5)]
	pub wait_secs: u64,

	/// Command line, with or without the `main:` prefix
	/// (for example: goto url=https://example.com browser=abc).
	#[arg(value_name = "COMMAND", required = true, trailing_var_arg = true)]
	pub command: Vec<String>,
}

fn default_url() -> String {
	format!("ws://127.0.0.1:{DEFAULT_PORT}/ws")
}

/// Help colors in cargo's style: green headers, cyan literals.
pub fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}
