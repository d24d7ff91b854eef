//! Resolves the gateway configuration from an optional file plus flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tabrelay::GatewayConfig;

use crate::cli::ServeArgs;

/// File values first, then any flag that was given.
pub fn resolve(args: &ServeArgs) -> Result<GatewayConfig> {
	let mut config = match &args.config {
		Some(path) => load_file(path)?,
		None => GatewayConfig::default(),
	};

	if let Some(host) = &args.host {
		config.host = host.clone();
	}
	if let Some(port) = args.port {
		config.port = port;
	}
	if let Some(secs) = args.session_timeout_secs {
		config.session_timeout = Duration::from_secs(secs);
	}
	if let Some(secs) = args.command_timeout_secs {
		config.command_timeout = Duration::from_secs(secs);
	}
	if let Some(store) = &args.store {
		config.store_path = Some(store.clone());
	}

	config.validate()?;
	Ok(config)
}

fn load_file(path: &Path) -> Result<GatewayConfig> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read config file {}", path.display()))?;
	serde_json::from_str(&content)
		.with_context(|| format!("Invalid config file {}", path.display()))
}
