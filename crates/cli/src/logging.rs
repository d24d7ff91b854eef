use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default directives for a `-v` count.
///
/// 0 keeps warnings only (evictions, timeouts, store failures), 1 adds
/// connection and dispatch events, 2+ logs every message.
pub fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info,hyper=warn,tungstenite=warn",
		_ => "debug",
	}
}

/// Installs the global subscriber on stderr. `RUST_LOG` wins over the flag.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
		.with_target(true)
		.compact()
		.init();
}
