use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	// 0 = errors only, keep per-target chatter out of the report
	// 1 (-v) = info for the batch lifecycle
	// 2+ (-vv) = debug for every watcher and platform call
	let filter = match verbosity {
		0 => "error",
		1 => "info,tabrun=info",
		_ => "debug,tabrun=trace",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
