use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tabrun")]
#[command(about = "Parallel tab orchestration - replay and inspect batches")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default) or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Replay a scripted batch against the orchestrator
	Simulate {
		/// Scenario file (JSON)
		scenario: PathBuf,

		/// Orchestrator config file (JSON); defaults when omitted
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Wait out scripted delays on the wall clock instead of virtual time
		#[arg(long)]
		realtime: bool,
	},

	/// Parse a newline-separated link list into a batch request
	Validate {
		/// Links file, or `-` for stdin
		links: PathBuf,

		/// Origin tab id recorded in the request
		#[arg(long, default_value_t = 1)]
		origin: i32,
	},

	/// Print the effective orchestrator configuration
	Config {
		/// Config file (JSON) merged over defaults
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Simulate { .. } => "simulate",
			Commands::Validate { .. } => "validate",
			Commands::Config { .. } => "config",
		}
	}

	/// Whether the command replays scripted delays on tokio's paused clock.
	pub fn uses_virtual_time(&self) -> bool {
		matches!(self, Commands::Simulate { realtime: false, .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_counts_and_format_is_global() {
		let cli = Cli::try_parse_from(["tabrun", "simulate", "batch.json", "-vv", "-f", "text"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.format, OutputFormat::Text);
		assert!(matches!(cli.command, Commands::Simulate { realtime: false, .. }));
	}

	#[test]
	fn validate_defaults_origin() {
		let cli = Cli::try_parse_from(["tabrun", "validate", "-"]).unwrap();
		match cli.command {
			Commands::Validate { links, origin } => {
				assert_eq!(links, PathBuf::from("-"));
				assert_eq!(origin, 1);
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn only_simulate_without_realtime_pauses_the_clock() {
		let parse = |args: &[&str]| Cli::try_parse_from(args).unwrap().command.uses_virtual_time();
		assert!(parse(&["tabrun", "simulate", "batch.json"]));
		assert!(!parse(&["tabrun", "simulate", "batch.json", "--realtime"]));
		assert!(!parse(&["tabrun", "config"]));
	}

	#[test]
	fn unknown_format_is_rejected() {
		assert!(Cli::try_parse_from(["tabrun", "-f", "yaml", "config"]).is_err());
	}
}
