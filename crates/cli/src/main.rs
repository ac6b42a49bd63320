use clap::Parser;
use tabrun_cli::cli::Cli;
use tabrun_cli::error::CliError;
use tabrun_cli::output::{self, OutputFormat, ResultBuilder};
use tabrun_cli::{commands, logging};

fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();

	// A clock paused from the first tick keeps scripted offsets on exact milliseconds.
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.start_paused(cli.command.uses_virtual_time())
		.build();
	let runtime = match runtime {
		Ok(runtime) => runtime,
		Err(err) => {
			handle_error(command, CliError::Runtime(err), format);
			std::process::exit(1);
		}
	};

	if let Err(err) = runtime.block_on(commands::dispatch(cli, format)) {
		handle_error(command, err, format);
		std::process::exit(1);
	}
}

fn handle_error(command: &str, err: CliError, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// Always print to stderr for humans
	output::print_error_stderr(&cmd_error);

	// JSON consumers also get the failed envelope on stdout
	if format == OutputFormat::Json {
		let result: output::CommandResult<()> = ResultBuilder::new(command).error(cmd_error).build();
		output::print_result(&result, format);
	}
}
