use shellmux::{Result, cli, config, log};

use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let args = cli::main_args();

    // Initialize logging
    let logger = log::Logger::new();
    let config_debug = match config::get_config().read() {
        Ok(config) => config.settings.debug_mode,
        Err(_) => false,
    };
    if args.debug || config_debug {
        logger.enable_debug();
        if let Err(err) = logger.log_debug("Debug mode enabled") {
            eprintln!("Failed to initialize debug logging: {}", err);
            return Ok(ExitCode::FAILURE);
        }
    }

    let exit_code = cli::run(args);

    if let Err(err) = logger.flush() {
        eprintln!("Failed to flush logs: {}", err);
    }

    exit_code
}
