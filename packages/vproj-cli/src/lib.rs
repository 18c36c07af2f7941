pub mod cli;
pub mod commands;
pub mod exit_codes;
pub mod output;

use clap::error::ErrorKind;
use clap::Parser;

/// Parse the command line, exiting with [`exit_codes::USAGE_ERROR`] and the
/// usage text on bad arguments. `--help` and `--version` exit successfully.
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::USAGE_ERROR,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

pub fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
}
