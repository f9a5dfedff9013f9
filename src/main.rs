//! sx CLI entrypoint

use clap::Parser;

use sx::cli::Cli;
use sx::output;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version surface as "errors" but exit cleanly.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    match cli.execute() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            output::error(&format!("error: {:#}", err));
            std::process::exit(2);
        }
    }
}
