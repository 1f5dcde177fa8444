use std::process::ExitCode;

use clap::Parser;
use llama_cli::{read_input, run, Cli};
use llama_runtime::LlamaCpp;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(cli.log_level())
        .init();

    let result = read_input(std::io::stdin().lock()).and_then(|input| {
        let mut stdout = std::io::stdout().lock();
        run(LlamaCpp::init, cli.session_config(), &input, &mut stdout)
    });

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Failed: {e}");
            ExitCode::FAILURE
        }
    }
}
