//! playmake - Command-line tool for building, playing and publishing game projects

use std::process::ExitCode;

use playmake::cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("playmake=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run()
}
