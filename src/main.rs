use clap::Parser;
use tracing_subscriber::EnvFilter;

use sinkprobe::cli;
use sinkprobe::errors::ScanError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .with_writer(std::io::stderr)
            .init();
    }

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        cli::Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        cli::Commands::Validate(args) => cli::scan::handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            ScanError::Config(_) | ScanError::Yaml(_) => 2,
            ScanError::InvalidTarget(_) => 3,
            ScanError::FatalBrowser(_) => 4,
            ScanError::CatalogLoad(_) => 5,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}
