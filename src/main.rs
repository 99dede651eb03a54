use clap::Parser;
use tracing::Level;
use tweetmap::config::{AppConfig, Args};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.quiet, args.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    // Logs go to stderr; stdout carries the CSV report
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_args(&args)?;
    tweetmap::run(&config, std::io::stdout().lock())?;

    Ok(())
}
