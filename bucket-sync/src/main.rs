use bucket_sync::cli::{check_argument_order, exit_code_for, run, Cli};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so the summary on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = check_argument_order(args.get(1..).unwrap_or_default()) {
        eprintln!("ERROR: {e}");
        eprintln!("\n{}", Cli::command().render_usage());
        std::process::exit(e.exit_code());
    }

    let cli = Cli::parse_from(&args);
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(report) => tracing::info!(
            failures = report.failures.len(),
            "CLI completed successfully"
        ),
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("ERROR: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}
