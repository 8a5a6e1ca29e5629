//! Civici Index - CSV to JSON shard builder

use civici_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use civici_index::{Cli, Pipeline};
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let base = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("civici-index")
        .build();

    // Environment variables override the flags
    let log_config = match base.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment: {}", e);
            base
        },
    };

    // The index build works without logging
    let _ = init_logging(&log_config);

    let mut pipeline = Pipeline::new(cli.into_config());
    match pipeline.run().await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(summary) => {
            eprintln!(
                "Error: {} of the output files could not be written",
                summary.write.failures.len()
            );
            ExitCode::FAILURE
        },
        Err(e) => {
            error!(error = %e, state = ?pipeline.state(), "Index build failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
