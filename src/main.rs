//! PosterBot CLI entry point.

use anyhow::Result;
use clap::Parser;
use posterbot::cli::{commands, Cli, Commands};
use posterbot::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = || {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| format!("posterbot={}", log_level)))
    };

    std::fs::create_dir_all(settings.logs_dir())?;
    let file_appender = tracing_appender::rolling::daily(settings.logs_dir(), "posterbot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(filter()),
        )
        .init();

    std::fs::create_dir_all(settings.output_dir())?;

    match cli.command {
        Commands::Run {
            topic,
            count,
            distribute_to,
            no_distribute,
            strategy,
        } => {
            commands::run_pipeline(&topic, count, distribute_to, no_distribute, strategy, settings).await?;
        }

        Commands::Topics => {
            commands::run_topics(&settings)?;
        }

        Commands::Validate { topic } => {
            commands::run_validate(&topic, &settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, config_path, settings)?;
        }

        Commands::TikTokAuth => {
            commands::run_tiktok_auth(&settings).await?;
        }
    }

    Ok(())
}
