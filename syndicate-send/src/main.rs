//! syndicate-send - publish scheduled social posts
//!
//! `run` performs one due-post scan and prints its summary as JSON; it is
//! meant to be invoked by cron or a systemd timer. `watch` repeats the scan
//! in the foreground until interrupted.

use clap::{Parser, Subcommand};
use libsyndicate::logging::{LogFormat, LoggingConfig};
use libsyndicate::{SyndicateError, SyndicateService, TokenCipher};
use std::process::ExitCode;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "syndicate-send")]
#[command(version)]
#[command(about = "Publish scheduled social posts")]
#[command(long_about = "\
syndicate-send - publish scheduled social posts

DESCRIPTION:
    Finds every scheduled post whose time has come and publishes it to all
    connected accounts of its author. Each account gets its own result;
    a post is published when at least one account succeeded.

USAGE:
    # One scan, JSON summary on stdout (for cron)
    syndicate-send run

    # Scan every 30 seconds until Ctrl-C
    syndicate-send watch --interval 30

    # Generate a value for SYNDICATE_ENCRYPTION_KEY
    syndicate-send keygen

ENVIRONMENT:
    SYNDICATE_ENCRYPTION_KEY   base64 32-byte key for stored tokens (required)
    SYNDICATE_CONFIG           config file (default ~/.config/syndicate/config.toml)
    SYNDICATE_DATABASE_PATH    database file, overrides the config file
    TWITTER_CLIENT_ID / TWITTER_CLIENT_SECRET
    LINKEDIN_CLIENT_ID / LINKEDIN_CLIENT_SECRET
    SYNDICATE_LOG_FORMAT       text, json or pretty
    SYNDICATE_LOG_LEVEL        error, warn, info, debug or trace

EXIT CODES:
    0 - Scan completed (individual posts may still have failed)
    1 - Configuration, database or runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (overrides SYNDICATE_LOG_FORMAT)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish every due post once and print a JSON summary
    Run,

    /// Publish due posts repeatedly until interrupted
    Watch {
        /// Seconds between scans
        #[arg(long, value_name = "SECONDS", default_value_t = 60)]
        interval: u64,
    },

    /// Print a new random encryption key
    Keygen,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<SyndicateError>()
                .map(SyndicateError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LoggingConfig::from_env();
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    config.init();
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Keygen => {
            println!("{}", TokenCipher::generate_key());
            Ok(())
        }
        Command::Run => {
            let service = SyndicateService::new().await?;
            let summary = service.dispatcher().publish_due_posts().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Watch { interval } => {
            let service = SyndicateService::new().await?;
            watch(&service, Duration::from_secs(interval.max(1))).await;
            Ok(())
        }
    }
}

async fn watch(service: &SyndicateService, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "syndicate-send watching for due posts");

    loop {
        match service.dispatcher().publish_due_posts().await {
            Ok(summary) if summary.total > 0 => info!(
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                "Scan complete"
            ),
            Ok(_) => {}
            Err(e) => error!("Scan failed: {}", e),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            _ = sleep(interval) => {}
        }
    }
}
