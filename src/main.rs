//! findash - stock prices, news and AI insights from the terminal
//!
//! Reads go through a local file cache with fallback to stale data, so a
//! dashboard still prints when a provider is down or rate limited.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tracing::{info, warn};

use findash::cli::{resolve_ticker, Cli, Command, RefreshArgs, ShowArgs};
use findash::config::Config;
use findash::display;
use findash::error::AppError;
use findash::logging;
use findash::orchestrator::FetchOrchestrator;
use findash::refresh::{RefreshHandle, RefreshJob, RefreshMessage};
use findash::service::DataService;
use findash::source::Sources;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment and flags still apply
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let _guard = logging::init(
        &cli.logging.log_level,
        cli.logging.log_format,
        cli.logging.log_dir.as_deref(),
    )?;
    let config = cli.to_config()?;

    match &cli.command {
        Command::Tickers => {
            print!("{}", display::tickers_listing(&config.tickers));
            Ok(())
        }
        Command::Show(args) => show(&config, args).await,
        Command::Refresh(args) => refresh(&config, args).await,
    }
}

async fn show(config: &Config, args: &ShowArgs) -> Result<(), AppError> {
    let ticker = resolve_ticker(config, &args.ticker)?.clone();

    let orchestrator = FetchOrchestrator::from_config(config);
    logging::log_startup(config, orchestrator.store());
    let sources = Sources::from_config(config)?;
    let service = DataService::new(orchestrator, sources, &config.tickers);

    let dashboard = service.dashboard(&ticker, args.regenerate_insight).await;

    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "{}",
        display::price_section(&ticker, dashboard.price.as_ref())
    )?;
    writeln!(
        stdout,
        "{}",
        display::news_section(dashboard.news.as_ref(), config.news_display_count)
    )?;
    writeln!(
        stdout,
        "{}",
        display::related_section(&ticker, dashboard.related.as_ref())
    )?;
    writeln!(stdout, "{}", display::insight_header(dashboard.insight.as_ref()))?;

    if let Some(insight) = &dashboard.insight {
        if args.no_stream {
            writeln!(stdout, "{}", insight.payload.insight)?;
        } else {
            let mut chars = Box::pin(display::typewriter(
                &insight.payload.insight,
                config.streaming_char_delay,
            ));
            while let Some(c) = chars.next().await {
                write!(stdout, "{c}")?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}

async fn refresh(config: &Config, args: &RefreshArgs) -> Result<(), AppError> {
    let job = RefreshJob::from_config(config, Sources::from_config(config)?);
    logging::log_startup(config, &config.cache_store());

    if !args.watch {
        let summary = job.run_once().await;
        for report in &summary.reports {
            println!("{}", display::refresh_report(report));
        }
        println!("{}", display::refresh_summary(&summary));
        return Ok(());
    }

    let mut handle = RefreshHandle::spawn(Arc::new(job), config.refresh_interval);
    // Registered once so a Ctrl-C between two messages is not lost
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            message = handle.receiver.recv() => match message {
                Some(RefreshMessage::CycleStarted { cycle }) => {
                    info!(cycle, "refresh cycle started");
                }
                Some(RefreshMessage::TickerRefreshed(report)) => {
                    println!("{}", display::refresh_report(&report));
                }
                Some(RefreshMessage::CycleCompleted { cycle, summary }) => {
                    println!("{}", display::refresh_summary(&summary));
                    info!(
                        cycle,
                        next_in_secs = config.refresh_interval.as_secs(),
                        "waiting for next cycle"
                    );
                }
                None => {
                    warn!("refresh task stopped unexpectedly");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("interrupted, stopping background refresh");
                break;
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}
