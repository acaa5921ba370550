use anyhow::Context;
use chrono::Timelike;
use clap::Parser;
use pricewatch_core::cycle::{run_cycle, CycleContext, RunSummary};
use pricewatch_core::notify::EmailNotifier;
use pricewatch_core::scrape::{HttpPageFetcher, PriceExtractor};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pricewatch_worker")]
struct Args {
    /// Fetch and evaluate prices, but send no email and leave history untouched.
    #[arg(long)]
    dry_run: bool,

    /// History CSV to read and append to. Overrides HISTORY_PATH.
    #[arg(long)]
    history: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = pricewatch_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(&settings, &args).await;
    match &result {
        Ok(summary) => log_summary(summary),
        Err(err) => {
            sentry_anyhow::capture_anyhow(err);
            tracing::error!(error = %format!("{err:#}"), "price check failed");
        }
    }

    result.map(|_| ())
}

async fn run(
    settings: &pricewatch_core::config::Settings,
    args: &Args,
) -> anyhow::Result<RunSummary> {
    let history_path = args
        .history
        .clone()
        .unwrap_or_else(|| settings.history_path.clone());

    let fetcher = HttpPageFetcher::from_settings(settings)?;
    let notifier = EmailNotifier::from_settings(settings);
    let extractor = PriceExtractor::new()?;

    let observed_at = chrono::Local::now()
        .naive_local()
        .with_nanosecond(0)
        .context("failed to truncate run timestamp")?;

    tracing::info!(
        %observed_at,
        products = settings.products.len(),
        threshold = %settings.drop_threshold,
        history = %history_path.display(),
        dry_run = args.dry_run,
        "starting price check"
    );

    let ctx = CycleContext {
        products: &settings.products,
        threshold: settings.drop_threshold,
        history_path: &history_path,
        fetcher: &fetcher,
        notifier: &notifier,
        extractor: &extractor,
        dry_run: args.dry_run,
    };

    run_cycle(ctx, observed_at).await
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        tracked = summary.tracked,
        fetched = summary.fetched,
        failed = summary.failed,
        alerts = summary.alerts,
        notified = summary.notified,
        notify_failures = summary.notify_failures,
        history_total = ?summary.history_total,
        dry_run = summary.dry_run,
        "price check finished"
    );
}

fn init_sentry(settings: &pricewatch_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
