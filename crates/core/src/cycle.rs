use crate::alert;
use crate::domain::price::{PriceRecord, TrackedProduct};
use crate::notify::Notifier;
use crate::scrape::{PageFetcher, PriceExtractor};
use crate::storage::history;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::path::Path;

/// Everything one fetch cycle needs, borrowed from the caller.
pub struct CycleContext<'a> {
    pub products: &'a [TrackedProduct],
    pub threshold: Decimal,
    pub history_path: &'a Path,
    pub fetcher: &'a dyn PageFetcher,
    pub notifier: &'a dyn Notifier,
    pub extractor: &'a PriceExtractor,
    /// Evaluate and log alerts without sending them or touching history.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tracked: usize,
    pub fetched: usize,
    pub failed: usize,
    pub alerts: usize,
    pub notified: usize,
    pub notify_failures: usize,
    /// Rows in the store after the append, if one happened.
    pub history_total: Option<usize>,
    pub dry_run: bool,
}

/// Runs load -> fetch -> evaluate & persist once.
///
/// Per-product and per-alert failures are logged and counted. Only storage
/// errors (load or append) are returned.
pub async fn run_cycle(
    ctx: CycleContext<'_>,
    observed_at: NaiveDateTime,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary {
        tracked: ctx.products.len(),
        dry_run: ctx.dry_run,
        ..Default::default()
    };

    let snapshot = history::load(ctx.history_path)?;

    let fresh = fetch_all(&ctx, observed_at, &mut summary).await;
    if fresh.is_empty() {
        tracing::warn!(
            tracked = summary.tracked,
            failed = summary.failed,
            "no prices extracted; history not updated"
        );
        return Ok(summary);
    }

    let alerts = alert::evaluate(&snapshot, &fresh, ctx.threshold);
    summary.alerts = alerts.len();

    for event in &alerts {
        if ctx.dry_run {
            tracing::info!(product_id = %event.product_id, dry_run = true, "alert not sent");
            continue;
        }

        match ctx.notifier.notify(event).await {
            Ok(()) => {
                summary.notified += 1;
                tracing::info!(product_id = %event.product_id, "price alert sent");
            }
            Err(err) => {
                summary.notify_failures += 1;
                tracing::warn!(
                    product_id = %event.product_id,
                    error = %err,
                    "price alert not delivered"
                );
            }
        }
    }

    if ctx.dry_run {
        tracing::info!(records = fresh.len(), dry_run = true, "history not written");
        return Ok(summary);
    }

    let total = history::append(ctx.history_path, &fresh)?;
    summary.history_total = Some(total);
    tracing::info!(
        path = %ctx.history_path.display(),
        appended = fresh.len(),
        total,
        "history saved"
    );

    Ok(summary)
}

async fn fetch_all(
    ctx: &CycleContext<'_>,
    observed_at: NaiveDateTime,
    summary: &mut RunSummary,
) -> Vec<PriceRecord> {
    let mut fresh = Vec::with_capacity(ctx.products.len());

    for product in ctx.products {
        match fetch_one(ctx, product).await {
            Ok(price) => {
                tracing::info!(product_id = %product.product_id, %price, "price extracted");
                fresh.push(product.observe(price, observed_at));
                summary.fetched += 1;
            }
            Err(err) => {
                tracing::warn!(
                    product_id = %product.product_id,
                    url = %product.source_url,
                    error = %err,
                    "price fetch failed; skipping product"
                );
                summary.failed += 1;
            }
        }
    }

    fresh
}

async fn fetch_one(ctx: &CycleContext<'_>, product: &TrackedProduct) -> anyhow::Result<Decimal> {
    let page = ctx.fetcher.fetch_page(&product.source_url).await?;
    Ok(ctx.extractor.extract_price(&page)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::AlertEvent;
    use crate::notify::NotifyError;
    use crate::scrape::FetchError;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages; URLs without a page fail like an HTTP 404.
    struct FakeFetcher {
        pages: Mutex<HashMap<String, String>>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                pages: Mutex::new(HashMap::new()),
            }
        }

        fn set_price(&self, url: &str, price: &str) {
            let page = format!(
                r#"<div id="corePriceDisplay_desktop_feature_div"><span class="a-offscreen">{price}</span></div>"#
            );
            self.pages.lock().unwrap().insert(url.to_string(), page);
        }

        fn set_page(&self, url: &str, page: &str) {
            self.pages.lock().unwrap().insert(url.to_string(), page.to_string());
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or(FetchError::Status(reqwest::StatusCode::NOT_FOUND))
        }
    }

    /// Records every attempt; fails for products listed in `failing`.
    #[derive(Default)]
    struct FakeNotifier {
        failing: Vec<String>,
        attempts: Mutex<Vec<AlertEvent>>,
    }

    #[async_trait::async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
            self.attempts.lock().unwrap().push(event.clone());
            if self.failing.contains(&event.product_id) {
                Err(NotifyError::MissingCredentials)
            } else {
                Ok(())
            }
        }
    }

    fn run_at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, day)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn ctx<'a>(
        products: &'a [TrackedProduct],
        path: &'a Path,
        fetcher: &'a FakeFetcher,
        notifier: &'a FakeNotifier,
        extractor: &'a PriceExtractor,
    ) -> CycleContext<'a> {
        CycleContext {
            products,
            threshold: crate::config::default_drop_threshold(),
            history_path: path,
            fetcher,
            notifier,
            extractor,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn three_runs_compare_against_latest_price() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historial_precios.csv");
        let products = vec![TrackedProduct::new("X", "https://shop.example/x")];
        let extractor = PriceExtractor::new().unwrap();
        let fetcher = FakeFetcher::new();
        let notifier = FakeNotifier::default();

        fetcher.set_price("https://shop.example/x", "$100.00");
        let first = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(1))
            .await
            .unwrap();
        assert_eq!(first.alerts, 0);
        assert_eq!(first.history_total, Some(1));
        let history = history::load(&path).unwrap();
        assert_eq!(history.most_recent("X").unwrap().price, Decimal::new(100, 0));

        fetcher.set_price("https://shop.example/x", "$90.00");
        let second = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(2))
            .await
            .unwrap();
        assert_eq!(second.alerts, 1);
        assert_eq!(second.notified, 1);
        {
            let attempts = notifier.attempts.lock().unwrap();
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].previous_price, Decimal::new(100, 0));
            assert_eq!(attempts[0].current_price, Decimal::new(90, 0));
            assert_eq!(attempts[0].drop_fraction, Decimal::new(-10, 2));
        }

        fetcher.set_price("https://shop.example/x", "$88.00");
        let third = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(3))
            .await
            .unwrap();
        assert_eq!(third.alerts, 0);
        assert_eq!(third.history_total, Some(3));
        assert_eq!(notifier.attempts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notify_failure_does_not_block_other_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        std::fs::write(
            &path,
            "Fecha,Componente,Precio,URL\n\
             2026-05-01 09:30:00,GPU,500,https://shop.example/gpu\n\
             2026-05-01 09:30:00,CPU,400,https://shop.example/cpu\n",
        )
        .unwrap();

        let products = vec![
            TrackedProduct::new("GPU", "https://shop.example/gpu"),
            TrackedProduct::new("CPU", "https://shop.example/cpu"),
        ];
        let extractor = PriceExtractor::new().unwrap();
        let fetcher = FakeFetcher::new();
        fetcher.set_price("https://shop.example/gpu", "$400.00");
        fetcher.set_price("https://shop.example/cpu", "$300.00");
        let notifier = FakeNotifier {
            failing: vec!["GPU".to_string()],
            ..Default::default()
        };

        let summary = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(2))
            .await
            .unwrap();

        assert_eq!(summary.alerts, 2);
        assert_eq!(summary.notify_failures, 1);
        assert_eq!(summary.notified, 1);
        let attempted: Vec<_> = notifier
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.product_id.clone())
            .collect();
        assert_eq!(attempted, vec!["GPU".to_string(), "CPU".to_string()]);
        assert_eq!(summary.history_total, Some(4));
    }

    #[tokio::test]
    async fn failed_products_are_skipped_and_others_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        let products = vec![
            TrackedProduct::new("GPU", "https://shop.example/gpu"),
            TrackedProduct::new("CPU", "https://shop.example/cpu"),
            TrackedProduct::new("SSD", "https://shop.example/ssd"),
        ];
        let extractor = PriceExtractor::new().unwrap();
        let fetcher = FakeFetcher::new();
        fetcher.set_price("https://shop.example/gpu", "$549.99");
        fetcher.set_page("https://shop.example/cpu", "<html>captcha</html>");

        let notifier = FakeNotifier::default();
        let summary = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(1))
            .await
            .unwrap();

        assert_eq!(summary.tracked, 3);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.failed, 2);
        let history = history::load(&path).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.records()[0].product_id, "GPU");
        assert_eq!(history.records()[0].timestamp, run_at(1));
    }

    #[tokio::test]
    async fn nothing_extracted_leaves_history_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        let products = vec![TrackedProduct::new("GPU", "https://shop.example/gpu")];
        let extractor = PriceExtractor::new().unwrap();
        let fetcher = FakeFetcher::new();
        let notifier = FakeNotifier::default();

        let summary = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(1))
            .await
            .unwrap();

        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.history_total, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dry_run_neither_sends_nor_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        let original =
            "Fecha,Componente,Precio,URL\n2026-05-01 09:30:00,GPU,100,https://shop.example/gpu\n";
        std::fs::write(&path, original).unwrap();

        let products = vec![TrackedProduct::new("GPU", "https://shop.example/gpu")];
        let extractor = PriceExtractor::new().unwrap();
        let fetcher = FakeFetcher::new();
        fetcher.set_price("https://shop.example/gpu", "$80.00");
        let notifier = FakeNotifier::default();

        let mut context = ctx(&products, &path, &fetcher, &notifier, &extractor);
        context.dry_run = true;
        let summary = run_cycle(context, run_at(2)).await.unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.alerts, 1);
        assert_eq!(summary.notified, 0);
        assert!(notifier.attempts.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn malformed_history_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        std::fs::write(&path, "when,what\n1,2\n").unwrap();

        let products = vec![TrackedProduct::new("GPU", "https://shop.example/gpu")];
        let extractor = PriceExtractor::new().unwrap();
        let fetcher = FakeFetcher::new();
        fetcher.set_price("https://shop.example/gpu", "$80.00");
        let notifier = FakeNotifier::default();

        let res = run_cycle(ctx(&products, &path, &fetcher, &notifier, &extractor), run_at(2)).await;
        assert!(res.is_err());
    }
}
