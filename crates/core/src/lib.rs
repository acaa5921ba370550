pub mod alert;
pub mod cycle;
pub mod domain;
pub mod notify;
pub mod scrape;
pub mod storage;

pub mod config {
    use crate::domain::catalog;
    use crate::domain::price::TrackedProduct;
    use anyhow::Context;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use std::str::FromStr;

    pub const DEFAULT_HISTORY_PATH: &str = "historial_precios.csv";
    pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
    pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

    /// A drop of more than 5% against the last observation triggers an alert.
    pub fn default_drop_threshold() -> Decimal {
        Decimal::new(5, 2)
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub email_user: Option<String>,
        pub email_password: Option<String>,
        pub smtp_host: String,
        pub sentry_dsn: Option<String>,
        pub history_path: PathBuf,
        pub drop_threshold: Decimal,
        /// Total per-request budget for a product page fetch.
        pub fetch_timeout_secs: u64,
        pub products: Vec<TrackedProduct>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let drop_threshold = match non_empty_var("PRICE_DROP_THRESHOLD") {
                Some(s) => parse_threshold(&s)?,
                None => default_drop_threshold(),
            };

            let fetch_timeout_secs = match non_empty_var("FETCH_TIMEOUT_SECS") {
                Some(s) => parse_fetch_timeout(&s)?,
                None => DEFAULT_FETCH_TIMEOUT_SECS,
            };

            let products = match non_empty_var("PRODUCTS_FILE") {
                Some(path) => catalog::load_products_file(&path)?,
                None => catalog::default_products(),
            };
            catalog::validate_products(&products)?;

            Ok(Self {
                email_user: non_empty_var("EMAIL_USER"),
                email_password: non_empty_var("EMAIL_PASSWORD"),
                smtp_host: non_empty_var("SMTP_HOST")
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                history_path: non_empty_var("HISTORY_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH)),
                drop_threshold,
                fetch_timeout_secs,
                products,
            })
        }

        /// Both halves of the SMTP login, or `None` if either is missing.
        pub fn email_credentials(&self) -> Option<(&str, &str)> {
            let user = self.email_user.as_deref()?;
            let password = self.email_password.as_deref()?;
            Some((user, password))
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn parse_threshold(s: &str) -> anyhow::Result<Decimal> {
        let t = Decimal::from_str(s.trim())
            .with_context(|| format!("PRICE_DROP_THRESHOLD is not a decimal: {s}"))?;
        anyhow::ensure!(
            t >= Decimal::ZERO && t < Decimal::ONE,
            "PRICE_DROP_THRESHOLD must be in [0, 1) (got {t})"
        );
        Ok(t)
    }

    pub fn parse_fetch_timeout(s: &str) -> anyhow::Result<u64> {
        let secs = s
            .trim()
            .parse::<u64>()
            .with_context(|| format!("FETCH_TIMEOUT_SECS is not a whole number of seconds: {s}"))?;
        anyhow::ensure!(secs > 0, "FETCH_TIMEOUT_SECS must be positive");
        Ok(secs)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn threshold_accepts_fraction() {
            assert_eq!(parse_threshold(" 0.10 ").unwrap(), Decimal::new(10, 2));
        }

        #[test]
        fn threshold_rejects_out_of_range_and_garbage() {
            assert!(parse_threshold("1").is_err());
            assert!(parse_threshold("-0.01").is_err());
            assert!(parse_threshold("five percent").is_err());
        }

        #[test]
        fn fetch_timeout_must_be_positive_seconds() {
            assert_eq!(parse_fetch_timeout(" 45 ").unwrap(), 45);
            assert!(parse_fetch_timeout("0").is_err());
            assert!(parse_fetch_timeout("1.5").is_err());
        }

        #[test]
        fn credentials_require_both_halves() {
            let mut settings = Settings {
                email_user: Some("me@example.com".to_string()),
                email_password: None,
                smtp_host: DEFAULT_SMTP_HOST.to_string(),
                sentry_dsn: None,
                history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
                drop_threshold: default_drop_threshold(),
                fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
                products: catalog::default_products(),
            };
            assert!(settings.email_credentials().is_none());

            settings.email_password = Some("app-password".to_string());
            assert_eq!(
                settings.email_credentials(),
                Some(("me@example.com", "app-password"))
            );
        }
    }
}
