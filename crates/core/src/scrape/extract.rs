use crate::scrape::error::ExtractError;
use anyhow::Context;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;

const PRICE_ANCHOR: &str = "div#corePriceDisplay_desktop_feature_div";
const OFFSCREEN_PRICE: &str = "span.a-offscreen";
const WHOLE_PRICE: &str = "span.a-price-whole";
const FRACTION_PRICE: &str = "span.a-price-fraction";

// Letters (locale labels such as "US"), currency symbols and any whitespace.
const PRICE_NOISE: &str = r"[\p{L}\p{Sc}\s]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Full textual price inside the primary price container.
    AnchorOffscreen,
    /// Whole part (plus fraction, if rendered) inside the primary price container.
    AnchorWhole,
    /// Any full textual price on the page.
    GlobalOffscreen,
}

/// Tried in order; the first strategy that yields non-empty text wins.
pub const STRATEGIES: [Strategy; 3] = [
    Strategy::AnchorOffscreen,
    Strategy::AnchorWhole,
    Strategy::GlobalOffscreen,
];

#[derive(Debug, Clone)]
pub struct PriceExtractor {
    anchor: Selector,
    offscreen: Selector,
    whole: Selector,
    fraction: Selector,
    noise: Regex,
}

impl PriceExtractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            anchor: selector(PRICE_ANCHOR)?,
            offscreen: selector(OFFSCREEN_PRICE)?,
            whole: selector(WHOLE_PRICE)?,
            fraction: selector(FRACTION_PRICE)?,
            noise: Regex::new(PRICE_NOISE).context("invalid price noise pattern")?,
        })
    }

    pub fn extract_price(&self, page_content: &str) -> Result<Decimal, ExtractError> {
        let document = Html::parse_document(page_content);
        let (strategy, raw) = STRATEGIES
            .iter()
            .find_map(|s| self.locate(*s, &document).map(|text| (*s, text)))
            .ok_or(ExtractError::NotFound)?;

        tracing::debug!(?strategy, raw = %raw, "price text located");
        self.normalize_price_text(&raw)
    }

    fn locate(&self, strategy: Strategy, document: &Html) -> Option<String> {
        match strategy {
            Strategy::AnchorOffscreen => {
                let anchor = document.select(&self.anchor).next()?;
                first_text(anchor.select(&self.offscreen))
            }
            Strategy::AnchorWhole => {
                let anchor = document.select(&self.anchor).next()?;
                let whole = first_text(anchor.select(&self.whole))?;
                match first_text(anchor.select(&self.fraction)) {
                    Some(fraction) if whole.ends_with('.') => Some(format!("{whole}{fraction}")),
                    Some(fraction) => Some(format!("{whole}.{fraction}")),
                    None => Some(whole),
                }
            }
            Strategy::GlobalOffscreen => first_text(document.select(&self.offscreen)),
        }
    }

    /// Turns displayed price text such as `US$1,234.56` into a decimal.
    /// Comma is the thousands separator and period the decimal point.
    pub fn normalize_price_text(&self, raw: &str) -> Result<Decimal, ExtractError> {
        let malformed = || ExtractError::Malformed {
            raw: raw.to_string(),
        };

        let stripped = self.noise.replace_all(raw, "");
        let cleaned = stripped.replace(',', "");
        let cleaned = cleaned.strip_suffix('.').unwrap_or(&cleaned);
        if cleaned.is_empty() {
            return Err(malformed());
        }

        let price = Decimal::from_str(cleaned).map_err(|_| malformed())?;
        if price.is_sign_negative() {
            return Err(malformed());
        }
        Ok(price)
    }
}

fn selector(css: &'static str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {css}: {e}"))
}

fn first_text<'a>(mut elements: impl Iterator<Item = ElementRef<'a>>) -> Option<String> {
    elements.find_map(|el| {
        let text = el.text().collect::<String>();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}
