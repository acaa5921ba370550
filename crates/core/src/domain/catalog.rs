use crate::domain::price::TrackedProduct;
use anyhow::{ensure, Context};
use std::collections::BTreeSet;
use std::path::Path;

const DEFAULT_CATALOG: &[(&str, &str)] = &[
    (
        "RTX 4070 Ti",
        "https://www.amazon.com/-/es/GIGABYTE-ventiladores-WINDFORCE-GV-N407TGAMING-OC-12GD/dp/B0BRR2R8HH/ref=sr_1_3?__mk_es_US=%C3%85M%C3%85%C5%BD%C3%95%C3%91&sr=8-3",
    ),
    (
        "Ryzen 7 9800X3D",
        "https://www.amazon.com/-/es/AMD-Procesador-escritorio-9800X3D-n%C3%BAcleos/dp/B0DKFMSMYK/ref=sr_1_1?__mk_es_US=%C3%85M%C3%85%C5%BD%C3%95%C3%91&sr=8-1",
    ),
    (
        "M.2 1TB",
        "https://www.amazon.com/computadoras-port%C3%A1tiles-escritorio-consolas-recuperaci%C3%B3n/dp/B0DC8VPSHV/ref=sr_1_2_sspa?__mk_es_US=%C3%85M%C3%85%C5%BD%C3%95%C3%91&sr=8-2-spons&sp_csd=d2lkZ2V0TmFtZT1zcF9atf",
    ),
];

pub fn default_products() -> Vec<TrackedProduct> {
    DEFAULT_CATALOG
        .iter()
        .map(|(id, url)| TrackedProduct::new(*id, *url))
        .collect()
}

/// Reads a JSON array of `{"product_id": ..., "source_url": ...}` objects.
pub fn load_products_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<TrackedProduct>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read products file {}", path.display()))?;
    parse_products(&text).with_context(|| format!("invalid products file {}", path.display()))
}

pub fn parse_products(json: &str) -> anyhow::Result<Vec<TrackedProduct>> {
    let products = serde_json::from_str::<Vec<TrackedProduct>>(json)
        .context("products must be a JSON array of {product_id, source_url}")?;
    Ok(products
        .into_iter()
        .map(|p| TrackedProduct::new(p.product_id.trim(), p.source_url.trim()))
        .collect())
}

pub fn validate_products(products: &[TrackedProduct]) -> anyhow::Result<()> {
    ensure!(!products.is_empty(), "at least one tracked product is required");

    let mut seen = BTreeSet::<&str>::new();
    for product in products {
        let id = product.product_id.as_str();
        ensure!(!id.trim().is_empty(), "product_id must be non-empty");
        ensure!(seen.insert(id), "duplicate product_id: {id}");

        let url = reqwest::Url::parse(&product.source_url)
            .with_context(|| format!("invalid source_url for {id}: {}", product.source_url))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "source_url for {id} must be http(s) (got {})",
            url.scheme()
        );
    }

    Ok(())
}
