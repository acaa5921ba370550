use crate::domain::price::{AlertEvent, PriceRecord};
use crate::storage::history::History;
use rust_decimal::Decimal;

/// Compares each fresh record with the most recent prior record for its product
/// and returns an alert for every drop steeper than `threshold`.
///
/// Only the latest observation is used as the baseline, never the historical
/// minimum, so `100 -> 90 -> 95 -> 85` alerts on 90 and then compares 85 with 95.
/// Products without a baseline, or whose baseline is zero, never alert.
pub fn evaluate(
    history: &History,
    fresh_records: &[PriceRecord],
    threshold: Decimal,
) -> Vec<AlertEvent> {
    fresh_records
        .iter()
        .filter_map(|fresh| {
            let previous = history.most_recent(&fresh.product_id)?;
            check_drop(previous, fresh, threshold)
        })
        .collect()
}

fn check_drop(previous: &PriceRecord, fresh: &PriceRecord, threshold: Decimal) -> Option<AlertEvent> {
    if previous.price.is_zero() {
        tracing::debug!(
            product_id = %fresh.product_id,
            "previous price is zero; not comparable"
        );
        return None;
    }

    let Some(drop_fraction) = fresh
        .price
        .checked_sub(previous.price)
        .and_then(|delta| delta.checked_div(previous.price))
    else {
        tracing::warn!(
            product_id = %fresh.product_id,
            previous = %previous.price,
            current = %fresh.price,
            "price change out of decimal range; not comparable"
        );
        return None;
    };
    if drop_fraction >= -threshold {
        return None;
    }

    let event = AlertEvent {
        product_id: fresh.product_id.clone(),
        previous_price: previous.price,
        current_price: fresh.price,
        drop_fraction,
        source_url: fresh.source_url.clone(),
    };

    tracing::info!(
        product_id = %event.product_id,
        previous = %event.previous_price,
        current = %event.current_price,
        drop_pct = %event.drop_percent().round_dp(2),
        "price drop detected"
    );
    Some(event)
}
