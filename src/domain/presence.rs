//! First-party stockout analysis over a trailing window and the realistic
//! resale price derived from it.
//!
//! Each sample's value holds on the half-open interval `[t_i, t_{i+1})`; the
//! last sample's value holds until `now`. Intervals are clipped to
//! `[now - window, now)` before anything is measured.

use super::channels::current_price;
use super::entities::{cents_to_major, Channel, CompetitiveFlag, PresenceAnalysis, ProductSnapshot};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Default trailing window for stockout measurement.
pub const STOCKOUT_WINDOW_DAYS: i64 = 90;
/// Longest window a configuration may ask for.
pub const MAX_STOCKOUT_WINDOW_DAYS: i64 = 36_500;

/// `now` is in the same minute offsets the snapshot uses.
pub fn analyze_presence(snapshot: &ProductSnapshot, now: i64, window_days: i64) -> PresenceAnalysis {
    let window_start = now.saturating_sub(window_days.saturating_mul(MINUTES_PER_DAY));
    let samples = snapshot
        .series(Channel::FirstParty)
        .map(|series| series.samples())
        .unwrap_or_default();

    let mut total_duration = 0_i64;
    let mut stockout_duration = 0_i64;
    let mut stockout_spans = Vec::new();

    for (index, sample) in samples.iter().enumerate() {
        let end = samples.get(index + 1).map(|next| next.minute).unwrap_or(now);
        let Some((start, end)) = clip(sample.minute, end, window_start, now) else {
            continue;
        };
        total_duration += end - start;
        if sample.is_out_of_stock() {
            stockout_duration += end - start;
            stockout_spans.push((start, end));
        }
    }

    let stockout_percent = (total_duration > 0).then(|| {
        (100.0 * stockout_duration as f64 / total_duration as f64).round() as u32
    });
    let mut flag = CompetitiveFlag::from_stockout(stockout_percent);

    let mut during_stockout: Vec<f64> = snapshot
        .series(Channel::BuyBox)
        .map(|series| series.samples())
        .unwrap_or_default()
        .iter()
        .filter(|sample| sample.value > 0)
        .filter(|sample| {
            stockout_spans
                .iter()
                .any(|(start, end)| sample.minute >= *start && sample.minute < *end)
        })
        .map(|sample| cents_to_major(sample.value))
        .collect();

    let realistic_price = match median(&mut during_stockout) {
        Some(price) => Some(price),
        None if stockout_percent == Some(0) => {
            // First party never left; competitors only ever matched it.
            flag = CompetitiveFlag::Unfavorable;
            current_price(snapshot, Channel::New)
        }
        None => None,
    };

    PresenceAnalysis {
        stockout_percent,
        realistic_price,
        flag,
    }
}

fn clip(start: i64, end: i64, window_start: i64, now: i64) -> Option<(i64, i64)> {
    let start = start.max(window_start);
    let end = end.min(now);
    (end > start).then_some((start, end))
}

/// Middle value; the mean of the two middle values on even counts.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
