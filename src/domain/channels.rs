//! Current and trailing-average prices per sales channel.

use super::entities::{cents_to_major, Channel, ProductSnapshot};

/// Channels consulted for a single best price, highest priority first.
pub const PRICE_PRIORITY: [Channel; 3] = [Channel::FirstParty, Channel::New, Channel::Used];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelPrices {
    /// Last observed price in major units, if the channel currently has an offer.
    pub current: Option<f64>,
    /// Tracker-supplied 180-day average in major units.
    pub trailing_avg: Option<f64>,
}

pub fn channel_prices(snapshot: &ProductSnapshot, channel: Channel) -> ChannelPrices {
    ChannelPrices {
        current: current_price(snapshot, channel),
        trailing_avg: trailing_average_price(snapshot, channel),
    }
}

pub fn current_price(snapshot: &ProductSnapshot, channel: Channel) -> Option<f64> {
    snapshot
        .series(channel)
        .and_then(|series| series.last())
        .map(|sample| sample.value)
        .filter(|value| *value > 0)
        .map(cents_to_major)
}

pub fn trailing_average_price(snapshot: &ProductSnapshot, channel: Channel) -> Option<f64> {
    snapshot.avg180(channel).map(cents_to_major)
}

/// First current price in [`PRICE_PRIORITY`] order; when no channel has a
/// live offer, the first trailing average in the same order.
pub fn best_available_price(snapshot: &ProductSnapshot) -> Option<f64> {
    PRICE_PRIORITY
        .iter()
        .find_map(|channel| current_price(snapshot, *channel))
        .or_else(|| {
            PRICE_PRIORITY
                .iter()
                .find_map(|channel| trailing_average_price(snapshot, *channel))
        })
}
