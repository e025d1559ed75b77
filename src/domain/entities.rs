use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use super::identifier::Isbn;

/// Reserved value a channel reports while that seller has no offer.
pub const OUT_OF_STOCK: i64 = -1;

/// Sales channels tracked for a single product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The marketplace itself selling the item (first-party).
    FirstParty,
    /// Lowest third-party new offer.
    New,
    /// Lowest used offer.
    Used,
    /// Winning offer price, shipping included.
    BuyBox,
    /// Sales rank; lower is better, values are not prices.
    SalesRank,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FirstParty => "first-party",
            Self::New => "third-party new",
            Self::Used => "used",
            Self::BuyBox => "buy box",
            Self::SalesRank => "sales rank",
        }
    }
}

/// One observation: a value that holds from `minute` until the next sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Minutes since the price tracker's epoch.
    pub minute: i64,
    /// Minor currency units (cents) or rank; [`OUT_OF_STOCK`] marks absence.
    pub value: i64,
}

impl Sample {
    pub fn new(minute: i64, value: i64) -> Self {
        Self { minute, value }
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.value == OUT_OF_STOCK
    }
}

/// Chronologically ordered samples for one channel.
///
/// Construction rejects decreasing timestamps, so every `PriceSeries` in the
/// crate satisfies the ordering invariant the interval walk relies on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct PriceSeries {
    samples: Vec<Sample>,
}

impl PriceSeries {
    pub fn new(samples: Vec<Sample>) -> Option<Self> {
        let ordered = samples.windows(2).all(|pair| pair[0].minute <= pair[1].minute);
        ordered.then_some(Self { samples })
    }

    /// Builds from a flat `[minute, value, minute, value, ...]` array.
    /// Truncated or unordered input yields `None`.
    pub fn from_flat(raw: &[i64]) -> Option<Self> {
        if raw.len() % 2 != 0 {
            return None;
        }
        let samples = raw
            .chunks_exact(2)
            .map(|pair| Sample::new(pair[0], pair[1]))
            .collect();
        Self::new(samples)
    }

    /// Builds from `[minute, price, shipping, ...]` triples, folding shipping
    /// into a landed price. An out-of-stock price stays the sentinel.
    pub fn from_flat_triples(raw: &[i64]) -> Option<Self> {
        if raw.len() % 3 != 0 {
            return None;
        }
        let samples = raw
            .chunks_exact(3)
            .map(|triple| {
                let (minute, price, shipping) = (triple[0], triple[1], triple[2]);
                let value = if price < 0 {
                    OUT_OF_STOCK
                } else {
                    price + shipping.max(0)
                };
                Sample::new(minute, value)
            })
            .collect();
        Self::new(samples)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

impl TryFrom<Vec<Sample>> for PriceSeries {
    type Error = String;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        Self::new(samples).ok_or_else(|| "samples are not in chronological order".to_string())
    }
}

impl From<PriceSeries> for Vec<Sample> {
    fn from(series: PriceSeries) -> Self {
        series.samples
    }
}

/// Point-in-time bundle of price-tracking data for one identifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub series: BTreeMap<Channel, PriceSeries>,
    /// 180-day rolling averages (cents, or rank units for [`Channel::SalesRank`]).
    #[serde(default)]
    pub avg180: BTreeMap<Channel, i64>,
    #[serde(default)]
    pub avg90: BTreeMap<Channel, i64>,
    /// Sales-rank drops in the last 90 days; proxy for completed sales.
    #[serde(default)]
    pub sales_rank_drops_90: Option<u32>,
    #[serde(default)]
    pub weight_grams: Option<u32>,
    #[serde(default)]
    pub binding: Option<String>,
}

impl ProductSnapshot {
    pub fn series(&self, channel: Channel) -> Option<&PriceSeries> {
        self.series.get(&channel)
    }

    /// 180-day average if the tracker reported a positive one.
    pub fn avg180(&self, channel: Channel) -> Option<i64> {
        self.avg180.get(&channel).copied().filter(|value| *value > 0)
    }

    pub fn avg90(&self, channel: Channel) -> Option<i64> {
        self.avg90.get(&channel).copied().filter(|value| *value > 0)
    }

    pub fn with_series(mut self, channel: Channel, series: PriceSeries) -> Self {
        self.series.insert(channel, series);
        self
    }
}

/// A candidate purchase found by the listing crawler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub identifier: Isbn,
    pub buy_price_cents: i64,
    #[serde(default)]
    pub shipping_cents: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Listing {
    pub fn new(identifier: Isbn, buy_price_cents: i64, shipping_cents: i64) -> Self {
        Self {
            identifier,
            buy_price_cents,
            shipping_cents,
            title: None,
            source_url: None,
        }
    }

    /// Landed purchase cost in major currency units.
    pub fn total_cost(&self) -> f64 {
        cents_to_major(self.buy_price_cents + self.shipping_cents)
    }
}

pub fn cents_to_major(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// How attractive the first-party seller's absence makes the item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitiveFlag {
    Favorable,
    Neutral,
    #[default]
    Unfavorable,
}

impl CompetitiveFlag {
    pub fn from_stockout(percent: Option<u32>) -> Self {
        match percent {
            Some(p) if p > 50 => Self::Favorable,
            Some(p) if p >= 20 => Self::Neutral,
            _ => Self::Unfavorable,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceAnalysis {
    /// Share of the trailing window the first-party seller was out of stock.
    pub stockout_percent: Option<u32>,
    /// Estimated achievable resale price, major units.
    pub realistic_price: Option<f64>,
    pub flag: CompetitiveFlag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Buy,
    Review,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Buy => "BUY",
            Self::Review => "REVIEW",
            Self::Reject => "REJECT",
        };
        f.write_str(label)
    }
}

/// Outcome of one evaluation; written back by the persistence layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub identifier: Isbn,
    pub decision: Decision,
    pub reason: String,
    pub sell_price: Option<f64>,
    pub fba_profit: Option<f64>,
    pub fbm_profit: Option<f64>,
    pub avg_sales_rank: Option<u64>,
    pub drops_90: u32,
    pub stockout_percent: Option<u32>,
    pub competitive_flag: CompetitiveFlag,
    pub weight_grams: Option<u32>,
    pub binding: Option<String>,
    pub multiplier: Option<f64>,
}
