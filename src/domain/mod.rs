//! Evaluation engine: pure computation from a price-tracking snapshot and a
//! buy price to a purchase decision. Nothing in here performs I/O.

pub mod channels;
pub mod entities;
pub mod evaluation;
pub mod fees;
pub mod identifier;
pub mod presence;
pub mod thresholds;
pub mod velocity;

pub use channels::{best_available_price, channel_prices, ChannelPrices, PRICE_PRIORITY};
pub use entities::{
    Channel, CompetitiveFlag, Decision, EvaluationResult, Listing, PresenceAnalysis, PriceSeries,
    ProductSnapshot, Sample, OUT_OF_STOCK,
};
pub use evaluation::{classify, evaluate, DecisionInputs, Verdict};
pub use fees::{FeeSchedule, Profit};
pub use identifier::{isbn10_to_13, isbn13_to_10, validate, Isbn, IsbnError, IsbnValidation};
pub use presence::{
    analyze_presence, MAX_STOCKOUT_WINDOW_DAYS, MINUTES_PER_DAY, STOCKOUT_WINDOW_DAYS,
};
pub use thresholds::{DecisionThresholds, EngineConfig, InvalidConfig, StockoutWindow};
pub use velocity::{extract_velocity, Velocity};
