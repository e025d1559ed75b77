//! Centralized decision thresholds and the engine configuration that carries them.
//!
//! Every value here can be overridden from `engine.json`; fields left out of
//! the file keep their defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fees::FeeSchedule;
use super::presence::{MAX_STOCKOUT_WINDOW_DAYS, STOCKOUT_WINDOW_DAYS};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Average rank above which an item is rejected outright.
    pub max_rank: u64,
    /// Minimum sell/buy ratio for REVIEW; anything lower is a knockout.
    pub review_multiplier: f64,
    pub review_max_rank: u64,
    pub review_min_drops: u32,
    pub buy_multiplier: f64,
    pub buy_max_rank: u64,
    pub buy_min_drops: u32,
    /// Buy prices below this (major units) get `cheap_buy_max_rank` instead.
    pub cheap_buy_price: f64,
    pub cheap_buy_max_rank: u64,
    /// Merchant-fulfilled profit that grants BUY without the multiplier.
    pub high_profit_min: f64,
    pub high_profit_max_rank: u64,
    pub high_profit_min_drops: u32,
}

impl Default for DecisionThresholds {
    /// The canonical threshold table. Deployments that used different
    /// cut-offs override them in `engine.json` rather than keep a second table.
    fn default() -> Self {
        Self {
            max_rank: 3_000_000,
            review_multiplier: 4.0,
            review_max_rank: 2_500_000,
            review_min_drops: 2,
            buy_multiplier: 6.0,
            buy_max_rank: 1_500_000,
            buy_min_drops: 3,
            cheap_buy_price: 6.0,
            cheap_buy_max_rank: 2_000_000,
            high_profit_min: 60.0,
            high_profit_max_rank: 1_000_000,
            high_profit_min_drops: 10,
        }
    }
}

impl DecisionThresholds {
    /// Rank cap for the normal BUY tier, relaxed for cheap purchases.
    pub fn buy_rank_cap(&self, buy_price: f64) -> u64 {
        if buy_price < self.cheap_buy_price {
            self.cheap_buy_max_rank
        } else {
            self.buy_max_rank
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: DecisionThresholds,
    pub fees: FeeSchedule,
    pub stockout_window_days: StockoutWindow,
}

/// Trailing window length in days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockoutWindow(pub i64);

impl Default for StockoutWindow {
    fn default() -> Self {
        Self(STOCKOUT_WINDOW_DAYS)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidConfig {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("referral_fee_percent must be within [0, 1), got {0}")]
    ReferralFee(f64),
    #[error("stockout_window_days must be at most {max}, got {value}")]
    WindowTooLong { value: i64, max: i64 },
    #[error("review_multiplier ({review}) must not exceed buy_multiplier ({buy})")]
    MultiplierOrder { review: f64, buy: f64 },
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let t = &self.thresholds;
        let positives = [
            ("review_multiplier", t.review_multiplier),
            ("buy_multiplier", t.buy_multiplier),
            ("max_rank", t.max_rank as f64),
            ("stockout_window_days", self.stockout_window_days.0 as f64),
        ];
        for (field, value) in positives {
            if !(value > 0.0) {
                return Err(InvalidConfig::NotPositive { field, value });
            }
        }
        let window = self.stockout_window_days.0;
        if window > MAX_STOCKOUT_WINDOW_DAYS {
            return Err(InvalidConfig::WindowTooLong {
                value: window,
                max: MAX_STOCKOUT_WINDOW_DAYS,
            });
        }
        if t.review_multiplier > t.buy_multiplier {
            return Err(InvalidConfig::MultiplierOrder {
                review: t.review_multiplier,
                buy: t.buy_multiplier,
            });
        }
        let referral = self.fees.referral_fee_percent;
        if !(0.0..1.0).contains(&referral) {
            return Err(InvalidConfig::ReferralFee(referral));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
        assert_eq!(EngineConfig::default().stockout_window_days.0, 90);
    }

    #[test]
    fn cheap_purchases_relax_the_rank_cap() {
        let thresholds = DecisionThresholds::default();
        assert_eq!(thresholds.buy_rank_cap(5.99), 2_000_000);
        assert_eq!(thresholds.buy_rank_cap(6.0), 1_500_000);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let json = r#"{ "thresholds": { "buy_multiplier": 8.0 }, "fees": { "closing_fee": 0.0 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.thresholds.buy_multiplier, 8.0);
        assert_eq!(config.thresholds.review_multiplier, 4.0);
        assert_eq!(config.fees.closing_fee, 0.0);
        assert_eq!(config.fees.referral_fee_percent, 0.15);
        assert_eq!(config.stockout_window_days, StockoutWindow(90));
    }

    #[test]
    fn rejects_inconsistent_tables() {
        let mut config = EngineConfig::default();
        config.thresholds.review_multiplier = 7.0;
        assert!(matches!(config.validate(), Err(InvalidConfig::MultiplierOrder { .. })));

        let mut config = EngineConfig::default();
        config.fees.referral_fee_percent = 1.5;
        assert_eq!(config.validate(), Err(InvalidConfig::ReferralFee(1.5)));

        let mut config = EngineConfig::default();
        config.stockout_window_days = StockoutWindow(0);
        assert!(matches!(
            config.validate(),
            Err(InvalidConfig::NotPositive { field: "stockout_window_days", .. })
        ));

        let mut config = EngineConfig::default();
        config.stockout_window_days = StockoutWindow(i64::MAX / 100);
        assert!(matches!(config.validate(), Err(InvalidConfig::WindowTooLong { .. })));
        config.stockout_window_days = StockoutWindow(MAX_STOCKOUT_WINDOW_DAYS);
        assert_eq!(config.validate(), Ok(()));
    }
}
