//! Marketplace fee schedule and per-channel net profit.

use serde::{Deserialize, Serialize};

/// Fees in major currency units; `referral_fee_percent` is a fraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Share of the sale price kept by the marketplace (0.15 = 15%).
    pub referral_fee_percent: f64,
    /// Flat per-unit closing fee for media items.
    pub closing_fee: f64,
    /// Warehouse pick/pack/ship fee when the marketplace fulfils (FBA).
    pub fulfillment_fee: f64,
    /// Postage paid when shipping the item ourselves (FBM).
    pub merchant_shipping_cost: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            referral_fee_percent: 0.15,
            closing_fee: 1.80,
            fulfillment_fee: 3.50,
            merchant_shipping_cost: 4.00,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Profit {
    pub referral_fee: f64,
    /// Net profit when fulfilled by the marketplace warehouse.
    pub fulfillment: f64,
    /// Net profit when fulfilled by the merchant.
    pub merchant: f64,
}

impl FeeSchedule {
    pub fn referral_fee(&self, sell_price: f64) -> f64 {
        sell_price * self.referral_fee_percent
    }

    /// Negative results are losses, not errors.
    pub fn profit(&self, buy_price: f64, sell_price: f64) -> Profit {
        let referral_fee = self.referral_fee(sell_price);
        let base = sell_price - buy_price - referral_fee - self.closing_fee;
        Profit {
            referral_fee,
            fulfillment: base - self.fulfillment_fee,
            merchant: base - self.merchant_shipping_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_subtracts_every_fee() {
        let fees = FeeSchedule::default();
        let profit = fees.profit(5.0, 35.0);

        assert!((profit.referral_fee - 5.25).abs() < 1e-9);
        // 35 - 5 - 5.25 - 1.80 - 3.50
        assert!((profit.fulfillment - 19.45).abs() < 1e-9);
        // 35 - 5 - 5.25 - 1.80 - 4.00
        assert!((profit.merchant - 18.95).abs() < 1e-9);
    }

    #[test]
    fn losses_are_negative() {
        let profit = FeeSchedule::default().profit(20.0, 10.0);
        assert!(profit.fulfillment < 0.0);
        assert!(profit.merchant < 0.0);
    }

    #[test]
    fn custom_referral_rate() {
        let fees = FeeSchedule {
            referral_fee_percent: 0.08,
            closing_fee: 0.0,
            fulfillment_fee: 0.0,
            merchant_shipping_cost: 0.0,
        };
        let profit = fees.profit(10.0, 100.0);
        assert!((profit.merchant - 82.0).abs() < 1e-9);
    }
}
