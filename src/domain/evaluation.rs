//! Purchase decision: ordered knockouts, then tiers, first match wins.
//!
//! Both lists are plain tables so each threshold can be read and tested on
//! its own. Knockouts are tagged with the stage whose data they need, which
//! lets [`evaluate`] stop before running the presence analysis or fee math
//! for items that are already rejected.

use tracing::debug;

use super::channels::best_available_price;
use super::entities::{CompetitiveFlag, Decision, EvaluationResult, Listing, ProductSnapshot};
use super::fees::Profit;
use super::presence::analyze_presence;
use super::thresholds::{DecisionThresholds, EngineConfig};
use super::velocity::extract_velocity;

/// Everything the classifier looks at, in major currency units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecisionInputs {
    /// Landed purchase cost; must be positive.
    pub buy_price: f64,
    pub avg_sales_rank: Option<u64>,
    pub drops_90: u32,
    pub sell_price: Option<f64>,
    pub profit: Option<Profit>,
}

impl DecisionInputs {
    pub fn multiplier(&self) -> Option<f64> {
        self.sell_price.map(|sell| sell / self.buy_price)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Velocity,
    Pricing,
    Profit,
}

type KnockoutCheck = fn(&DecisionInputs, &DecisionThresholds) -> Option<String>;

struct Knockout {
    stage: Stage,
    check: KnockoutCheck,
}

const KNOCKOUTS: [Knockout; 5] = [
    Knockout {
        stage: Stage::Velocity,
        check: unknown_rank,
    },
    Knockout {
        stage: Stage::Velocity,
        check: rank_over_cap,
    },
    Knockout {
        stage: Stage::Pricing,
        check: no_price,
    },
    Knockout {
        stage: Stage::Profit,
        check: multiplier_below_review,
    },
    Knockout {
        stage: Stage::Profit,
        check: no_recent_sales,
    },
];

fn unknown_rank(inputs: &DecisionInputs, _: &DecisionThresholds) -> Option<String> {
    inputs
        .avg_sales_rank
        .is_none()
        .then(|| "unknown rank: no average sales rank available".to_string())
}

fn rank_over_cap(inputs: &DecisionInputs, t: &DecisionThresholds) -> Option<String> {
    inputs
        .avg_sales_rank
        .filter(|rank| *rank > t.max_rank)
        .map(|rank| format!("rank {rank} exceeds cap {}", t.max_rank))
}

fn no_price(inputs: &DecisionInputs, _: &DecisionThresholds) -> Option<String> {
    inputs
        .sell_price
        .is_none()
        .then(|| "no price data".to_string())
}

fn multiplier_below_review(inputs: &DecisionInputs, t: &DecisionThresholds) -> Option<String> {
    let multiplier = inputs.multiplier()?;
    if multiplier >= t.review_multiplier || all_met(&high_profit_override(inputs, t)) {
        return None;
    }
    Some(format!(
        "multiplier {multiplier:.2}x below review threshold {:.1}x",
        t.review_multiplier
    ))
}

fn no_recent_sales(inputs: &DecisionInputs, _: &DecisionThresholds) -> Option<String> {
    (inputs.drops_90 == 0).then(|| "no recent sales: 0 rank drops in 90 days".to_string())
}

/// One requirement of a tier, with the observed value in its label.
#[derive(Clone, Debug, PartialEq)]
struct Criterion {
    met: bool,
    label: String,
}

type TierCriteria = fn(&DecisionInputs, &DecisionThresholds) -> Vec<Criterion>;

struct Tier {
    decision: Decision,
    name: &'static str,
    criteria: TierCriteria,
}

const TIERS: [Tier; 3] = [
    Tier {
        decision: Decision::Buy,
        name: "buy tier",
        criteria: buy_tier,
    },
    Tier {
        decision: Decision::Buy,
        name: "high-profit override",
        criteria: high_profit_override,
    },
    Tier {
        decision: Decision::Review,
        name: "review tier",
        criteria: review_tier,
    },
];

fn buy_tier(inputs: &DecisionInputs, t: &DecisionThresholds) -> Vec<Criterion> {
    vec![
        multiplier_at_least(inputs, t.buy_multiplier),
        rank_below(inputs, t.buy_rank_cap(inputs.buy_price)),
        drops_at_least(inputs, t.buy_min_drops),
    ]
}

fn high_profit_override(inputs: &DecisionInputs, t: &DecisionThresholds) -> Vec<Criterion> {
    vec![
        merchant_profit_at_least(inputs, t.high_profit_min),
        rank_below(inputs, t.high_profit_max_rank),
        drops_at_least(inputs, t.high_profit_min_drops),
    ]
}

fn review_tier(inputs: &DecisionInputs, t: &DecisionThresholds) -> Vec<Criterion> {
    vec![
        multiplier_at_least(inputs, t.review_multiplier),
        rank_below(inputs, t.review_max_rank),
        drops_at_least(inputs, t.review_min_drops),
    ]
}

fn multiplier_at_least(inputs: &DecisionInputs, min: f64) -> Criterion {
    match inputs.multiplier() {
        Some(multiplier) => Criterion {
            met: multiplier >= min,
            label: format!("multiplier {multiplier:.2}x (needs >= {min:.1}x)"),
        },
        None => Criterion {
            met: false,
            label: format!("multiplier unknown (needs >= {min:.1}x)"),
        },
    }
}

fn rank_below(inputs: &DecisionInputs, cap: u64) -> Criterion {
    match inputs.avg_sales_rank {
        Some(rank) => Criterion {
            met: rank < cap,
            label: format!("rank {rank} (needs < {cap})"),
        },
        None => Criterion {
            met: false,
            label: format!("rank unknown (needs < {cap})"),
        },
    }
}

fn drops_at_least(inputs: &DecisionInputs, min: u32) -> Criterion {
    Criterion {
        met: inputs.drops_90 >= min,
        label: format!("{} drops (needs >= {min})", inputs.drops_90),
    }
}

fn merchant_profit_at_least(inputs: &DecisionInputs, min: f64) -> Criterion {
    match inputs.profit {
        Some(profit) => Criterion {
            met: profit.merchant >= min,
            label: format!("FBM profit ${:.2} (needs >= ${min:.2})", profit.merchant),
        },
        None => Criterion {
            met: false,
            label: format!("FBM profit unknown (needs >= ${min:.2})"),
        },
    }
}

fn all_met(criteria: &[Criterion]) -> bool {
    criteria.iter().all(|criterion| criterion.met)
}

fn join_labels<'a>(criteria: impl Iterator<Item = &'a Criterion>) -> String {
    criteria
        .map(|criterion| criterion.label.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn first_knockout(inputs: &DecisionInputs, t: &DecisionThresholds, through: Stage) -> Option<String> {
    KNOCKOUTS
        .iter()
        .filter(|knockout| knockout.stage <= through)
        .find_map(|knockout| (knockout.check)(inputs, t))
}

/// Runs every knockout, then the tiers in priority order.
pub fn classify(inputs: &DecisionInputs, thresholds: &DecisionThresholds) -> Verdict {
    if let Some(reason) = first_knockout(inputs, thresholds, Stage::Profit) {
        return Verdict {
            decision: Decision::Reject,
            reason,
        };
    }

    for tier in &TIERS {
        let criteria = (tier.criteria)(inputs, thresholds);
        if all_met(&criteria) {
            return Verdict {
                decision: tier.decision,
                reason: format!("{}: {}", tier.name, join_labels(criteria.iter())),
            };
        }
    }

    let review = review_tier(inputs, thresholds);
    Verdict {
        decision: Decision::Reject,
        reason: format!(
            "below review tier: {}",
            join_labels(review.iter().filter(|criterion| !criterion.met))
        ),
    }
}

/// Evaluates one listing against its price-tracking snapshot.
///
/// `now` is in the snapshot's minute offsets. Callers must pass a listing
/// with a positive landed cost; missing snapshot data never fails, it
/// produces a REJECT with the reason.
pub fn evaluate(
    listing: &Listing,
    snapshot: Option<&ProductSnapshot>,
    now: i64,
    config: &EngineConfig,
) -> EvaluationResult {
    let thresholds = &config.thresholds;
    let mut result = EvaluationResult {
        identifier: listing.identifier.clone(),
        decision: Decision::Reject,
        reason: String::new(),
        sell_price: None,
        fba_profit: None,
        fbm_profit: None,
        avg_sales_rank: None,
        drops_90: 0,
        stockout_percent: None,
        competitive_flag: CompetitiveFlag::default(),
        weight_grams: None,
        binding: None,
        multiplier: None,
    };

    let Some(snapshot) = snapshot else {
        return finish(result, Decision::Reject, "no price-tracking data".to_string());
    };
    result.weight_grams = snapshot.weight_grams;
    result.binding = snapshot.binding.clone();

    let velocity = extract_velocity(snapshot);
    result.avg_sales_rank = velocity.avg_sales_rank;
    result.drops_90 = velocity.drops_90;
    let mut inputs = DecisionInputs {
        buy_price: listing.total_cost(),
        avg_sales_rank: velocity.avg_sales_rank,
        drops_90: velocity.drops_90,
        sell_price: None,
        profit: None,
    };
    if let Some(reason) = first_knockout(&inputs, thresholds, Stage::Velocity) {
        return finish(result, Decision::Reject, reason);
    }

    let presence = analyze_presence(snapshot, now, config.stockout_window_days.0);
    result.stockout_percent = presence.stockout_percent;
    result.competitive_flag = presence.flag;
    inputs.sell_price = presence
        .realistic_price
        .or_else(|| best_available_price(snapshot));
    result.sell_price = inputs.sell_price;
    result.multiplier = inputs.multiplier();
    if let Some(reason) = first_knockout(&inputs, thresholds, Stage::Pricing) {
        return finish(result, Decision::Reject, reason);
    }

    if let Some(sell_price) = inputs.sell_price {
        let profit = config.fees.profit(inputs.buy_price, sell_price);
        result.fba_profit = Some(profit.fulfillment);
        result.fbm_profit = Some(profit.merchant);
        inputs.profit = Some(profit);
    }

    let verdict = classify(&inputs, thresholds);
    finish(result, verdict.decision, verdict.reason)
}

fn finish(mut result: EvaluationResult, decision: Decision, reason: String) -> EvaluationResult {
    debug!(
        identifier = %result.identifier,
        decision = %decision,
        reason = %reason,
        "evaluated listing"
    );
    result.decision = decision;
    result.reason = reason;
    result
}
