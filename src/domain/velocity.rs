use super::entities::{Channel, ProductSnapshot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Velocity {
    /// 180-day average rank, else 90-day; `None` when neither is known.
    pub avg_sales_rank: Option<u64>,
    /// Sales-rank drops in the last 90 days, 0 when unreported.
    pub drops_90: u32,
}

pub fn extract_velocity(snapshot: &ProductSnapshot) -> Velocity {
    let avg_sales_rank = snapshot
        .avg180(Channel::SalesRank)
        .or_else(|| snapshot.avg90(Channel::SalesRank))
        .map(|rank| rank as u64);

    Velocity {
        avg_sales_rank,
        drops_90: snapshot.sales_rank_drops_90.unwrap_or(0),
    }
}
