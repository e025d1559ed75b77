use std::collections::HashMap;
use std::time::Duration;

use bookflip_evaluator::{
    domain::{Channel, CompetitiveFlag, PriceSeries, Sample, MINUTES_PER_DAY},
    infra::{
        store::{JsonFileStore, ListingStore},
        tracker::{minutes_from_datetime, TrackerError},
    },
    BatchRunner, Decision, EngineConfig, Isbn, Listing, ProductSnapshot, SnapshotSource,
};
use time::OffsetDateTime;

struct InMemorySource {
    snapshots: HashMap<String, ProductSnapshot>,
}

impl SnapshotSource for InMemorySource {
    async fn fetch_snapshot(&self, isbn: &Isbn) -> Result<Option<ProductSnapshot>, TrackerError> {
        Ok(self.snapshots.get(&isbn.to_isbn13()).cloned())
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_760_000_000).unwrap()
}

fn days_ago(days: i64) -> i64 {
    minutes_from_datetime(now()) - days * MINUTES_PER_DAY
}

fn series(samples: &[(i64, i64)]) -> PriceSeries {
    PriceSeries::new(samples.iter().map(|&(m, v)| Sample::new(m, v)).collect()).unwrap()
}

/// Marketplace stocked out for most of the window; buy box held around $35.
fn scarce_title() -> ProductSnapshot {
    let mut snapshot = ProductSnapshot::default()
        .with_series(
            Channel::FirstParty,
            series(&[(days_ago(200), 2900), (days_ago(80), -1)]),
        )
        .with_series(
            Channel::BuyBox,
            series(&[(days_ago(70), 3400), (days_ago(30), 3600)]),
        )
        .with_series(Channel::New, series(&[(days_ago(5), 4100)]));
    snapshot.avg180.insert(Channel::SalesRank, 450_000);
    snapshot.sales_rank_drops_90 = Some(12);
    snapshot.binding = Some("Hardcover".to_string());
    snapshot
}

/// Plenty of competition and a price barely above cost.
fn crowded_title() -> ProductSnapshot {
    let mut snapshot = ProductSnapshot::default()
        .with_series(Channel::FirstParty, series(&[(days_ago(300), 1299)]))
        .with_series(Channel::New, series(&[(days_ago(2), 1150)]));
    snapshot.avg180.insert(Channel::SalesRank, 80_000);
    snapshot.sales_rank_drops_90 = Some(40);
    snapshot
}

#[tokio::test]
async fn batch_persists_decisions_for_every_pending_listing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listings.json");

    let scarce = Isbn::parse("0306406152").unwrap();
    let crowded = Isbn::parse("978-0-262-03384-8").unwrap();
    let unknown = Isbn::parse("9780131103627").unwrap();

    let mut store = JsonFileStore::open(&path).unwrap();
    store.insert_listing(Listing::new(scarce.clone(), 400, 100)).unwrap();
    store.insert_listing(Listing::new(crowded.clone(), 500, 0)).unwrap();
    store.insert_listing(Listing::new(unknown.clone(), 300, 0)).unwrap();

    let source = InMemorySource {
        snapshots: HashMap::from([
            (scarce.to_isbn13(), scarce_title()),
            (crowded.to_isbn13(), crowded_title()),
        ]),
    };

    let runner = BatchRunner::new(EngineConfig::default()).with_delay(Duration::ZERO);
    let report = runner.run(&source, &mut store, now).await.unwrap();

    assert_eq!(report.evaluated, 3);
    assert_eq!(report.buy, 1);
    assert_eq!(report.reject, 2);
    assert!(!report.aborted);
    assert!(store.pending_listings().unwrap().is_empty());

    let reopened = JsonFileStore::open(&path).unwrap();

    let record = reopened.evaluation(&scarce).unwrap();
    assert_eq!(record.result.decision, Decision::Buy);
    assert_eq!(record.result.sell_price, Some(35.0));
    assert_eq!(record.result.competitive_flag, CompetitiveFlag::Favorable);
    assert_eq!(record.evaluated_at, "2025-10-09T08:53:20Z");

    let record = reopened.evaluation(&crowded).unwrap();
    assert_eq!(record.result.decision, Decision::Reject);
    assert_eq!(record.result.competitive_flag, CompetitiveFlag::Unfavorable);

    let record = reopened.evaluation(&unknown).unwrap();
    assert_eq!(record.result.reason, "no price-tracking data");
}

#[tokio::test]
async fn rerunning_a_finished_batch_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::open(dir.path().join("listings.json")).unwrap();
    store
        .insert_listing(Listing::new(Isbn::parse("0306406152").unwrap(), 400, 0))
        .unwrap();
    let source = InMemorySource {
        snapshots: HashMap::new(),
    };
    let runner = BatchRunner::new(EngineConfig::default()).with_delay(Duration::ZERO);

    assert_eq!(runner.run(&source, &mut store, now).await.unwrap().evaluated, 1);
    assert_eq!(runner.run(&source, &mut store, now).await.unwrap().evaluated, 0);
}
