//! Thin asynchronous client for the price-tracking API.
//!
//! - Fetches one product snapshot per identifier and maps the wire arrays
//!   onto [`ProductSnapshot`].
//! - Keeps a 60-minute in-memory cache with stale fallbacks; rate limiting
//!   is always surfaced, never papered over with stale data.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{Channel, Isbn, PriceSeries, ProductSnapshot};
use crate::util::version::user_agent;

const DEFAULT_BASE_URL: &str = "https://api.keepa.com/";
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// Entries older than this are evicted and no longer serve as stale fallback.
const DEFAULT_STALE_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);
/// Marketplace locale the tracker should report on (1 = .com).
const MARKETPLACE_DOMAIN: &str = "1";
const STATS_DAYS: &str = "180";

/// Tracker timestamps count minutes from 2011-01-01T00:00:00Z.
pub const TRACKER_EPOCH_UNIX: i64 = 1_293_840_000;

const CSV_CHANNELS: [(Channel, usize); 4] = [
    (Channel::FirstParty, 0),
    (Channel::New, 1),
    (Channel::Used, 2),
    (Channel::SalesRank, 3),
];
/// Buy-box history is stored as `[minute, price, shipping]` triples.
const CSV_BUY_BOX: usize = 18;

pub fn minutes_from_datetime(datetime: OffsetDateTime) -> i64 {
    (datetime.unix_timestamp() - TRACKER_EPOCH_UNIX).div_euclid(60)
}

/// The current time in tracker minutes; the `now` the engine expects.
pub fn now_minutes() -> i64 {
    minutes_from_datetime(OffsetDateTime::now_utc())
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(reqwest::Error),
    #[error("rate limited by price tracker (refill in {refill_in_ms:?} ms)")]
    RateLimited { refill_in_ms: Option<u64> },
    #[error("api error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for TrackerError {
    fn from(error: reqwest::Error) -> Self {
        // Request URLs carry the API key.
        Self::Http(error.without_url())
    }
}

impl TrackerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Cached,
    Stale,
}

#[derive(Clone, Debug)]
pub struct CachedPayload<T> {
    pub data: T,
    pub fetched_at: SystemTime,
    pub status: CacheStatus,
}

impl<T> CachedPayload<T> {
    fn new(data: T, fetched_at: SystemTime, status: CacheStatus) -> Self {
        Self {
            data,
            fetched_at,
            status,
        }
    }
}

/// Snapshots keyed by 13-digit identifier; `None` records "tracker has no such product".
type SnapshotCache = HashMap<String, Cached<Option<ProductSnapshot>>>;

#[derive(Clone)]
pub struct TrackerClient {
    http: Client,
    base_url: Url,
    api_key: String,
    cache: Arc<Mutex<SnapshotCache>>,
    ttl: Duration,
    stale_horizon: Duration,
}

impl TrackerClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, TrackerError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base: &str, api_key: impl Into<String>) -> Result<Self, TrackerError> {
        let base_url = Url::parse(base)?;
        let http = Client::builder().user_agent(user_agent()).build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl: DEFAULT_TTL,
            stale_horizon: DEFAULT_STALE_HORIZON,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_stale_horizon(mut self, horizon: Duration) -> Self {
        self.stale_horizon = horizon;
        self
    }

    pub async fn get_snapshot(
        &self,
        isbn: &Isbn,
    ) -> Result<CachedPayload<Option<ProductSnapshot>>, TrackerError> {
        let key = isbn.to_isbn13();
        if let Some(payload) = self.cached_snapshot(&key).await {
            debug!(identifier = %key, "serving cached snapshot");
            return Ok(payload);
        }

        let mut url = self.url("product")?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("domain", MARKETPLACE_DOMAIN)
            .append_pair("code", &key)
            .append_pair("stats", STATS_DAYS);

        debug!(identifier = %key, "requesting snapshot from price tracker");

        match self.fetch_products(self.http.get(url)).await {
            Ok(response) => {
                if let Some(tokens_left) = response.tokens_left {
                    debug!(tokens_left, "price tracker token balance");
                }
                let snapshot = response.products.into_iter().next().map(ProductSnapshot::from);
                if snapshot.is_none() {
                    debug!(identifier = %key, "price tracker has no product");
                }
                Ok(self.store_snapshot(&key, snapshot).await)
            }
            Err(error) if error.is_rate_limited() => Err(error),
            Err(error) => {
                if let Some(stale) = self.cached_snapshot_stale(&key).await {
                    warn!(identifier = %key, %error, "snapshot request failed; serving stale data");
                    return Ok(stale);
                }
                Err(error)
            }
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    async fn cached_snapshot(&self, key: &str) -> Option<CachedPayload<Option<ProductSnapshot>>> {
        let cache = self.cache.lock().await;
        cache.get(key).and_then(|entry| entry.if_fresh(self.ttl))
    }

    async fn cached_snapshot_stale(
        &self,
        key: &str,
    ) -> Option<CachedPayload<Option<ProductSnapshot>>> {
        let cache = self.cache.lock().await;
        cache.get(key).map(Cached::stale)
    }

    async fn store_snapshot(
        &self,
        key: &str,
        data: Option<ProductSnapshot>,
    ) -> CachedPayload<Option<ProductSnapshot>> {
        let fetched_at = SystemTime::now();
        let payload = CachedPayload::new(data.clone(), fetched_at, CacheStatus::Fresh);
        let mut cache = self.cache.lock().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.age_at(fetched_at) <= self.stale_horizon);
        if cache.len() < before {
            debug!(evicted = before - cache.len(), "evicted expired snapshots");
        }
        cache.insert(key.to_string(), Cached::new(data, fetched_at));
        payload
    }

    async fn fetch_products(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<ProductResponse, TrackerError> {
        let response = builder.send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let refill_in_ms = response
                .json::<ProductResponse>()
                .await
                .ok()
                .and_then(|body| body.refill_in);
            return Err(TrackerError::RateLimited { refill_in_ms });
        }

        let mut body: ProductResponse = response.error_for_status()?.json().await?;
        if let Some(error) = body.error.take() {
            return Err(TrackerError::Api(
                error
                    .message
                    .or(error.kind)
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        if body.products.is_empty() && body.tokens_left.is_some_and(|tokens| tokens < 0) {
            return Err(TrackerError::RateLimited {
                refill_in_ms: body.refill_in,
            });
        }
        Ok(body)
    }

    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

struct Cached<T> {
    value: T,
    fetched_at: SystemTime,
}

impl<T: Clone> Cached<T> {
    fn new(value: T, fetched_at: SystemTime) -> Self {
        Self { value, fetched_at }
    }

    fn if_fresh(&self, ttl: Duration) -> Option<CachedPayload<T>> {
        (self.age_at(SystemTime::now()) <= ttl)
            .then(|| CachedPayload::new(self.value.clone(), self.fetched_at, CacheStatus::Cached))
    }

    /// Age relative to `now`; entries stamped in the future count as new.
    fn age_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.fetched_at).unwrap_or_default()
    }

    fn stale(&self) -> CachedPayload<T> {
        CachedPayload::new(self.value.clone(), self.fetched_at, CacheStatus::Stale)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductResponse {
    #[serde(default)]
    products: Vec<ProductDto>,
    #[serde(default)]
    tokens_left: Option<i64>,
    #[serde(default)]
    refill_in: Option<u64>,
    #[serde(default)]
    error: Option<ApiErrorDto>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDto {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDto {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    csv: Vec<Option<Vec<i64>>>,
    #[serde(default)]
    stats: Option<StatsDto>,
    #[serde(default)]
    package_weight: Option<i64>,
    #[serde(default)]
    item_weight: Option<i64>,
    #[serde(default)]
    binding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsDto {
    #[serde(default)]
    avg180: Vec<Option<i64>>,
    #[serde(default)]
    avg90: Vec<Option<i64>>,
    #[serde(default)]
    sales_rank_drops90: Option<i64>,
}

impl From<ProductDto> for ProductSnapshot {
    fn from(dto: ProductDto) -> Self {
        let mut snapshot = ProductSnapshot {
            title: dto.title,
            binding: dto.binding,
            weight_grams: dto
                .package_weight
                .or(dto.item_weight)
                .filter(|grams| *grams > 0)
                .and_then(|grams| u32::try_from(grams).ok()),
            ..ProductSnapshot::default()
        };

        for (channel, index) in CSV_CHANNELS {
            if let Some(raw) = csv_entry(&dto.csv, index) {
                insert_series(&mut snapshot, channel, PriceSeries::from_flat(raw));
            }
        }
        if let Some(raw) = csv_entry(&dto.csv, CSV_BUY_BOX) {
            insert_series(&mut snapshot, Channel::BuyBox, PriceSeries::from_flat_triples(raw));
        }

        if let Some(stats) = dto.stats {
            let indexed = CSV_CHANNELS
                .into_iter()
                .chain(std::iter::once((Channel::BuyBox, CSV_BUY_BOX)));
            for (channel, index) in indexed {
                if let Some(value) = stat_entry(&stats.avg180, index) {
                    snapshot.avg180.insert(channel, value);
                }
                if let Some(value) = stat_entry(&stats.avg90, index) {
                    snapshot.avg90.insert(channel, value);
                }
            }
            snapshot.sales_rank_drops_90 = stats
                .sales_rank_drops90
                .and_then(|drops| u32::try_from(drops).ok());
        }

        snapshot
    }
}

/// Empty histories are left out so a channel is either absent or has samples.
fn insert_series(snapshot: &mut ProductSnapshot, channel: Channel, parsed: Option<PriceSeries>) {
    match parsed {
        Some(series) if series.is_empty() => {}
        Some(series) => {
            snapshot.series.insert(channel, series);
        }
        None => debug!(channel = channel.label(), "dropping malformed series"),
    }
}

fn csv_entry(csv: &[Option<Vec<i64>>], index: usize) -> Option<&[i64]> {
    csv.get(index).and_then(|entry| entry.as_deref())
}

fn stat_entry(values: &[Option<i64>], index: usize) -> Option<i64> {
    values.get(index).copied().flatten().filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::test_server::serve_once;

    const PRODUCT_JSON: &str = r#"{
        "tokensLeft": 120,
        "products": [{
            "title": "Introduction to Algorithms",
            "binding": "Hardcover",
            "packageWeight": 2100,
            "csv": [
                [7000000, 8999, 7100000, -1],
                [7000000, 7500],
                [7000000, 4200, 7000100],
                [7000000, 350000, 7100000, 410000],
                null, null, null, null, null, null, null, null, null, null, null, null, null, null,
                [7100050, 9100, 0, 7100060, 9300, 399]
            ],
            "stats": {
                "avg180": [8800, 7400, -1, 380000],
                "avg90": [-1, 7300, 4100, 395000],
                "salesRankDrops90": 14
            }
        }]
    }"#;

    fn isbn() -> Isbn {
        Isbn::parse("0262033844").unwrap()
    }

    #[test]
    fn tracker_minutes_round_trip() {
        let epoch = OffsetDateTime::from_unix_timestamp(TRACKER_EPOCH_UNIX).unwrap();
        assert_eq!(minutes_from_datetime(epoch), 0);
        let later = OffsetDateTime::from_unix_timestamp(TRACKER_EPOCH_UNIX + 90 * 60 + 59).unwrap();
        assert_eq!(minutes_from_datetime(later), 90);
        let before = OffsetDateTime::from_unix_timestamp(TRACKER_EPOCH_UNIX - 1).unwrap();
        assert_eq!(minutes_from_datetime(before), -1);
    }

    #[test]
    fn maps_wire_arrays_onto_snapshot() {
        let response: ProductResponse = serde_json::from_str(PRODUCT_JSON).unwrap();
        let snapshot = ProductSnapshot::from(response.products.into_iter().next().unwrap());

        assert_eq!(snapshot.binding.as_deref(), Some("Hardcover"));
        assert_eq!(snapshot.weight_grams, Some(2100));
        assert_eq!(snapshot.series(Channel::FirstParty).unwrap().len(), 2);
        // Used history is truncated and treated as absent.
        assert!(snapshot.series(Channel::Used).is_none());
        let buy_box: Vec<i64> = snapshot
            .series(Channel::BuyBox)
            .unwrap()
            .samples()
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(buy_box, vec![9100, 9699]);
        assert_eq!(snapshot.avg180(Channel::SalesRank), Some(380_000));
        assert_eq!(snapshot.avg180(Channel::Used), None);
        assert_eq!(snapshot.avg90(Channel::FirstParty), None);
        assert_eq!(snapshot.sales_rank_drops_90, Some(14));
    }

    #[test]
    fn empty_histories_are_left_out() {
        let json = r#"{ "products": [{ "csv": [[], [7000000, 1999], null, [], null,
            null, null, null, null, null, null, null, null, null, null, null, null, null, []] }] }"#;
        let response: ProductResponse = serde_json::from_str(json).unwrap();
        let snapshot = ProductSnapshot::from(response.products.into_iter().next().unwrap());

        assert!(snapshot.series(Channel::FirstParty).is_none());
        assert!(snapshot.series(Channel::SalesRank).is_none());
        assert!(snapshot.series(Channel::BuyBox).is_none());
        assert_eq!(snapshot.series(Channel::New).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetches_and_then_serves_from_cache() {
        let base = serve_once("200 OK", PRODUCT_JSON).await;
        let client = TrackerClient::with_base_url(&base, "secret").unwrap();

        let first = client.get_snapshot(&isbn()).await.unwrap();
        assert_eq!(first.status, CacheStatus::Fresh);
        assert!(first.data.is_some());

        // The one-shot server is gone; this must come from memory.
        let second = client.get_snapshot(&isbn()).await.unwrap();
        assert_eq!(second.status, CacheStatus::Cached);
    }

    #[tokio::test]
    async fn missing_product_is_not_an_error() {
        let base = serve_once("200 OK", r#"{"products": [], "tokensLeft": 50}"#).await;
        let client = TrackerClient::with_base_url(&base, "secret").unwrap();
        let payload = client.get_snapshot(&isbn()).await.unwrap();
        assert!(payload.data.is_none());
    }

    #[tokio::test]
    async fn rate_limit_is_never_masked_by_stale_data() {
        let base = serve_once("429 Too Many Requests", r#"{"refillIn": 5000}"#).await;
        let client = TrackerClient::with_base_url(&base, "secret").unwrap();
        let stale_time = SystemTime::now() - Duration::from_secs(3 * 60 * 60);
        client.cache.lock().await.insert(
            isbn().to_isbn13(),
            Cached::new(Some(ProductSnapshot::default()), stale_time),
        );

        let error = client.get_snapshot(&isbn()).await.unwrap_err();
        assert!(matches!(
            error,
            TrackerError::RateLimited {
                refill_in_ms: Some(5000)
            }
        ));
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_stale_cache() {
        let base = serve_once("500 Internal Server Error", "{}").await;
        let client = TrackerClient::with_base_url(&base, "secret").unwrap();
        let stale_time = SystemTime::now() - Duration::from_secs(3 * 60 * 60);
        client.cache.lock().await.insert(
            isbn().to_isbn13(),
            Cached::new(Some(ProductSnapshot::default()), stale_time),
        );

        let payload = client.get_snapshot(&isbn()).await.unwrap();
        assert_eq!(payload.status, CacheStatus::Stale);
    }

    #[tokio::test]
    async fn storing_a_snapshot_evicts_entries_past_the_stale_horizon() {
        let client = TrackerClient::with_base_url("http://127.0.0.1:9/", "secret")
            .unwrap()
            .with_stale_horizon(Duration::from_secs(6 * 60 * 60));
        let now = SystemTime::now();
        {
            let mut cache = client.cache.lock().await;
            cache.insert(
                "9780306406157".to_string(),
                Cached::new(None, now - Duration::from_secs(2 * 60 * 60)),
            );
            cache.insert(
                "9780131103627".to_string(),
                Cached::new(None, now - Duration::from_secs(48 * 60 * 60)),
            );
        }

        client
            .store_snapshot(&isbn().to_isbn13(), Some(ProductSnapshot::default()))
            .await;

        let cache = client.cache.lock().await;
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key("9780306406157"));
        assert!(!cache.contains_key("9780131103627"));
    }

    #[tokio::test]
    async fn api_error_payload_is_reported() {
        let base = serve_once(
            "200 OK",
            r#"{"error": {"type": "invalidKey", "message": "invalid access key"}}"#,
        )
        .await;
        let client = TrackerClient::with_base_url(&base, "secret").unwrap();
        let error = client.get_snapshot(&isbn()).await.unwrap_err();
        assert!(matches!(error, TrackerError::Api(message) if message == "invalid access key"));
    }
}
