/// Worker-pool tests against in-memory provider/sink fakes
/// Covers exactly-once claiming, concurrency-independent output, per-market
/// failure isolation, and tolerated partial persistence.
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_parcl_ingest::config::{ClassifyRules, FilterRules};
use rust_parcl_ingest::coordinator::{IngestCoordinator, IngestSettings};
use rust_parcl_ingest::db_storage::IngestSink;
use rust_parcl_ingest::errors::AppError;
use rust_parcl_ingest::models::{
    DateRange, EventRow, MarketIdentifier, PeriodRow, PropertyEvent, PropertyRow,
    PropertySnapshot, RawResponseRecord, TransactionPeriod,
};
use rust_parcl_ingest::provider::MarketDataProvider;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn test_range() -> DateRange {
    DateRange {
        start: date(2018, 1, 1),
        end: date(2025, 1, 1),
    }
}

fn settings(workers: usize) -> IngestSettings {
    IngestSettings {
        worker_count: workers,
        worker_delay: Duration::from_millis(0),
        filter: FilterRules {
            exclude_new_construction: true,
            new_construction_cutoff_year: 2024,
        },
        classify: ClassifyRules::default(),
    }
}

fn market(parcl_id: i64, code: &str) -> MarketIdentifier {
    MarketIdentifier {
        parcl_id,
        code: code.to_string(),
        state_abbreviation: Some("GA".to_string()),
        total_population: None,
        median_income: None,
    }
}

fn event(name: &str, d: NaiveDate, price: Option<i64>) -> PropertyEvent {
    PropertyEvent {
        event_type: None,
        event_name: name.to_string(),
        event_date: d,
        price,
        owner_occupied_flag: None,
        new_construction_flag: None,
        investor_flag: None,
        entity_owner_name: None,
    }
}

fn snapshot(id: i64, zip: &str, year_built: Option<i32>, events: Vec<PropertyEvent>) -> PropertySnapshot {
    PropertySnapshot {
        parcl_property_id: id,
        address: Some(format!("{} Test St", id)),
        city: Some("Atlanta".to_string()),
        state_abbreviation: Some("GA".to_string()),
        county: Some("Fulton".to_string()),
        zip_code: Some(zip.to_string()),
        bedrooms: Some(3),
        bathrooms: Some(2.0),
        square_footage: Some(1400),
        year_built,
        latitude: None,
        longitude: None,
        property_type: Some("SINGLE_FAMILY".to_string()),
        current_on_market_flag: None,
        current_owner_occupied_flag: None,
        current_investor_owned_flag: None,
        events,
    }
}

/// Deterministic fixture: two flips, a landlord-to-be, and a rental-only
/// ineligible-for-periods property spread over three markets.
fn fixture_markets() -> (Vec<MarketIdentifier>, HashMap<String, Vec<PropertySnapshot>>) {
    let markets = vec![
        market(1, "30318"),
        market(2, "30324"),
        market(3, "30331"),
    ];

    let mut responses = HashMap::new();
    responses.insert(
        "30318".to_string(),
        vec![
            snapshot(
                101,
                "30318",
                Some(1962),
                vec![
                    event("SOLD", date(2022, 1, 1), Some(200_000)),
                    event("SOLD", date(2022, 7, 1), Some(250_000)),
                ],
            ),
            snapshot(
                102,
                "30318",
                Some(1975),
                vec![
                    event("SOLD", date(2021, 3, 1), Some(180_000)),
                    event("LISTED_RENT", date(2021, 6, 1), Some(1_800)),
                ],
            ),
        ],
    );
    responses.insert(
        "30324".to_string(),
        vec![snapshot(
            201,
            "30324",
            Some(1988),
            vec![
                event("SOLD", date(2020, 5, 1), Some(300_000)),
                event("SOLD", date(2020, 5, 10), Some(305_000)),
                event("SOLD", date(2023, 5, 1), Some(400_000)),
            ],
        )],
    );
    responses.insert(
        "30331".to_string(),
        vec![
            // No classifiable ownership, but still archived.
            snapshot(
                301,
                "30331",
                Some(2025),
                vec![event("SOLD", date(2024, 8, 1), Some(500_000))],
            ),
        ],
    );

    (markets, responses)
}

struct FakeProvider {
    markets: Vec<MarketIdentifier>,
    responses: HashMap<String, Vec<PropertySnapshot>>,
    failing_markets: HashSet<String>,
    fail_enumeration: bool,
    query_counts: Mutex<HashMap<String, usize>>,
}

impl FakeProvider {
    fn new(
        markets: Vec<MarketIdentifier>,
        responses: HashMap<String, Vec<PropertySnapshot>>,
    ) -> Self {
        Self {
            markets,
            responses,
            failing_markets: HashSet::new(),
            fail_enumeration: false,
            query_counts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    async fn enumerate_markets(&self, _region: &str) -> Result<Vec<MarketIdentifier>, AppError> {
        if self.fail_enumeration {
            return Err(AppError::Provider("provider unreachable".to_string()));
        }
        Ok(self.markets.clone())
    }

    async fn query_property_events(
        &self,
        market: &MarketIdentifier,
        _event_names: &[&str],
        _range: &DateRange,
    ) -> Result<Vec<PropertySnapshot>, AppError> {
        *self
            .query_counts
            .lock()
            .unwrap()
            .entry(market.code.clone())
            .or_insert(0) += 1;

        if self.failing_markets.contains(&market.code) {
            return Err(AppError::Provider(format!(
                "simulated outage for market {}",
                market.code
            )));
        }
        Ok(self.responses.get(&market.code).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct MemorySink {
    fail_event_inserts: bool,
    archived: Mutex<Vec<RawResponseRecord>>,
    properties: Mutex<Vec<PropertyRow>>,
    events: Mutex<Vec<EventRow>>,
    periods: Mutex<Vec<PeriodRow>>,
    next_id: AtomicI64,
}

#[async_trait]
impl IngestSink for MemorySink {
    async fn archive_raw_responses(
        &self,
        records: &[RawResponseRecord],
    ) -> Result<HashMap<String, i64>, AppError> {
        let mut id_map = HashMap::new();
        let mut archived = self.archived.lock().unwrap();
        for record in records {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            id_map.insert(record.content_hash.clone(), id);
            archived.push(record.clone());
        }
        Ok(id_map)
    }

    async fn insert_properties(&self, rows: &[PropertyRow]) -> Result<(), AppError> {
        self.properties.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn insert_events(&self, rows: &[EventRow]) -> Result<(), AppError> {
        if self.fail_event_inserts {
            return Err(AppError::Provider("simulated write failure".to_string()));
        }
        self.events.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn insert_periods(&self, rows: &[PeriodRow]) -> Result<(), AppError> {
        self.periods.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}

fn classified_periods(sink: &MemorySink) -> Vec<(i64, TransactionPeriod)> {
    let mut periods: Vec<(i64, TransactionPeriod)> = sink
        .periods
        .lock()
        .unwrap()
        .iter()
        .map(|row| (row.parcl_property_id, row.period.clone()))
        .collect();
    periods.sort_by_key(|(id, p)| (*id, p.sequence_number));
    periods
}

async fn run_fixture(workers: usize) -> (Arc<MemorySink>, rust_parcl_ingest::models::RunSummary) {
    let (markets, responses) = fixture_markets();
    let provider = Arc::new(FakeProvider::new(markets, responses));
    let sink = Arc::new(MemorySink::default());
    let coordinator =
        IngestCoordinator::new(provider, Arc::clone(&sink) as Arc<dyn IngestSink>, settings(workers));

    let summary = coordinator.run("Atlanta, GA", test_range()).await.unwrap();
    (sink, summary)
}

#[tokio::test]
async fn test_pool_output_independent_of_worker_count() {
    let (sink_serial, summary_serial) = run_fixture(1).await;
    let (sink_parallel, summary_parallel) = run_fixture(8).await;

    assert_eq!(
        classified_periods(&sink_serial),
        classified_periods(&sink_parallel)
    );
    assert_eq!(
        summary_serial.properties_stored,
        summary_parallel.properties_stored
    );
    assert_eq!(summary_serial.events_stored, summary_parallel.events_stored);
    assert_eq!(
        summary_serial.periods_stored,
        summary_parallel.periods_stored
    );
}

#[tokio::test]
async fn test_fixture_classification_shape() {
    let (sink, summary) = run_fixture(2).await;

    assert_eq!(summary.markets_total, 3);
    assert_eq!(summary.markets_processed, 3);
    assert_eq!(summary.markets_failed, 0);
    assert_eq!(summary.properties_fetched, 4);
    // Property 301 is new-construction noise (2025 >= 2024 cutoff).
    assert_eq!(summary.properties_skipped, 1);
    assert_eq!(summary.properties_stored, 3);

    // Property 101: one completed flip + one open period; 102: one open
    // landlord period; 201: two completed + one open.
    let periods = classified_periods(&sink);
    assert_eq!(periods.len(), 6);

    let p101: Vec<_> = periods.iter().filter(|(id, _)| *id == 101).collect();
    assert_eq!(p101.len(), 2);
    assert_eq!(p101[0].1.holding_period_days, Some(181));
    assert!(p101[1].1.sale_date.is_none());

    let p102: Vec<_> = periods.iter().filter(|(id, _)| *id == 102).collect();
    assert_eq!(p102.len(), 1);
    assert!(p102[0].1.has_rental_activity);

    // Archive covers the skipped property too.
    assert_eq!(sink.archived.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_every_market_claimed_exactly_once() {
    let markets: Vec<MarketIdentifier> = (0..20)
        .map(|i| market(i, &format!("30{:03}", i)))
        .collect();
    let provider = Arc::new(FakeProvider::new(markets, HashMap::new()));
    let sink = Arc::new(MemorySink::default());
    let coordinator = IngestCoordinator::new(
        Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
        sink,
        settings(8),
    );

    let summary = coordinator.run("Atlanta, GA", test_range()).await.unwrap();

    assert_eq!(summary.markets_total, 20);
    assert_eq!(summary.markets_processed, 20);
    assert_eq!(summary.markets_empty, 20);

    let counts = provider.query_counts.lock().unwrap();
    assert_eq!(counts.len(), 20);
    assert!(counts.values().all(|&n| n == 1));
}

#[tokio::test]
async fn test_failing_market_is_isolated() {
    let (markets, responses) = fixture_markets();
    let mut provider = FakeProvider::new(markets, responses);
    provider.failing_markets.insert("30324".to_string());
    let provider = Arc::new(provider);
    let sink = Arc::new(MemorySink::default());
    let coordinator = IngestCoordinator::new(
        provider,
        Arc::clone(&sink) as Arc<dyn IngestSink>,
        settings(4),
    );

    let summary = coordinator.run("Atlanta, GA", test_range()).await.unwrap();

    assert_eq!(summary.markets_failed, 1);
    assert_eq!(summary.markets_processed, 2);

    // Nothing from the failed market was archived or classified.
    let archived = sink.archived.lock().unwrap();
    assert!(archived.iter().all(|r| r.target_property_id != 201));
    let periods = classified_periods(&sink);
    assert!(periods.iter().all(|(id, _)| *id != 201));
    assert!(!periods.is_empty());
}

#[tokio::test]
async fn test_enumeration_failure_aborts_run() {
    let (markets, responses) = fixture_markets();
    let mut provider = FakeProvider::new(markets, responses);
    provider.fail_enumeration = true;
    let coordinator = IngestCoordinator::new(
        Arc::new(provider),
        Arc::new(MemorySink::default()),
        settings(4),
    );

    let result = coordinator.run("Atlanta, GA", test_range()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_partial_persistence_is_tolerated() {
    let (markets, responses) = fixture_markets();
    let provider = Arc::new(FakeProvider::new(markets, responses));
    let sink = Arc::new(MemorySink {
        fail_event_inserts: true,
        ..MemorySink::default()
    });
    let coordinator = IngestCoordinator::new(
        provider,
        Arc::clone(&sink) as Arc<dyn IngestSink>,
        settings(2),
    );

    let summary = coordinator.run("Atlanta, GA", test_range()).await.unwrap();

    // The failing stage loses its rows but the market is not failed and the
    // other two stages landed.
    assert_eq!(summary.markets_failed, 0);
    assert_eq!(summary.events_stored, 0);
    assert!(summary.properties_stored > 0);
    assert!(summary.periods_stored > 0);
    assert_eq!(summary.persistence_failures, 2);
    assert!(sink.events.lock().unwrap().is_empty());
    assert!(!sink.properties.lock().unwrap().is_empty());
}
