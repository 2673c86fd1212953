use crate::archive;
use crate::classifier;
use crate::config::{ClassifyRules, Config, FilterRules};
use crate::db_storage::IngestSink;
use crate::eligibility;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    DateRange, EventRow, MarketIdentifier, PeriodRow, PropertyRow, RunSummary,
    CLASSIFIABLE_EVENTS,
};
use crate::provider::{MarketDataProvider, PROPERTY_EVENTS_ENDPOINT};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Running totals for one run. Workers complete in non-deterministic order,
/// so every update is an atomic increment; the coordinator owns the instance
/// and snapshots it into the summary after the pool drains.
#[derive(Debug, Default)]
pub struct RunStats {
    pub markets_processed: AtomicU64,
    pub markets_failed: AtomicU64,
    pub markets_empty: AtomicU64,
    pub properties_fetched: AtomicU64,
    pub properties_skipped: AtomicU64,
    pub properties_stored: AtomicU64,
    pub events_stored: AtomicU64,
    pub periods_stored: AtomicU64,
    pub classification_skipped: AtomicU64,
    pub persistence_failures: AtomicU64,
}

impl RunStats {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Tuning knobs for one run, detached from the full service config so the
/// coordinator can be driven directly in tests.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub worker_count: usize,
    pub worker_delay: Duration,
    pub filter: FilterRules,
    pub classify: ClassifyRules,
}

impl From<&Config> for IngestSettings {
    fn from(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            worker_delay: Duration::from_millis(config.worker_delay_ms),
            filter: config.filter,
            classify: config.classify,
        }
    }
}

/// Drives the enumerate → fetch → archive → filter → segment/classify →
/// persist pipeline over one region's markets.
pub struct IngestCoordinator {
    provider: Arc<dyn MarketDataProvider>,
    sink: Arc<dyn IngestSink>,
    settings: IngestSettings,
}

impl IngestCoordinator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        sink: Arc<dyn IngestSink>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            provider,
            sink,
            settings,
        }
    }

    /// Runs the full pipeline for one region under a fresh session id.
    pub async fn run(&self, region: &str, range: DateRange) -> Result<RunSummary, AppError> {
        self.run_session(region, range, Uuid::new_v4()).await
    }

    /// Runs the full pipeline for one region.
    ///
    /// Market enumeration failure aborts the run (nothing to iterate over);
    /// every other failure is contained to its market. The classification
    /// `as_of` date is captured once at run start, so output is independent
    /// of the concurrency level.
    pub async fn run_session(
        &self,
        region: &str,
        range: DateRange,
        session_id: Uuid,
    ) -> Result<RunSummary, AppError> {
        let started_at = Utc::now();
        let as_of = started_at.date_naive();

        let markets = self
            .provider
            .enumerate_markets(region)
            .await
            .context(format!("market enumeration failed for region '{}'", region))?;

        tracing::info!(
            "Run {} starting: region '{}', {} markets, {} workers, window {} to {}",
            session_id,
            region,
            markets.len(),
            self.settings.worker_count,
            range.start,
            range.end
        );

        let markets = Arc::new(markets);
        let cursor = Arc::new(AtomicUsize::new(0));
        let stats = Arc::new(RunStats::default());

        let worker_count = self.settings.worker_count.clamp(1, markets.len().max(1));
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker = MarketWorker {
                provider: Arc::clone(&self.provider),
                sink: Arc::clone(&self.sink),
                settings: self.settings.clone(),
                range,
                session_id,
                as_of,
                stats: Arc::clone(&stats),
            };
            let markets = Arc::clone(&markets);
            let cursor = Arc::clone(&cursor);

            handles.push(tokio::spawn(async move {
                worker.drain(worker_id, &markets, &cursor).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task join failed: {}", e);
            }
        }

        let summary = RunSummary {
            session_id,
            region: region.to_string(),
            date_range: range,
            worker_count,
            markets_total: markets.len() as u64,
            markets_processed: stats.markets_processed.load(Ordering::Relaxed),
            markets_failed: stats.markets_failed.load(Ordering::Relaxed),
            markets_empty: stats.markets_empty.load(Ordering::Relaxed),
            properties_fetched: stats.properties_fetched.load(Ordering::Relaxed),
            properties_skipped: stats.properties_skipped.load(Ordering::Relaxed),
            properties_stored: stats.properties_stored.load(Ordering::Relaxed),
            events_stored: stats.events_stored.load(Ordering::Relaxed),
            periods_stored: stats.periods_stored.load(Ordering::Relaxed),
            classification_skipped: stats.classification_skipped.load(Ordering::Relaxed),
            persistence_failures: stats.persistence_failures.load(Ordering::Relaxed),
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            "Run {} complete: {}/{} markets processed ({} failed, {} empty), \
             {} properties stored, {} events, {} periods",
            summary.session_id,
            summary.markets_processed,
            summary.markets_total,
            summary.markets_failed,
            summary.markets_empty,
            summary.properties_stored,
            summary.events_stored,
            summary.periods_stored
        );

        Ok(summary)
    }
}

/// One worker of the fetch pool. Claims market indices off the shared cursor
/// until the list is exhausted; all five pipeline stages run sequentially
/// within the worker for one market at a time.
struct MarketWorker {
    provider: Arc<dyn MarketDataProvider>,
    sink: Arc<dyn IngestSink>,
    settings: IngestSettings,
    range: DateRange,
    session_id: Uuid,
    as_of: NaiveDate,
    stats: Arc<RunStats>,
}

impl MarketWorker {
    async fn drain(
        &self,
        worker_id: usize,
        markets: &[MarketIdentifier],
        cursor: &AtomicUsize,
    ) {
        loop {
            // Atomic claim: each index is handed to exactly one worker.
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(market) = markets.get(index) else {
                break;
            };

            match self.process_market(market).await {
                Ok(()) => {
                    RunStats::add(&self.stats.markets_processed, 1);
                }
                Err(e) => {
                    RunStats::add(&self.stats.markets_failed, 1);
                    tracing::error!("Market {} failed: {}", market.code, e);
                }
            }

            // Rate-limiting courtesy toward the provider, not correctness.
            tokio::time::sleep(self.settings.worker_delay).await;
        }

        tracing::debug!("Worker {} drained", worker_id);
    }

    async fn process_market(&self, market: &MarketIdentifier) -> Result<(), AppError> {
        let snapshots = self
            .provider
            .query_property_events(market, &CLASSIFIABLE_EVENTS, &self.range)
            .await?;

        RunStats::add(&self.stats.properties_fetched, snapshots.len() as u64);

        if snapshots.is_empty() {
            RunStats::add(&self.stats.markets_empty, 1);
            tracing::debug!("Market {} returned no properties", market.code);
            return Ok(());
        }

        // Archive every snapshot the provider returned, before any filtering.
        let request_params = json!({
            "zip_code": market.code,
            "event_names": CLASSIFIABLE_EVENTS,
            "start_date": self.range.start,
            "end_date": self.range.end,
        });
        let records = archive::build_archive_records(
            &snapshots,
            PROPERTY_EVENTS_ENDPOINT,
            request_params,
            200,
            self.session_id,
        );
        let id_map = self
            .sink
            .archive_raw_responses(&records)
            .await
            .context(format!("raw archival failed for market {}", market.code))?;
        let hashes: Vec<String> = records.into_iter().map(|r| r.content_hash).collect();

        let mut property_rows: Vec<PropertyRow> = Vec::new();
        let mut event_rows: Vec<EventRow> = Vec::new();
        let mut period_rows: Vec<PeriodRow> = Vec::new();

        for (snapshot, hash) in snapshots.into_iter().zip(hashes) {
            if !eligibility::is_eligible(&snapshot, &self.settings.filter) {
                RunStats::add(&self.stats.properties_skipped, 1);
                continue;
            }

            let Some(&raw_response_id) = id_map.get(&hash) else {
                tracing::warn!(
                    "Market {}: no archive id for property {}; skipping",
                    market.code,
                    snapshot.parcl_property_id
                );
                continue;
            };

            let mut events = snapshot.events.clone();
            let periods =
                match classifier::classify_property(&mut events, &self.settings.classify, self.as_of)
                {
                    Ok(periods) => periods,
                    Err(e) => {
                        RunStats::add(&self.stats.classification_skipped, 1);
                        tracing::warn!(
                            "Market {}: skipping classification for property {}: {}",
                            market.code,
                            snapshot.parcl_property_id,
                            e
                        );
                        continue;
                    }
                };

            let summary = classifier::summarize_latest(&periods, self.as_of);

            property_rows.push(PropertyRow {
                parcl_property_id: snapshot.parcl_property_id,
                raw_response_id,
                address: snapshot.address.clone(),
                city: snapshot.city.clone(),
                state_abbreviation: snapshot.state_abbreviation.clone(),
                county: snapshot.county.clone(),
                zip_code: snapshot.zip_code.clone(),
                bedrooms: snapshot.bedrooms,
                bathrooms: snapshot.bathrooms,
                square_footage: snapshot.square_footage,
                year_built: snapshot.year_built,
                latitude: snapshot.latitude,
                longitude: snapshot.longitude,
                property_type: snapshot.property_type.clone(),
                investor_category: summary.investor_category,
                days_to_sale: summary.days_to_sale,
                days_to_rental: summary.days_to_rental,
                classification_date: summary.classification_date,
                session_id: self.session_id,
            });

            for event in &events {
                event_rows.push(EventRow {
                    parcl_property_id: snapshot.parcl_property_id,
                    raw_response_id,
                    event_type: event.event_type.clone(),
                    event_name: event.event_name.clone(),
                    event_date: event.event_date,
                    price: event.price,
                    owner_occupied_flag: event.owner_occupied_flag,
                    new_construction_flag: event.new_construction_flag,
                    investor_flag: event.investor_flag,
                    entity_owner_name: event.entity_owner_name.clone(),
                    session_id: self.session_id,
                });
            }

            for period in periods {
                period_rows.push(PeriodRow {
                    parcl_property_id: snapshot.parcl_property_id,
                    raw_response_id,
                    period,
                    session_id: self.session_id,
                });
            }
        }

        // Three independent batch writes; partial success is tolerated and
        // logged, and never blocks the other markets.
        if !property_rows.is_empty() {
            match self.sink.insert_properties(&property_rows).await {
                Ok(()) => {
                    RunStats::add(&self.stats.properties_stored, property_rows.len() as u64)
                }
                Err(e) => {
                    RunStats::add(&self.stats.persistence_failures, 1);
                    tracing::error!("Market {}: property batch insert failed: {}", market.code, e);
                }
            }
        }
        if !event_rows.is_empty() {
            match self.sink.insert_events(&event_rows).await {
                Ok(()) => RunStats::add(&self.stats.events_stored, event_rows.len() as u64),
                Err(e) => {
                    RunStats::add(&self.stats.persistence_failures, 1);
                    tracing::error!("Market {}: event batch insert failed: {}", market.code, e);
                }
            }
        }
        if !period_rows.is_empty() {
            match self.sink.insert_periods(&period_rows).await {
                Ok(()) => RunStats::add(&self.stats.periods_stored, period_rows.len() as u64),
                Err(e) => {
                    RunStats::add(&self.stats.persistence_failures, 1);
                    tracing::error!("Market {}: period batch insert failed: {}", market.code, e);
                }
            }
        }

        Ok(())
    }
}
