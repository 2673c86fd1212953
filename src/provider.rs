use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{DateRange, MarketIdentifier, PropertySnapshot};
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const MARKET_SEARCH_ENDPOINT: &str = "/v1/search/markets";
pub const PROPERTY_EVENTS_ENDPOINT: &str = "/v1/property/events";

/// Contract consumed by the run coordinator. Implemented by the Parcl REST
/// client in production and by in-memory fakes in tests.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Produces the ordered list of market identifiers (ZIP codes) for one
    /// region. Failure here is fatal to a run: there is nothing to process.
    async fn enumerate_markets(&self, region: &str) -> Result<Vec<MarketIdentifier>, AppError>;

    /// One event-search call scoped to one market. An empty list is a valid
    /// "no data" result, not an error.
    async fn query_property_events(
        &self,
        market: &MarketIdentifier,
        event_names: &[&str],
        range: &DateRange,
    ) -> Result<Vec<PropertySnapshot>, AppError>;
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope<T> {
    #[serde(default)]
    items: Vec<T>,
}

/// Parcl Labs API client.
pub struct ParclService {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: ProviderCircuitBreaker,
    /// Market enumeration is stable within a run window; repeated triggers
    /// for the same region reuse the cached list.
    markets_cache: Cache<String, Vec<MarketIdentifier>>,
}

impl ParclService {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.parcl_base_url, &config.parcl_api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            breaker: create_provider_circuit_breaker(),
            markets_cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(Duration::from_secs(60 * 60))
                .build(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for ParclService {
    async fn enumerate_markets(&self, region: &str) -> Result<Vec<MarketIdentifier>, AppError> {
        if let Some(cached) = self.markets_cache.get(region).await {
            tracing::debug!("Market list for region '{}' served from cache", region);
            return Ok(cached);
        }

        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &format!("{}{}", self.base_url, MARKET_SEARCH_ENDPOINT),
            &[
                ("query", region),
                ("location_type", "ZIP5"),
                ("limit", "1000"),
            ],
        )
        .map_err(|e| AppError::Provider(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Enumerating markets for region: {}", region);

        let request = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json");

        let result = self
            .breaker
            .call(async move {
                let response = request.send().await.map_err(|e| {
                    AppError::Provider(format!("Market search request failed: {}", e))
                })?;

                if !response.status().is_success() {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(AppError::Provider(format!(
                        "Market search returned status {}: {}",
                        status, error_text
                    )));
                }

                response
                    .json::<ItemsEnvelope<MarketIdentifier>>()
                    .await
                    .map_err(|e| {
                        AppError::Provider(format!("Failed to parse market search response: {}", e))
                    })
            })
            .await;

        let envelope = unwrap_breaker(result)?;

        // The search endpoint also returns city/county aggregates; only
        // 5-digit ZIP markets are queryable units here.
        let zip5 = Regex::new(r"^\d{5}$").unwrap();
        let markets: Vec<MarketIdentifier> = envelope
            .items
            .into_iter()
            .filter(|m| {
                let keep = zip5.is_match(&m.code);
                if !keep {
                    tracing::debug!("Skipping non-ZIP5 market entry: {}", m.code);
                }
                keep
            })
            .collect();

        tracing::info!("Region '{}' resolved to {} markets", region, markets.len());

        self.markets_cache
            .insert(region.to_string(), markets.clone())
            .await;

        Ok(markets)
    }

    async fn query_property_events(
        &self,
        market: &MarketIdentifier,
        event_names: &[&str],
        range: &DateRange,
    ) -> Result<Vec<PropertySnapshot>, AppError> {
        let url = format!("{}{}", self.base_url, PROPERTY_EVENTS_ENDPOINT);

        let body = json!({
            "zip_code": market.code,
            "parcl_id": market.parcl_id,
            "event_names": event_names,
            "start_date": range.start,
            "end_date": range.end,
        });

        tracing::debug!("Querying property events for market {}", market.code);

        let request = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .json(&body);

        let market_code = market.code.clone();
        let result = self
            .breaker
            .call(async move {
                let response = request.send().await.map_err(|e| {
                    AppError::Provider(format!(
                        "Event query for market {} failed: {}",
                        market_code, e
                    ))
                })?;

                if !response.status().is_success() {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(AppError::Provider(format!(
                        "Event query for market {} returned status {}: {}",
                        market_code, status, error_text
                    )));
                }

                response
                    .json::<ItemsEnvelope<PropertySnapshot>>()
                    .await
                    .map_err(|e| {
                        AppError::Provider(format!(
                            "Failed to parse event query response for market {}: {}",
                            market_code, e
                        ))
                    })
            })
            .await;

        Ok(unwrap_breaker(result)?.items)
    }
}

fn unwrap_breaker<T>(result: Result<T, failsafe::Error<AppError>>) -> Result<T, AppError> {
    match result {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(e)) => Err(e),
        Err(failsafe::Error::Rejected) => Err(AppError::Provider(
            "Provider circuit breaker is open; call rejected".to_string(),
        )),
    }
}
