use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::Deserialize;

/// Classification thresholds, separated out so the pure classification code
/// does not depend on the full service configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClassifyRules {
    /// Holding periods at or below this many days are wholesale deals.
    pub wholesale_max_days: i64,
    /// Holding periods above `wholesale_max_days` and at or below this are flips.
    pub flip_max_days: i64,
    /// Look-back window (days) for rental activity bracketing an ownership window.
    pub rental_lookback_days: i64,
}

impl Default for ClassifyRules {
    fn default() -> Self {
        Self {
            wholesale_max_days: 14,
            flip_max_days: 450,
            rental_lookback_days: 60,
        }
    }
}

/// Eligibility filter knobs.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FilterRules {
    /// When true, properties built in or after `new_construction_cutoff_year`
    /// are dropped as new-construction noise.
    pub exclude_new_construction: bool,
    pub new_construction_cutoff_year: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub parcl_api_key: String,
    pub parcl_base_url: String,
    /// Region whose markets (ZIP codes) are enumerated per run.
    pub region: String,
    /// Concurrency level W of the fetch worker pool.
    pub worker_count: usize,
    /// Fixed per-worker delay between provider calls, in milliseconds.
    pub worker_delay_ms: u64,
    /// Event search window defaults to today back this many years.
    pub event_lookback_years: u32,
    pub filter: FilterRules,
    pub classify: ClassifyRules,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            parcl_api_key: std::env::var("PARCL_API_KEY")
                .map_err(|_| anyhow::anyhow!("PARCL_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("PARCL_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            parcl_base_url: std::env::var("PARCL_BASE_URL")
                .unwrap_or_else(|_| "https://api.parcllabs.com".to_string())
                .trim()
                .to_string(),
            region: std::env::var("INGEST_REGION")
                .map_err(|_| anyhow::anyhow!("INGEST_REGION environment variable required"))
                .and_then(|region| {
                    if region.trim().is_empty() {
                        anyhow::bail!("INGEST_REGION cannot be empty");
                    }
                    Ok(region)
                })?,
            worker_count: std::env::var("INGEST_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("INGEST_WORKERS must be a positive integer"))
                .and_then(|w: usize| {
                    if w < 1 {
                        anyhow::bail!("INGEST_WORKERS must be at least 1");
                    }
                    Ok(w)
                })?,
            worker_delay_ms: std::env::var("INGEST_WORKER_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("INGEST_WORKER_DELAY_MS must be a number"))?,
            event_lookback_years: std::env::var("EVENT_LOOKBACK_YEARS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("EVENT_LOOKBACK_YEARS must be a number"))?,
            filter: FilterRules {
                exclude_new_construction: std::env::var("EXCLUDE_NEW_CONSTRUCTION")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                new_construction_cutoff_year: std::env::var("NEW_CONSTRUCTION_CUTOFF_YEAR")
                    .unwrap_or_else(|_| (Utc::now().year() - 1).to_string())
                    .parse()
                    .map_err(|_| {
                        anyhow::anyhow!("NEW_CONSTRUCTION_CUTOFF_YEAR must be a year")
                    })?,
            },
            classify: ClassifyRules {
                wholesale_max_days: std::env::var("WHOLESALE_MAX_DAYS")
                    .unwrap_or_else(|_| "14".to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("WHOLESALE_MAX_DAYS must be a number"))?,
                flip_max_days: std::env::var("FLIP_MAX_DAYS")
                    .unwrap_or_else(|_| "450".to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("FLIP_MAX_DAYS must be a number"))?,
                rental_lookback_days: std::env::var("RENTAL_LOOKBACK_DAYS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("RENTAL_LOOKBACK_DAYS must be a number"))?,
            },
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Parcl base URL: {}", config.parcl_base_url);
        tracing::debug!("Region: {}", config.region);
        tracing::debug!(
            "Workers: {} (delay {}ms)",
            config.worker_count,
            config.worker_delay_ms
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Default event-search window: today back `event_lookback_years` years.
    pub fn default_date_range(&self) -> (NaiveDate, NaiveDate) {
        let end = Utc::now().date_naive();
        let start = end
            .checked_sub_months(Months::new(12 * self.event_lookback_years))
            .unwrap_or(end);
        (start, end)
    }
}
