use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ============ Provider event names ============

pub const EVENT_SOLD: &str = "SOLD";
pub const EVENT_LISTED_RENT: &str = "LISTED_RENT";
pub const EVENT_PRICE_CHANGE: &str = "PRICE_CHANGE";

/// Event names that make a property classifiable at all.
pub const CLASSIFIABLE_EVENTS: [&str; 3] = [EVENT_SOLD, EVENT_LISTED_RENT, EVENT_PRICE_CHANGE];

/// Event names treated as rental-market activity.
pub const RENTAL_EVENTS: [&str; 2] = [EVENT_LISTED_RENT, EVENT_PRICE_CHANGE];

// ============ Provider Models ============

/// One queryable geographic unit (a ZIP code) as returned by the market
/// search endpoint. Descriptive attributes are carried for reporting only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketIdentifier {
    /// Provider-assigned market id.
    pub parcl_id: i64,
    /// Human-readable market code (5-digit ZIP).
    #[serde(alias = "name")]
    pub code: String,
    pub state_abbreviation: Option<String>,
    pub total_population: Option<i64>,
    pub median_income: Option<i64>,
}

/// One immutable fact from a property's transaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyEvent {
    /// Coarse category (SALE / LISTING / RENTAL).
    pub event_type: Option<String>,
    /// Fine-grained name (SOLD, LISTED_RENT, PRICE_CHANGE, ...).
    pub event_name: String,
    pub event_date: NaiveDate,
    /// Whole-dollar amount; absent for transfers with no recorded price.
    pub price: Option<i64>,
    pub owner_occupied_flag: Option<bool>,
    pub new_construction_flag: Option<bool>,
    pub investor_flag: Option<bool>,
    pub entity_owner_name: Option<String>,
}

impl PropertyEvent {
    pub fn is_sold(&self) -> bool {
        self.event_name == EVENT_SOLD
    }

    pub fn is_rental(&self) -> bool {
        RENTAL_EVENTS.contains(&self.event_name.as_str())
    }
}

/// One property as returned by the provider for one market query, with its
/// nested event history. Archived verbatim regardless of eligibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub parcl_property_id: i64,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state_abbreviation: Option<String>,
    pub county: Option<String>,
    pub zip_code: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_footage: Option<i32>,
    pub year_built: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub property_type: Option<String>,
    pub current_on_market_flag: Option<bool>,
    pub current_owner_occupied_flag: Option<bool>,
    pub current_investor_owned_flag: Option<bool>,
    /// Provider-ordered, not guaranteed sorted.
    #[serde(default)]
    pub events: Vec<PropertyEvent>,
}

// ============ Archive Models ============

/// One archival row per property snapshot: the verbatim provider payload
/// plus enough request context to replay the audit trail. Created once at
/// archive time, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct RawResponseRecord {
    /// SHA-256 fingerprint of `raw_payload`, used to correlate derived rows
    /// back to this archival row within the same run.
    pub content_hash: String,
    pub provider_endpoint: String,
    pub request_params: Value,
    pub raw_payload: Value,
    pub response_status: i32,
    /// Run session id; one per coordinator run.
    pub session_id: Uuid,
    pub target_property_id: i64,
}

// ============ Classification Models ============

/// One ownership interval bounded by consecutive SOLD events, before
/// classification. The last period of a property has no sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipPeriod {
    /// 1-based, chronological, contiguous per property.
    pub sequence_number: i32,
    pub purchase_date: NaiveDate,
    pub purchase_price: Option<i64>,
    pub sale_date: Option<NaiveDate>,
    pub sale_price: Option<i64>,
}

impl OwnershipPeriod {
    pub fn is_open(&self) -> bool {
        self.sale_date.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionCategory {
    Wholesaler,
    Flip,
    LongTermHold,
    CurrentOwnership,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::Wholesaler => "WHOLESALER",
            TransactionCategory::Flip => "FLIP",
            TransactionCategory::LongTermHold => "LONG_TERM_HOLD",
            TransactionCategory::CurrentOwnership => "CURRENT_OWNERSHIP",
        }
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestorType {
    Wholesaler,
    Flipper,
    Landlord,
    Unknown,
}

impl InvestorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorType::Wholesaler => "WHOLESALER",
            InvestorType::Flipper => "FLIPPER",
            InvestorType::Landlord => "LANDLORD",
            InvestorType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InvestorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backward-compatible single-value classification of a property, derived
/// from its most recent ownership period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestorCategory {
    Flip,
    Wholesaler,
    Landlord,
    Unknown,
}

impl InvestorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorCategory::Flip => "FLIP",
            InvestorCategory::Wholesaler => "WHOLESALER",
            InvestorCategory::Landlord => "LANDLORD",
            InvestorCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InvestorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified ownership interval for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPeriod {
    pub sequence_number: i32,
    pub purchase_date: NaiveDate,
    pub purchase_price: Option<i64>,
    /// None means still owned as of run time.
    pub sale_date: Option<NaiveDate>,
    pub sale_price: Option<i64>,
    /// None while the period is open.
    pub holding_period_days: Option<i64>,
    /// Present only when both prices are.
    pub profit_loss: Option<i64>,
    pub transaction_category: TransactionCategory,
    pub investor_type: InvestorType,
    pub has_rental_activity: bool,
    pub rental_events_count: i64,
    /// Days from purchase to the earliest qualifying rental event; may be
    /// negative when the event came through a look-back window.
    pub days_to_first_rental: Option<i64>,
    /// Taken from the latest positive-priced rental event strictly inside
    /// the ownership window.
    pub rental_price: Option<i64>,
}

/// Denormalized latest-period summary attached to a stored property.
/// The authoritative detail lives in the transaction-period rows.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PropertyClassification {
    pub investor_category: InvestorCategory,
    pub days_to_sale: Option<i64>,
    pub days_to_rental: Option<i64>,
    pub classification_date: NaiveDate,
}

// ============ Persistence Rows ============

/// Property row for the batch insert, with the denormalized summary.
#[derive(Debug, Clone)]
pub struct PropertyRow {
    pub parcl_property_id: i64,
    pub raw_response_id: i64,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state_abbreviation: Option<String>,
    pub county: Option<String>,
    pub zip_code: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_footage: Option<i32>,
    pub year_built: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub property_type: Option<String>,
    pub investor_category: InvestorCategory,
    pub days_to_sale: Option<i64>,
    pub days_to_rental: Option<i64>,
    pub classification_date: NaiveDate,
    pub session_id: Uuid,
}

/// Raw event row for the batch insert.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub parcl_property_id: i64,
    pub raw_response_id: i64,
    pub event_type: Option<String>,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub price: Option<i64>,
    pub owner_occupied_flag: Option<bool>,
    pub new_construction_flag: Option<bool>,
    pub investor_flag: Option<bool>,
    pub entity_owner_name: Option<String>,
    pub session_id: Uuid,
}

/// Classified transaction-period row for the batch insert.
#[derive(Debug, Clone)]
pub struct PeriodRow {
    pub parcl_property_id: i64,
    pub raw_response_id: i64,
    pub period: TransactionPeriod,
    pub session_id: Uuid,
}

// ============ Run Models ============

/// Inclusive event-search window for one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Operator-facing summary of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub session_id: Uuid,
    pub region: String,
    pub date_range: DateRange,
    pub worker_count: usize,
    pub markets_total: u64,
    pub markets_processed: u64,
    pub markets_failed: u64,
    pub markets_empty: u64,
    pub properties_fetched: u64,
    pub properties_skipped: u64,
    pub properties_stored: u64,
    pub events_stored: u64,
    pub periods_stored: u64,
    pub classification_skipped: u64,
    pub persistence_failures: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
