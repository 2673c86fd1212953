use crate::errors::AppError;
use crate::models::{EventRow, PeriodRow, PropertyRow, RawResponseRecord};
use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;

/// Rows per INSERT statement, keeping well under Postgres' bind limit.
const INSERT_CHUNK: usize = 500;

/// Append-only batch persistence consumed by the run coordinator.
///
/// Each call is one atomic batch from the caller's perspective; there is no
/// cross-table transaction between the calls, and concurrent batches from
/// multiple workers are safe (the pool serializes each statement on its own
/// connection).
#[async_trait]
pub trait IngestSink: Send + Sync {
    /// Archives one market's raw responses, returning content hash →
    /// generated row id for foreign-key attachment within the same run.
    async fn archive_raw_responses(
        &self,
        records: &[RawResponseRecord],
    ) -> Result<HashMap<String, i64>, AppError>;

    async fn insert_properties(&self, rows: &[PropertyRow]) -> Result<(), AppError>;

    async fn insert_events(&self, rows: &[EventRow]) -> Result<(), AppError>;

    async fn insert_periods(&self, rows: &[PeriodRow]) -> Result<(), AppError>;
}

/// Postgres storage for archived responses and derived classification rows.
pub struct IngestStorage {
    pool: PgPool,
}

impl IngestStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IngestSink for IngestStorage {
    async fn archive_raw_responses(
        &self,
        records: &[RawResponseRecord],
    ) -> Result<HashMap<String, i64>, AppError> {
        let mut id_map = HashMap::with_capacity(records.len());

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO ingest.raw_property_responses \
                 (content_hash, provider_endpoint, request_params, raw_payload, \
                  response_status, session_id, target_property_id) ",
            );
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.content_hash)
                    .push_bind(&record.provider_endpoint)
                    .push_bind(&record.request_params)
                    .push_bind(&record.raw_payload)
                    .push_bind(record.response_status)
                    .push_bind(record.session_id)
                    .push_bind(record.target_property_id);
            });
            builder.push(" RETURNING content_hash, id");

            let rows: Vec<(String, i64)> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(AppError::Database)?;

            for (hash, id) in rows {
                id_map.insert(hash, id);
            }
        }

        Ok(id_map)
    }

    async fn insert_properties(&self, rows: &[PropertyRow]) -> Result<(), AppError> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO ingest.properties \
                 (parcl_property_id, raw_response_id, address, city, state_abbreviation, \
                  county, zip_code, bedrooms, bathrooms, square_footage, year_built, \
                  latitude, longitude, property_type, investor_category, days_to_sale, \
                  days_to_rental, classification_date, session_id) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.parcl_property_id)
                    .push_bind(row.raw_response_id)
                    .push_bind(&row.address)
                    .push_bind(&row.city)
                    .push_bind(&row.state_abbreviation)
                    .push_bind(&row.county)
                    .push_bind(&row.zip_code)
                    .push_bind(row.bedrooms)
                    .push_bind(row.bathrooms)
                    .push_bind(row.square_footage)
                    .push_bind(row.year_built)
                    .push_bind(row.latitude)
                    .push_bind(row.longitude)
                    .push_bind(&row.property_type)
                    .push_bind(row.investor_category.as_str())
                    .push_bind(row.days_to_sale)
                    .push_bind(row.days_to_rental)
                    .push_bind(row.classification_date)
                    .push_bind(row.session_id);
            });

            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(AppError::Database)?;
        }

        Ok(())
    }

    async fn insert_events(&self, rows: &[EventRow]) -> Result<(), AppError> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO ingest.property_events \
                 (parcl_property_id, raw_response_id, event_type, event_name, event_date, \
                  price, owner_occupied_flag, new_construction_flag, investor_flag, \
                  entity_owner_name, session_id) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.parcl_property_id)
                    .push_bind(row.raw_response_id)
                    .push_bind(&row.event_type)
                    .push_bind(&row.event_name)
                    .push_bind(row.event_date)
                    .push_bind(row.price)
                    .push_bind(row.owner_occupied_flag)
                    .push_bind(row.new_construction_flag)
                    .push_bind(row.investor_flag)
                    .push_bind(&row.entity_owner_name)
                    .push_bind(row.session_id);
            });

            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(AppError::Database)?;
        }

        Ok(())
    }

    async fn insert_periods(&self, rows: &[PeriodRow]) -> Result<(), AppError> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO ingest.transaction_periods \
                 (parcl_property_id, raw_response_id, sequence_number, purchase_date, \
                  purchase_price, sale_date, sale_price, holding_period_days, profit_loss, \
                  transaction_category, investor_type, has_rental_activity, \
                  rental_events_count, days_to_first_rental, rental_price, session_id) ",
            );
            builder.push_values(chunk, |mut b, row| {
                let period = &row.period;
                b.push_bind(row.parcl_property_id)
                    .push_bind(row.raw_response_id)
                    .push_bind(period.sequence_number)
                    .push_bind(period.purchase_date)
                    .push_bind(period.purchase_price)
                    .push_bind(period.sale_date)
                    .push_bind(period.sale_price)
                    .push_bind(period.holding_period_days)
                    .push_bind(period.profit_loss)
                    .push_bind(period.transaction_category.as_str())
                    .push_bind(period.investor_type.as_str())
                    .push_bind(period.has_rental_activity)
                    .push_bind(period.rental_events_count)
                    .push_bind(period.days_to_first_rental)
                    .push_bind(period.rental_price)
                    .push_bind(row.session_id);
            });

            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(AppError::Database)?;
        }

        Ok(())
    }
}
