use std::env;
use uuid::Uuid;

use chrono::NaiveDate;
use rust_parcl_ingest::data::db_storage::{IngestSink, IngestStorage};
use rust_parcl_ingest::db::Database;
use rust_parcl_ingest::models::{
    EventRow, InvestorCategory, InvestorType, PeriodRow, PropertyRow, RawResponseRecord,
    TransactionCategory, TransactionPeriod,
};

/// Integration smoke test for the batch persistence writer.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL to run (schema from sql/schema.sql must be applied).
#[tokio::test]
#[ignore]
async fn batch_insert_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = IngestStorage::new(db.pool.clone());

    let session_id = Uuid::new_v4();
    let property_id = 900_000_000 + (session_id.as_u128() % 1_000_000) as i64;

    let payload = serde_json::json!({
        "parcl_property_id": property_id,
        "zip_code": "30318",
        "events": [{"event_name": "SOLD", "event_date": "2023-01-01", "price": 100000}],
    });
    let record = RawResponseRecord {
        content_hash: rust_parcl_ingest::archive::content_hash(&payload),
        provider_endpoint: "/v1/property/events".to_string(),
        request_params: serde_json::json!({"zip_code": "30318"}),
        raw_payload: payload,
        response_status: 200,
        session_id,
        target_property_id: property_id,
    };

    let id_map = storage
        .archive_raw_responses(std::slice::from_ref(&record))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let raw_response_id = *id_map
        .get(&record.content_hash)
        .ok_or_else(|| anyhow::anyhow!("archive returned no id for content hash"))?;
    assert!(raw_response_id > 0);

    let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();

    storage
        .insert_properties(&[PropertyRow {
            parcl_property_id: property_id,
            raw_response_id,
            address: Some("1 Smoke Test Way".to_string()),
            city: Some("Atlanta".to_string()),
            state_abbreviation: Some("GA".to_string()),
            county: Some("Fulton".to_string()),
            zip_code: Some("30318".to_string()),
            bedrooms: Some(3),
            bathrooms: Some(2.0),
            square_footage: Some(1400),
            year_built: Some(1962),
            latitude: None,
            longitude: None,
            property_type: Some("SINGLE_FAMILY".to_string()),
            investor_category: InvestorCategory::Unknown,
            days_to_sale: None,
            days_to_rental: None,
            classification_date: date,
            session_id,
        }])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    storage
        .insert_events(&[EventRow {
            parcl_property_id: property_id,
            raw_response_id,
            event_type: Some("SALE".to_string()),
            event_name: "SOLD".to_string(),
            event_date: date,
            price: Some(100_000),
            owner_occupied_flag: None,
            new_construction_flag: None,
            investor_flag: None,
            entity_owner_name: None,
            session_id,
        }])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    storage
        .insert_periods(&[PeriodRow {
            parcl_property_id: property_id,
            raw_response_id,
            period: TransactionPeriod {
                sequence_number: 1,
                purchase_date: date,
                purchase_price: Some(100_000),
                sale_date: None,
                sale_price: None,
                holding_period_days: None,
                profit_loss: None,
                transaction_category: TransactionCategory::CurrentOwnership,
                investor_type: InvestorType::Unknown,
                has_rental_activity: false,
                rental_events_count: 0,
                days_to_first_rental: None,
                rental_price: None,
            },
            session_id,
        }])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
