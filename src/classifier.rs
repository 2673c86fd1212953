//! Assigns each ownership period a transaction category and investor type,
//! and detects overlapping rental activity using asymmetric look-back
//! windows around the ownership window.

use crate::config::ClassifyRules;
use crate::errors::AppError;
use crate::models::{
    InvestorCategory, InvestorType, OwnershipPeriod, PropertyClassification, PropertyEvent,
    TransactionCategory, TransactionPeriod,
};
use crate::timeline::{segment_ownership, sort_events};
use chrono::{Duration, NaiveDate};

/// Classifies one ownership period against the property's full event list.
///
/// The ownership window is `[purchase_date, sale_date ?? as_of]`. A rental
/// event qualifies as "during ownership" when it falls inside that window,
/// within `rental_lookback_days` before the sale (completed periods), or
/// within `rental_lookback_days` before the purchase (the open period).
/// Both look-back boundaries are inclusive at exactly the window length.
pub fn classify_period(
    period: &OwnershipPeriod,
    events: &[PropertyEvent],
    rules: &ClassifyRules,
    as_of: NaiveDate,
) -> TransactionPeriod {
    let purchase = period.purchase_date;
    let window_end = period.sale_date.unwrap_or(as_of);
    let lookback = Duration::days(rules.rental_lookback_days);

    let holding_period_days = period
        .sale_date
        .map(|sale| (sale - purchase).num_days());

    let profit_loss = match (period.purchase_price, period.sale_price) {
        (Some(bought), Some(sold)) => Some(sold - bought),
        _ => None,
    };

    let transaction_category = match holding_period_days {
        None => TransactionCategory::CurrentOwnership,
        Some(days) if days <= rules.wholesale_max_days => TransactionCategory::Wholesaler,
        Some(days) if days <= rules.flip_max_days => TransactionCategory::Flip,
        Some(_) => TransactionCategory::LongTermHold,
    };

    let qualifying: Vec<&PropertyEvent> = events
        .iter()
        .filter(|e| e.is_rental())
        .filter(|e| {
            let d = e.event_date;
            let in_window = d >= purchase && d <= window_end;
            let in_pre_sale = period
                .sale_date
                .map(|sale| d >= sale - lookback && d <= sale)
                .unwrap_or(false);
            let in_pre_purchase =
                period.is_open() && d >= purchase - lookback && d < purchase;
            in_window || in_pre_sale || in_pre_purchase
        })
        .collect();

    let has_rental_activity = !qualifying.is_empty();
    let rental_events_count = qualifying.len() as i64;

    let days_to_first_rental = qualifying
        .iter()
        .map(|e| e.event_date)
        .min()
        .map(|d| (d - purchase).num_days());

    // Only events strictly inside the ownership window contribute a price;
    // look-back events are activity evidence, not a rent figure.
    let rental_price = qualifying
        .iter()
        .filter(|e| e.event_date > purchase && e.event_date < window_end)
        .filter(|e| e.price.map(|p| p > 0).unwrap_or(false))
        .max_by_key(|e| e.event_date)
        .and_then(|e| e.price);

    let mut investor_type = match transaction_category {
        TransactionCategory::Wholesaler => InvestorType::Wholesaler,
        TransactionCategory::Flip => InvestorType::Flipper,
        TransactionCategory::LongTermHold => InvestorType::Unknown,
        TransactionCategory::CurrentOwnership => InvestorType::Unknown,
    };

    // Landlord promotion. The open period promotes on any rental activity;
    // a completed period promotes only on evidence the previous owner's
    // listing was still live in the pre-sale window (event before this
    // period's purchase AND inside the pre-sale look-back).
    if period.is_open() {
        if has_rental_activity {
            investor_type = InvestorType::Landlord;
        }
    } else if let Some(sale) = period.sale_date {
        let carried_over = qualifying.iter().any(|e| {
            e.event_date >= sale - lookback && e.event_date <= sale && e.event_date < purchase
        });
        if carried_over {
            investor_type = InvestorType::Landlord;
        }
    }

    TransactionPeriod {
        sequence_number: period.sequence_number,
        purchase_date: purchase,
        purchase_price: period.purchase_price,
        sale_date: period.sale_date,
        sale_price: period.sale_price,
        holding_period_days,
        profit_loss,
        transaction_category,
        investor_type,
        has_rental_activity,
        rental_events_count,
        days_to_first_rental,
        rental_price,
    }
}

/// Sorts, segments, and classifies one property's event history.
///
/// Returns `AppError::Classification` when the segmented periods violate
/// the ordering invariant (a malformed event list); the caller skips that
/// property and keeps the worker alive.
pub fn classify_property(
    events: &mut Vec<PropertyEvent>,
    rules: &ClassifyRules,
    as_of: NaiveDate,
) -> Result<Vec<TransactionPeriod>, AppError> {
    sort_events(events);
    let periods = segment_ownership(events);

    for window in periods.windows(2) {
        if window[1].purchase_date < window[0].purchase_date {
            return Err(AppError::Classification(format!(
                "ownership periods out of order at sequence {}",
                window[1].sequence_number
            )));
        }
    }
    if let Some(bad) = periods
        .iter()
        .find(|p| p.sale_date.map(|s| s < p.purchase_date).unwrap_or(false))
    {
        return Err(AppError::Classification(format!(
            "sale precedes purchase at sequence {}",
            bad.sequence_number
        )));
    }

    Ok(periods
        .iter()
        .map(|p| classify_period(p, events, rules, as_of))
        .collect())
}

/// Derived latest-period view: the backward-compatible single-value
/// classification of a property. Computed from the classified periods on
/// every run, never stored as independently mutable state.
pub fn summarize_latest(
    periods: &[TransactionPeriod],
    as_of: NaiveDate,
) -> PropertyClassification {
    match periods.last() {
        Some(last) => {
            let investor_category = if last.investor_type == InvestorType::Landlord {
                InvestorCategory::Landlord
            } else {
                match last.transaction_category {
                    TransactionCategory::Flip => InvestorCategory::Flip,
                    TransactionCategory::Wholesaler => InvestorCategory::Wholesaler,
                    _ => InvestorCategory::Unknown,
                }
            };
            PropertyClassification {
                investor_category,
                days_to_sale: last.holding_period_days,
                days_to_rental: last.days_to_first_rental,
                classification_date: as_of,
            }
        }
        None => PropertyClassification {
            investor_category: InvestorCategory::Unknown,
            days_to_sale: None,
            days_to_rental: None,
            classification_date: as_of,
        },
    }
}
