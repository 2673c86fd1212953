//! Segments one property's event history into ownership periods bounded by
//! consecutive SOLD events.

use crate::models::{OwnershipPeriod, PropertyEvent};

/// Sorts events ascending by date. The sort is stable: events sharing a date
/// keep the provider's original order.
pub fn sort_events(events: &mut [PropertyEvent]) {
    events.sort_by_key(|e| e.event_date);
}

/// Partitions a chronologically sorted event list into ownership periods.
///
/// Each SOLD event opens a period; the next SOLD event (the next owner's
/// purchase) closes it. The final period has no sale and represents current
/// ownership. A property with no SOLD event yields no periods at all.
pub fn segment_ownership(events: &[PropertyEvent]) -> Vec<OwnershipPeriod> {
    let sold: Vec<&PropertyEvent> = events.iter().filter(|e| e.is_sold()).collect();

    sold.iter()
        .enumerate()
        .map(|(i, purchase)| {
            let sale = sold.get(i + 1);
            OwnershipPeriod {
                sequence_number: (i + 1) as i32,
                purchase_date: purchase.event_date,
                purchase_price: purchase.price,
                sale_date: sale.map(|s| s.event_date),
                sale_price: sale.and_then(|s| s.price),
            }
        })
        .collect()
}
