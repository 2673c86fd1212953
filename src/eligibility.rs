//! Working-set filter applied after archival: the raw archive keeps the
//! unfiltered superset; only properties passing these predicates move on
//! to segmentation and classification.

use crate::config::FilterRules;
use crate::models::{PropertySnapshot, CLASSIFIABLE_EVENTS};

/// True when the snapshot carries at least one classifiable event.
pub fn has_classifiable_event(snapshot: &PropertySnapshot) -> bool {
    snapshot
        .events
        .iter()
        .any(|e| CLASSIFIABLE_EVENTS.contains(&e.event_name.as_str()))
}

/// True when the property should be dropped as new-construction noise.
///
/// A property lacking `year_built` is always allowed; exclusion applies only
/// when the toggle is on and the recorded year reaches the cutoff.
pub fn is_new_construction_noise(snapshot: &PropertySnapshot, rules: &FilterRules) -> bool {
    if !rules.exclude_new_construction {
        return false;
    }
    match snapshot.year_built {
        Some(year) => year >= rules.new_construction_cutoff_year,
        None => false,
    }
}

/// Combined working-set predicate.
pub fn is_eligible(snapshot: &PropertySnapshot, rules: &FilterRules) -> bool {
    has_classifiable_event(snapshot) && !is_new_construction_noise(snapshot, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyEvent, EVENT_LISTED_RENT, EVENT_SOLD};
    use chrono::NaiveDate;

    fn event(name: &str) -> PropertyEvent {
        PropertyEvent {
            event_type: None,
            event_name: name.to_string(),
            event_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            price: None,
            owner_occupied_flag: None,
            new_construction_flag: None,
            investor_flag: None,
            entity_owner_name: None,
        }
    }

    fn snapshot(year_built: Option<i32>, events: Vec<PropertyEvent>) -> PropertySnapshot {
        PropertySnapshot {
            parcl_property_id: 1,
            address: None,
            city: None,
            state_abbreviation: None,
            county: None,
            zip_code: None,
            bedrooms: None,
            bathrooms: None,
            square_footage: None,
            year_built,
            latitude: None,
            longitude: None,
            property_type: None,
            current_on_market_flag: None,
            current_owner_occupied_flag: None,
            current_investor_owned_flag: None,
            events,
        }
    }

    fn rules() -> FilterRules {
        FilterRules {
            exclude_new_construction: true,
            new_construction_cutoff_year: 2024,
        }
    }

    #[test]
    fn test_property_without_classifiable_event_is_skipped() {
        let s = snapshot(Some(1990), vec![event("LISTED_SALE")]);
        assert!(!has_classifiable_event(&s));
        assert!(!is_eligible(&s, &rules()));
    }

    #[test]
    fn test_property_with_sold_event_is_kept() {
        let s = snapshot(Some(1990), vec![event(EVENT_SOLD)]);
        assert!(is_eligible(&s, &rules()));
    }

    #[test]
    fn test_rental_only_property_is_kept() {
        let s = snapshot(None, vec![event(EVENT_LISTED_RENT)]);
        assert!(has_classifiable_event(&s));
    }

    #[test]
    fn test_missing_year_built_never_excluded() {
        let s = snapshot(None, vec![event(EVENT_SOLD)]);
        assert!(!is_new_construction_noise(&s, &rules()));
    }

    #[test]
    fn test_cutoff_year_boundary() {
        let at_cutoff = snapshot(Some(2024), vec![event(EVENT_SOLD)]);
        let before_cutoff = snapshot(Some(2023), vec![event(EVENT_SOLD)]);
        assert!(is_new_construction_noise(&at_cutoff, &rules()));
        assert!(!is_new_construction_noise(&before_cutoff, &rules()));
    }

    #[test]
    fn test_toggle_off_keeps_new_construction() {
        let s = snapshot(Some(2025), vec![event(EVENT_SOLD)]);
        let off = FilterRules {
            exclude_new_construction: false,
            new_construction_cutoff_year: 2024,
        };
        assert!(!is_new_construction_noise(&s, &off));
    }
}
