//! Filtering, ranking, and truncation of the aggregated parcel list.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};

use crate::model::{Parcel, ParcelStatus, RunConfig};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Apply the delivered-age filter, rank by latest event, and cut to the limit.
#[must_use]
pub fn project(parcels: Vec<Parcel>, config: &RunConfig, now: DateTime<Utc>) -> Vec<Parcel> {
    let mut parcels = retain_recent_deliveries(parcels, config.show_delivered_days, now);
    rank_by_latest_event(&mut parcels);
    truncate(&mut parcels, config.limit);
    parcels
}

/// Drop delivered parcels whose latest event is `show_delivered_days` or more
/// whole days old, counting days rounded to the nearest integer.
///
/// Negative `show_delivered_days` keeps everything. Delivered parcels without
/// an event date cannot be aged and are kept.
#[must_use]
pub fn retain_recent_deliveries(
    parcels: Vec<Parcel>,
    show_delivered_days: i64,
    now: DateTime<Utc>,
) -> Vec<Parcel> {
    if show_delivered_days < 0 {
        return parcels;
    }

    parcels
        .into_iter()
        .filter(|parcel| {
            if parcel.status != ParcelStatus::Delivered {
                return true;
            }
            parcel
                .latest_event_date
                .is_none_or(|date| age_in_days(date, now) < show_delivered_days)
        })
        .collect()
}

/// Age in days rounded half up.
fn age_in_days(date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - date).num_milliseconds();
    (millis + MILLIS_PER_DAY / 2).div_euclid(MILLIS_PER_DAY)
}

/// Sort most recent first; undated parcels go last. Ties keep input order.
pub fn rank_by_latest_event(parcels: &mut [Parcel]) {
    parcels.sort_by_key(|parcel| Reverse(parcel.latest_event_date));
}

/// Keep the first `limit` parcels; 0 means unbounded.
pub fn truncate(parcels: &mut Vec<Parcel>, limit: usize) {
    if limit > 0 {
        parcels.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn parcel(shipment: &str, status: ParcelStatus, age: Option<Duration>) -> Parcel {
        let mut parcel = Parcel::new(shipment, status, "raw");
        parcel.latest_event_date = age.map(|age| now() - age);
        parcel
    }

    fn numbers(parcels: &[Parcel]) -> Vec<&str> {
        parcels
            .iter()
            .map(|parcel| parcel.shipment_number.as_str())
            .collect()
    }

    #[test]
    fn negative_window_keeps_everything() {
        let input = vec![
            parcel("A", ParcelStatus::Delivered, Some(Duration::days(400))),
            parcel("B", ParcelStatus::InTransit, Some(Duration::days(1))),
            parcel("C", ParcelStatus::Delivered, None),
        ];

        let output = retain_recent_deliveries(input.clone(), -1, now());

        assert_eq!(output, input);
    }

    #[test]
    fn delivered_window_boundaries() {
        let days = 7;
        let input = vec![
            parcel("older", ParcelStatus::Delivered, Some(Duration::days(days + 1))),
            parcel("exact", ParcelStatus::Delivered, Some(Duration::days(days))),
            parcel("younger", ParcelStatus::Delivered, Some(Duration::days(days - 1))),
            parcel("in-transit", ParcelStatus::InTransit, Some(Duration::days(90))),
            parcel("undated", ParcelStatus::Delivered, None),
        ];

        let output = retain_recent_deliveries(input, days, now());

        assert_eq!(numbers(&output), ["younger", "in-transit", "undated"]);
    }

    #[test]
    fn zero_window_drops_all_dated_deliveries() {
        let input = vec![
            parcel("fresh", ParcelStatus::Delivered, Some(Duration::hours(2))),
            parcel("pending", ParcelStatus::Pending, Some(Duration::hours(2))),
        ];

        let output = retain_recent_deliveries(input, 0, now());

        assert_eq!(numbers(&output), ["pending"]);
    }

    #[test]
    fn ranks_newest_first_with_undated_last_and_stable_ties() {
        let mut parcels = vec![
            parcel("undated-1", ParcelStatus::Unknown, None),
            parcel("tie-1", ParcelStatus::InTransit, Some(Duration::days(2))),
            parcel("newest", ParcelStatus::Pending, Some(Duration::hours(1))),
            parcel("undated-2", ParcelStatus::Unknown, None),
            parcel("tie-2", ParcelStatus::Delivered, Some(Duration::days(2))),
            parcel("oldest", ParcelStatus::Delivered, Some(Duration::days(9))),
        ];

        rank_by_latest_event(&mut parcels);

        assert_eq!(
            numbers(&parcels),
            ["newest", "tie-1", "tie-2", "oldest", "undated-1", "undated-2"]
        );
    }

    #[test]
    fn limit_bounds_output_length() {
        let input: Vec<Parcel> = (0..5)
            .map(|index| parcel(&format!("P{index}"), ParcelStatus::InTransit, Some(Duration::days(index))))
            .collect();

        for limit in 1..=6 {
            let mut parcels = input.clone();
            truncate(&mut parcels, limit);
            assert!(parcels.len() <= limit, "limit {limit} exceeded");
        }

        let mut unbounded = input.clone();
        truncate(&mut unbounded, 0);
        assert_eq!(unbounded.len(), input.len());
    }

    #[test]
    fn project_combines_all_steps() {
        let config = RunConfig {
            limit: 2,
            show_delivered_days: 3,
            ..RunConfig::default()
        };
        let input = vec![
            parcel("stale-delivery", ParcelStatus::Delivered, Some(Duration::hours(1) + Duration::days(5))),
            parcel("second", ParcelStatus::InTransit, Some(Duration::days(1))),
            parcel("first", ParcelStatus::Delivered, Some(Duration::hours(3))),
            parcel("third", ParcelStatus::Pending, Some(Duration::days(2))),
        ];

        let output = project(input, &config, now());

        assert_eq!(numbers(&output), ["first", "second"]);
    }
}
