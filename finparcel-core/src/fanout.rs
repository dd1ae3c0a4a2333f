//! Concurrent per-parcel detail enrichment with a completion barrier.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::model::{DetailState, Parcel};
use crate::ports::DetailPort;
use crate::token::SessionToken;

/// Enriches partial parcels with one concurrent detail request per parcel.
pub struct DetailFanoutJoiner<'src> {
    source: &'src dyn DetailPort,
}

impl<'src> DetailFanoutJoiner<'src> {
    /// Bind the joiner to the carrier answering detail requests.
    #[must_use]
    pub fn new(source: &'src dyn DetailPort) -> Self {
        Self { source }
    }

    /// Dispatch every detail request at once and return when all have settled.
    ///
    /// Output order matches input order. A failed request marks its parcel
    /// [`DetailState::Failed`] and leaves the event fields untouched; it never
    /// affects sibling requests.
    pub async fn enrich(
        &self,
        parcels: Vec<Parcel>,
        token: &SessionToken,
        language: &str,
    ) -> Vec<Parcel> {
        if parcels.is_empty() {
            return parcels;
        }

        let dispatched = parcels.len();
        let source = self.source;

        let requests = parcels.into_iter().map(|mut parcel| async move {
            debug!(shipment = %parcel.shipment_number, "Requesting parcel details");
            match source.detail(&parcel.shipment_number, token, language).await {
                Ok(detail) => parcel.apply_detail(detail),
                Err(err) => {
                    warn!(shipment = %parcel.shipment_number, error = %err, "Parcel details unavailable");
                    parcel.detail = DetailState::Failed;
                }
            }
            parcel
        });

        let settled = join_all(requests).await;

        let failed = settled
            .iter()
            .filter(|parcel| parcel.detail == DetailState::Failed)
            .count();
        info!(dispatched, failed, "All parcel detail requests settled");

        settled
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::{ParcelDetail, ParcelStatus};
    use crate::ports::PortError;

    /// Answers after a per-shipment delay; shipments in `failing` error out.
    struct StaggeredDetails {
        failing: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        settled: AtomicUsize,
    }

    impl StaggeredDetails {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|shipment| (*shipment).to_owned()).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                settled: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DetailPort for StaggeredDetails {
        async fn detail(
            &self,
            shipment_number: &str,
            _token: &SessionToken,
            _language: &str,
        ) -> Result<ParcelDetail, PortError> {
            let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_running, Ordering::SeqCst);

            // Reverse the completion order relative to dispatch order.
            let index: u64 = shipment_number
                .trim_start_matches("MH")
                .parse()
                .expect("numeric test shipment");
            tokio::time::sleep(Duration::from_millis(5 * (6 - index))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.settled.fetch_add(1, Ordering::SeqCst);

            if self.failing.contains(shipment_number) {
                return Err(PortError::Detail {
                    shipment: shipment_number.to_owned(),
                    reason: "HTTP 500".to_owned(),
                });
            }

            Ok(ParcelDetail {
                latest_event: Some(format!("Event for {shipment_number}")),
                latest_event_city: Some("Helsinki".to_owned()),
                latest_event_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single(),
                shipment_date: Utc.with_ymd_and_hms(2024, 2, 27, 8, 30, 0).single(),
            })
        }
    }

    fn partial(shipment: &str) -> Parcel {
        Parcel::new(shipment, ParcelStatus::InTransit, "35")
    }

    fn token() -> SessionToken {
        SessionToken::new("token").expect("non-empty token")
    }

    #[tokio::test]
    async fn waits_for_every_request_and_keeps_failures() {
        let source = StaggeredDetails::new(&["MH2", "MH4"]);
        let parcels = (1..=5).map(|index| partial(&format!("MH{index}"))).collect();

        let enriched = DetailFanoutJoiner::new(&source)
            .enrich(parcels, &token(), "fi")
            .await;

        assert_eq!(source.settled.load(Ordering::SeqCst), 5, "joiner returned early");
        assert_eq!(source.peak.load(Ordering::SeqCst), 5, "requests were not concurrent");
        assert_eq!(enriched.len(), 5);

        let order: Vec<&str> = enriched
            .iter()
            .map(|parcel| parcel.shipment_number.as_str())
            .collect();
        assert_eq!(order, ["MH1", "MH2", "MH3", "MH4", "MH5"]);

        let failed: Vec<&Parcel> = enriched
            .iter()
            .filter(|parcel| parcel.detail == DetailState::Failed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|parcel| parcel.latest_event_date.is_none()
            && parcel.latest_event.is_none()));

        let first = enriched.first().expect("five parcels");
        assert_eq!(first.detail, DetailState::Retrieved);
        assert_eq!(first.latest_event.as_deref(), Some("Event for MH1"));
        assert!(first.shipment_date.is_some());
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        let source = StaggeredDetails::new(&[]);

        let enriched = DetailFanoutJoiner::new(&source)
            .enrich(Vec::new(), &token(), "en")
            .await;

        assert!(enriched.is_empty());
        assert_eq!(source.settled.load(Ordering::SeqCst), 0);
    }
}
