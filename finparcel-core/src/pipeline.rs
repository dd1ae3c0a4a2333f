//! Single-flight aggregation pipeline combining all carriers.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::model::{CarrierMeta, Parcel, RunConfig};
use crate::plugin::CarrierRegistry;
use crate::ports::{Clock, PortError, SystemClock};
use crate::projection::project;

/// Result of a single trigger of the pipeline.
#[derive(Debug)]
pub enum RunOutcome {
    /// Run finished; the list is filtered, ranked, and truncated.
    Completed(Vec<Parcel>),
    /// A carrier failed; the whole run is discarded.
    Failed(PortError),
    /// Another run was in progress, so this trigger was dropped.
    Skipped,
}

/// Public entry point that aggregates parcels from every enabled carrier.
pub struct AggregationPipeline {
    registry: Arc<CarrierRegistry>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
}

impl AggregationPipeline {
    /// Create a pipeline bound to the provided registry and the system clock.
    #[must_use]
    pub fn new(registry: Arc<CarrierRegistry>) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    /// Create a pipeline with an explicit clock.
    #[must_use]
    pub fn with_clock(registry: Arc<CarrierRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            clock,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Metadata of all registered carriers in query order.
    #[must_use]
    pub fn carriers(&self) -> Vec<CarrierMeta> {
        self.registry.carriers()
    }

    /// Whether a run is currently in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one aggregation unless another one is already in flight.
    ///
    /// Carriers are queried sequentially in registry order. Any carrier
    /// failure fails the run; no partial list is produced.
    pub async fn run(&self, config: &RunConfig) -> RunOutcome {
        let Some(_guard) = RunGuard::acquire(&self.in_flight) else {
            warn!("Aggregation run already in progress, dropping trigger");
            return RunOutcome::Skipped;
        };

        match self.collect(config).await {
            Ok(parcels) => {
                let parcels = project(parcels, config, self.clock.now());
                info!(parcels = parcels.len(), "Aggregation run finished");
                RunOutcome::Completed(parcels)
            }
            Err(err) => {
                error!(error = %err, "Aggregation run failed");
                RunOutcome::Failed(err)
            }
        }
    }

    async fn collect(&self, config: &RunConfig) -> Result<Vec<Parcel>, PortError> {
        let mut collected = Vec::new();

        for plugin in self.registry.iter() {
            let carrier = &plugin.meta.id;
            let Some(credentials) = config.enabled_credentials(carrier) else {
                debug!(%carrier, "No credentials configured, skipping carrier");
                continue;
            };

            info!(%carrier, "Updating parcels");
            let parcels = plugin
                .port
                .fetch_parcels(credentials, &config.language)
                .await?;
            info!(%carrier, parcels = parcels.len(), "Parcels loaded");

            collected.extend(parcels);
        }

        Ok(deduplicate(collected))
    }
}

/// Drop parcels without a shipment number and repeated shipment numbers.
fn deduplicate(parcels: Vec<Parcel>) -> Vec<Parcel> {
    let mut seen = HashSet::new();
    parcels
        .into_iter()
        .filter(|parcel| {
            if parcel.shipment_number.trim().is_empty() {
                warn!("Dropping parcel without shipment number");
                return false;
            }
            if !seen.insert(parcel.shipment_number.clone()) {
                warn!(shipment = %parcel.shipment_number, "Dropping duplicate parcel");
                return false;
            }
            true
        })
        .collect()
}

/// Holds the in-flight flag for the duration of a run.
struct RunGuard<'flag> {
    flag: &'flag AtomicBool,
}

impl<'flag> RunGuard<'flag> {
    fn acquire(flag: &'flag AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_previous| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::Notify;

    use super::*;
    use crate::model::{CarrierId, Carriers, Credentials, ParcelStatus};
    use crate::plugin::CarrierPlugin;
    use crate::ports::CarrierPort;
    use crate::token::{SessionToken, TokenCache};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    /// Carrier double with a cached token, a call counter, and an optional gate.
    struct FakeCarrier {
        meta: CarrierMeta,
        parcels: Vec<Parcel>,
        fail: bool,
        tokens: TokenCache,
        calls: AtomicUsize,
        entered: Notify,
        gate: Option<Notify>,
    }

    impl FakeCarrier {
        fn new(carrier: Carriers, parcels: Vec<Parcel>) -> Self {
            let id = CarrierId::from(carrier);
            Self {
                meta: CarrierMeta {
                    name: id.0.clone(),
                    id,
                },
                parcels,
                fail: false,
                tokens: TokenCache::new(),
                calls: AtomicUsize::new(0),
                entered: Notify::new(),
                gate: None,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Notify::new());
            self
        }
    }

    #[async_trait]
    impl CarrierPort for FakeCarrier {
        fn carrier(&self) -> &CarrierMeta {
            &self.meta
        }

        async fn fetch_parcels(
            &self,
            _credentials: &Credentials,
            _language: &str,
        ) -> Result<Vec<Parcel>, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens
                .get_or_login(|| async { SessionToken::new("cached").ok_or_else(unreachable_auth) })
                .await?;
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                self.tokens.invalidate();
                return Err(PortError::Fetch {
                    carrier: self.meta.id.clone(),
                    reason: "HTTP 502".to_owned(),
                });
            }
            Ok(self.parcels.clone())
        }
    }

    fn unreachable_auth() -> PortError {
        PortError::Auth {
            carrier: Carriers::Posti.into(),
            reason: "blank token".to_owned(),
        }
    }

    fn pipeline(carriers: Vec<Arc<FakeCarrier>>) -> AggregationPipeline {
        let plugins = carriers
            .into_iter()
            .map(|carrier| CarrierPlugin {
                meta: carrier.meta.clone(),
                port: carrier,
            })
            .collect();
        AggregationPipeline::with_clock(
            Arc::new(CarrierRegistry::new(plugins)),
            Arc::new(FixedClock(now())),
        )
    }

    fn dated(shipment: &str, hours_ago: i64) -> Parcel {
        let mut parcel = Parcel::new(shipment, ParcelStatus::InTransit, "IN_TRANSPORT");
        parcel.latest_event_date = Some(now() - Duration::hours(hours_ago));
        parcel
    }

    fn both_enabled() -> RunConfig {
        RunConfig::default()
            .with_credentials(Carriers::Posti, Credentials::new("a", "pw"))
            .with_credentials(Carriers::Matkahuolto, Credentials::new("b", "pw"))
    }

    fn numbers(parcels: &[Parcel]) -> Vec<&str> {
        parcels
            .iter()
            .map(|parcel| parcel.shipment_number.as_str())
            .collect()
    }

    #[tokio::test]
    async fn no_enabled_carrier_yields_empty_list() {
        let posti = Arc::new(FakeCarrier::new(Carriers::Posti, vec![dated("A1", 1)]));
        let pipeline = pipeline(vec![Arc::clone(&posti)]);

        let outcome = pipeline.run(&RunConfig::default()).await;

        assert!(matches!(outcome, RunOutcome::Completed(ref parcels) if parcels.is_empty()));
        assert_eq!(posti.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_carrier_is_ranked_and_limited() {
        let posti = Arc::new(FakeCarrier::new(
            Carriers::Posti,
            vec![dated("D3", 30), dated("D1", 1), dated("D2", 10)],
        ));
        let matkahuolto = Arc::new(FakeCarrier::new(Carriers::Matkahuolto, vec![dated("M1", 0)]));
        let pipeline = pipeline(vec![posti, Arc::clone(&matkahuolto)]);
        let config = RunConfig {
            limit: 2,
            show_delivered_days: -1,
            ..RunConfig::default()
        }
        .with_credentials(Carriers::Posti, Credentials::new("a", "pw"));

        let RunOutcome::Completed(parcels) = pipeline.run(&config).await else {
            panic!("run should complete");
        };

        assert_eq!(numbers(&parcels), ["D1", "D2"]);
        assert_eq!(matkahuolto.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_carrier_failure_fails_run_and_skips_second() {
        let posti = Arc::new(FakeCarrier::new(Carriers::Posti, Vec::new()).failing());
        let matkahuolto = Arc::new(FakeCarrier::new(Carriers::Matkahuolto, vec![dated("M1", 1)]));
        matkahuolto
            .tokens
            .get_or_login(|| async { SessionToken::new("kept").ok_or_else(unreachable_auth) })
            .await
            .expect("seed token");
        let pipeline = pipeline(vec![Arc::clone(&posti), Arc::clone(&matkahuolto)]);

        let outcome = pipeline.run(&both_enabled()).await;

        assert!(matches!(outcome, RunOutcome::Failed(PortError::Fetch { .. })), "got {outcome:?}");
        assert!(posti.tokens.cached().is_none(), "failed carrier keeps stale token");
        assert_eq!(matkahuolto.calls.load(Ordering::SeqCst), 0);
        assert!(matkahuolto.tokens.cached().is_some());
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn concatenates_in_carrier_order_and_drops_duplicates() {
        let posti = Arc::new(FakeCarrier::new(
            Carriers::Posti,
            vec![dated("SAME", 5), dated("A1", 5), dated("", 1)],
        ));
        let matkahuolto = Arc::new(FakeCarrier::new(
            Carriers::Matkahuolto,
            vec![dated("M1", 5), dated("SAME", 2)],
        ));
        let pipeline = pipeline(vec![posti, matkahuolto]);

        let RunOutcome::Completed(parcels) = pipeline.run(&both_enabled()).await else {
            panic!("run should complete");
        };

        assert_eq!(numbers(&parcels), ["SAME", "A1", "M1"]);
    }

    #[tokio::test]
    async fn overlapping_trigger_is_dropped() {
        let posti = Arc::new(FakeCarrier::new(Carriers::Posti, vec![dated("A1", 3)]));
        let matkahuolto =
            Arc::new(FakeCarrier::new(Carriers::Matkahuolto, vec![dated("M1", 1)]).gated());
        let pipeline = Arc::new(pipeline(vec![posti, Arc::clone(&matkahuolto)]));
        let config = both_enabled();

        let first = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let config = config.clone();
            async move { pipeline.run(&config).await }
        });

        matkahuolto.entered.notified().await;
        assert!(pipeline.is_running());

        let second = pipeline.run(&config).await;
        assert!(matches!(second, RunOutcome::Skipped), "got {second:?}");

        if let Some(gate) = &matkahuolto.gate {
            gate.notify_one();
        }
        let first = first.await.expect("first run task");

        let RunOutcome::Completed(parcels) = first else {
            panic!("first run should complete");
        };
        assert_eq!(numbers(&parcels), ["M1", "A1"]);
        assert_eq!(matkahuolto.calls.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_running());
    }
}
