//! Domain data structures for carriers, credentials, and tracked parcels.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Built-in carriers supported by the application.
pub enum Carriers {
    /// Posti, the Finnish national postal service.
    Posti,
    /// Matkahuolto, the Finnish coach and parcel service.
    Matkahuolto,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier for a carrier known to finparcel.
pub struct CarrierId(pub String);

impl fmt::Display for Carriers {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Carriers::Posti => "posti",
            Carriers::Matkahuolto => "matkahuolto",
        };
        write!(formatter, "{slug}")
    }
}

impl From<Carriers> for CarrierId {
    fn from(carrier: Carriers) -> Self {
        CarrierId(carrier.to_string())
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a carrier and its human-friendly name.
pub struct CarrierMeta {
    /// Unique identifier.
    pub id: CarrierId,
    /// Display name.
    pub name: String,
}

/// Unified status taxonomy shared by all carriers.
///
/// The declaration order is the ordinal used by the presentation layer for
/// icons and translated labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParcelStatus {
    /// Parcel has reached the recipient.
    Delivered,
    /// Carrier has been told about the shipment but has not seen it yet.
    InfoReceived,
    /// Carrier has received the parcel.
    Pending,
    /// Parcel is moving through the carrier network.
    InTransit,
    /// Parcel is out for delivery.
    BeingDelivered,
    /// Parcel waits at a pickup point.
    ReadyForPickup,
    /// Something went wrong, e.g. returned to sender.
    Exception,
    /// Carrier reported a status outside the known vocabulary.
    Unknown,
}

impl ParcelStatus {
    /// All statuses in ordinal order.
    pub const ALL: [ParcelStatus; 8] = [
        ParcelStatus::Delivered,
        ParcelStatus::InfoReceived,
        ParcelStatus::Pending,
        ParcelStatus::InTransit,
        ParcelStatus::BeingDelivered,
        ParcelStatus::ReadyForPickup,
        ParcelStatus::Exception,
        ParcelStatus::Unknown,
    ];

    /// Position of the status in the shared taxonomy.
    #[must_use]
    pub fn ordinal(self) -> usize {
        match self {
            ParcelStatus::Delivered => 0,
            ParcelStatus::InfoReceived => 1,
            ParcelStatus::Pending => 2,
            ParcelStatus::InTransit => 3,
            ParcelStatus::BeingDelivered => 4,
            ParcelStatus::ReadyForPickup => 5,
            ParcelStatus::Exception => 6,
            ParcelStatus::Unknown => 7,
        }
    }

    /// Whether the raw carrier status should be shown instead of a translated label.
    #[must_use]
    pub fn shows_raw_status(self) -> bool {
        matches!(self, ParcelStatus::Unknown | ParcelStatus::Exception)
    }
}

/// Outcome of the per-parcel detail phase for detail-sparse carriers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailState {
    /// The carrier delivers full event data in its list call.
    #[default]
    NotRequested,
    /// Detail request succeeded and event fields were merged.
    Retrieved,
    /// Detail request was attempted and failed; event fields are left empty.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Normalized shipment record shared by all carriers.
pub struct Parcel {
    /// Tracking or shipment number, unique within a run.
    pub shipment_number: String,
    /// Sender display name.
    pub sender: Option<String>,
    /// Recipient or pickup point display name.
    pub destination: Option<String>,
    /// City the parcel was sent from.
    pub sender_city: Option<String>,
    /// City the parcel is headed to.
    pub receiver_city: Option<String>,
    /// Unified status.
    pub status: ParcelStatus,
    /// Carrier-native status code.
    pub raw_status: String,
    /// Localized description of the most recent tracking event.
    pub latest_event: Option<String>,
    /// City of the most recent tracking event.
    pub latest_event_city: Option<String>,
    /// Country of the most recent tracking event.
    pub latest_event_country: Option<String>,
    /// Time of the most recent tracking event, used for filtering and ranking.
    pub latest_event_date: Option<DateTime<Utc>>,
    /// When the carrier first registered the shipment.
    pub shipment_date: Option<DateTime<Utc>>,
    /// Whether event fields came from a separate detail request.
    pub detail: DetailState,
}

impl Parcel {
    /// Create a parcel carrying only its identity and status.
    #[must_use]
    pub fn new<S: Into<String>, R: Into<String>>(
        shipment_number: S,
        status: ParcelStatus,
        raw_status: R,
    ) -> Self {
        Self {
            shipment_number: shipment_number.into(),
            sender: None,
            destination: None,
            sender_city: None,
            receiver_city: None,
            status,
            raw_status: raw_status.into(),
            latest_event: None,
            latest_event_city: None,
            latest_event_country: None,
            latest_event_date: None,
            shipment_date: None,
            detail: DetailState::NotRequested,
        }
    }

    /// Sender name, falling back to the sender city.
    #[must_use]
    pub fn sender_label(&self) -> Option<&str> {
        non_empty(self.sender.as_deref()).or_else(|| non_empty(self.sender_city.as_deref()))
    }

    /// Destination name, falling back to the receiver city.
    #[must_use]
    pub fn destination_label(&self) -> Option<&str> {
        non_empty(self.destination.as_deref()).or_else(|| non_empty(self.receiver_city.as_deref()))
    }

    /// Merge event data obtained from a detail request.
    pub fn apply_detail(&mut self, detail: ParcelDetail) {
        self.latest_event = detail.latest_event;
        self.latest_event_city = detail.latest_event_city;
        self.latest_event_date = detail.latest_event_date;
        self.shipment_date = detail.shipment_date;
        self.detail = DetailState::Retrieved;
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Event data returned by a per-parcel detail request.
pub struct ParcelDetail {
    /// Description of the most recent event.
    pub latest_event: Option<String>,
    /// Location of the most recent event.
    pub latest_event_city: Option<String>,
    /// Time of the most recent event.
    pub latest_event_date: Option<DateTime<Utc>>,
    /// Time of the oldest event.
    pub shipment_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Username/password pair for a carrier account.
pub struct Credentials {
    /// Account user name.
    pub user_name: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Construct credentials from a user name and password.
    #[must_use]
    pub fn new<U: Into<String>, P: Into<String>>(user_name: U, password: P) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }

    /// A carrier is enabled only when both fields are filled in.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.user_name.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

/// Language used when the preferred one has no event text.
pub const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone)]
/// Immutable settings for a single aggregation run.
pub struct RunConfig {
    /// Credentials per carrier; carriers without usable credentials are skipped.
    pub credentials: HashMap<CarrierId, Credentials>,
    /// Preferred locale for event descriptions.
    pub language: String,
    /// Maximum number of parcels to return, 0 for no limit.
    pub limit: usize,
    /// Drop delivered parcels older than this many days; negative keeps them all.
    pub show_delivered_days: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            credentials: HashMap::new(),
            language: FALLBACK_LANGUAGE.to_owned(),
            limit: 0,
            show_delivered_days: -1,
        }
    }
}

impl RunConfig {
    /// Attach credentials for a carrier.
    #[must_use]
    pub fn with_credentials<C: Into<CarrierId>>(mut self, carrier: C, credentials: Credentials) -> Self {
        self.credentials.insert(carrier.into(), credentials);
        self
    }

    /// Credentials for the carrier, if it is enabled.
    #[must_use]
    pub fn enabled_credentials(&self, carrier: &CarrierId) -> Option<&Credentials> {
        self.credentials
            .get(carrier)
            .filter(|credentials| credentials.is_enabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_need_both_fields() {
        assert!(Credentials::new("user", "secret").is_enabled());
        assert!(!Credentials::new("user", "").is_enabled());
        assert!(!Credentials::new("", "secret").is_enabled());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("user", "secret"));
        assert!(!rendered.contains("secret"), "password leaked: {rendered}");
    }

    #[test]
    fn labels_fall_back_to_cities() {
        let mut parcel = Parcel::new("JJFI1", ParcelStatus::InTransit, "IN_TRANSPORT");
        parcel.sender_city = Some("Tampere".to_owned());
        parcel.destination = Some("K-Market Kallio".to_owned());
        parcel.receiver_city = Some("Helsinki".to_owned());

        assert_eq!(parcel.sender_label(), Some("Tampere"));
        assert_eq!(parcel.destination_label(), Some("K-Market Kallio"));
    }

    #[test]
    fn ordinals_follow_declaration_order() {
        for (index, status) in ParcelStatus::ALL.iter().enumerate() {
            assert_eq!(status.ordinal(), index, "ordinal mismatch for {status:?}");
        }
    }

    #[test]
    fn disabled_carriers_are_not_returned() {
        let config = RunConfig::default()
            .with_credentials(Carriers::Posti, Credentials::new("user", "secret"))
            .with_credentials(Carriers::Matkahuolto, Credentials::new("user", ""));

        assert!(config.enabled_credentials(&Carriers::Posti.into()).is_some());
        assert!(config.enabled_credentials(&Carriers::Matkahuolto.into()).is_none());
    }
}
