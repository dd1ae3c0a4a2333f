//! Traits describing carrier capabilities and shared helper types.

use async_trait::async_trait;
use chrono::{DateTime, ParseError as ChronoParseError, Utc};

use crate::model::{CarrierId, CarrierMeta, Credentials, Parcel, ParcelDetail};
use crate::token::SessionToken;

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to carrier backends.
pub enum PortError {
    /// Transport failed or the backend answered with a non-success status.
    #[error("Network error: {0}")]
    Network(String),
    /// Login call failed or returned an unusable token.
    #[error("Authentication with {carrier} failed: {reason}")]
    Auth {
        /// Carrier that rejected the login.
        carrier: CarrierId,
        /// Underlying cause.
        reason: String,
    },
    /// Shipment list call failed.
    #[error("Fetching parcels from {carrier} failed: {reason}")]
    Fetch {
        /// Carrier whose list call failed.
        carrier: CarrierId,
        /// Underlying cause.
        reason: String,
    },
    /// Response body could not be decoded.
    #[error("Malformed response from {carrier}: {reason}")]
    Parse {
        /// Carrier that sent the body.
        carrier: CarrierId,
        /// Decoder message.
        reason: String,
    },
    /// Per-parcel detail call failed.
    #[error("Detail request for shipment {shipment} failed: {reason}")]
    Detail {
        /// Shipment whose detail could not be loaded.
        shipment: String,
        /// Underlying cause.
        reason: String,
    },
    /// Failed to parse a carrier date.
    #[error("Date parse error: {0}")]
    Date(#[from] ChronoParseError),
}

impl PortError {
    /// Whether the error means the cached session token must be dropped.
    #[must_use]
    pub fn invalidates_token(&self) -> bool {
        !matches!(self, PortError::Detail { .. })
    }
}

#[async_trait]
/// Trait for carrier-specific shipment backends.
pub trait CarrierPort: Send + Sync {
    /// Metadata describing the carrier handled by this port.
    fn carrier(&self) -> &CarrierMeta;

    /// Authenticate if needed and load all shipments of the account.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Auth`] when login fails, and [`PortError::Fetch`] or
    /// [`PortError::Parse`] when the shipment list cannot be loaded.
    async fn fetch_parcels(
        &self,
        credentials: &Credentials,
        language: &str,
    ) -> Result<Vec<Parcel>, PortError>;
}

#[async_trait]
/// Trait for carriers whose list call omits tracking events.
pub trait DetailPort: Send + Sync {
    /// Load the tracking events of a single shipment.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Detail`] when the request or its decoding fails.
    async fn detail(
        &self,
        shipment_number: &str,
        token: &SessionToken,
        language: &str,
    ) -> Result<ParcelDetail, PortError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
