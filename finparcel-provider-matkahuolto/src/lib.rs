//! Provider implementation for Matkahuolto using its web service API.
//!
//! The shipment list only carries identity and status, so every parcel is
//! enriched with a separate tracking request through the detail fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use finparcel_core::{
    fanout::DetailFanoutJoiner,
    model::{CarrierId, CarrierMeta, Credentials, Parcel, ParcelDetail, ParcelStatus},
    plugin::CarrierPlugin,
    ports::{CarrierPort, DetailPort, PortError},
    token::{SessionToken, TokenCache},
    transport::{HttpRequest, Transport, send_checked},
};

const LOGIN_URL: &str = "https://wwwservice.matkahuolto.fi/user/auth";
const QUERY_URL: &str = "https://wwwservice.matkahuolto.fi/history/parcel/received/";
const DETAILS_URL: &str = "https://wwwservice.matkahuolto.fi/search/trackingInfo";

const EVENT_DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Body of the login call.
#[derive(Debug, Serialize)]
struct LoginRequest<'req> {
    username: &'req str,
    password: &'req str,
}

/// Login answer, of which only the access token is used.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginResponse {
    authentication_result: Option<AuthenticationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: Option<String>,
}

/// Response from the received parcels history.
#[derive(Debug, Deserialize)]
struct ShipmentsResponse {
    shipments: Option<Vec<Shipment>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Shipment {
    shipment_number: Option<String>,
    sender_name: Option<String>,
    destination_place_name: Option<String>,
    sender_city: Option<String>,
    receiver_city: Option<String>,
    /// Usually a number or a numeric string, but not guaranteed to be either.
    shipment_status: Option<Value>,
}

/// Tracking events, most recent first.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackingInfo {
    tracking_events: Option<Vec<TrackingEvent>>,
}

#[derive(Debug, Deserialize)]
struct TrackingEvent {
    description: Option<String>,
    place: Option<String>,
    date: Option<String>,
    time: Option<String>,
}

/// Shipment source for Matkahuolto accounts.
pub struct MatkahuoltoCarrierPort {
    transport: Arc<dyn Transport>,
    meta: CarrierMeta,
    tokens: TokenCache,
}

impl MatkahuoltoCarrierPort {
    /// Create a new carrier port bound to the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            meta: carrier_meta(),
            tokens: TokenCache::new(),
        }
    }

    /// Currently cached session token.
    #[must_use]
    pub fn session(&self) -> Option<SessionToken> {
        self.tokens.cached()
    }

    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, PortError> {
        info!(carrier = %self.meta.id, "Authenticating");

        let body = serde_json::to_string(&LoginRequest {
            username: &credentials.user_name,
            password: &credentials.password,
        })
        .map_err(|err| self.auth_error(err))?;

        let raw = send_checked(self.transport.as_ref(), HttpRequest::post_json(LOGIN_URL, body))
            .await
            .map_err(|err| self.auth_error(err))?;

        let response: LoginResponse =
            serde_json::from_str(&raw).map_err(|err| self.auth_error(err))?;

        response
            .authentication_result
            .and_then(|result| result.access_token)
            .and_then(SessionToken::new)
            .ok_or_else(|| self.auth_error("login answer carried no access token"))
    }

    async fn query(&self, token: &SessionToken) -> Result<Vec<Shipment>, PortError> {
        let request = HttpRequest::get(QUERY_URL)
            .header("Authorization", token.as_str())
            .header("Content-Type", "application/json");

        let body = send_checked(self.transport.as_ref(), request)
            .await
            .map_err(|err| PortError::Fetch {
                carrier: self.meta.id.clone(),
                reason: err.to_string(),
            })?;

        let response: ShipmentsResponse =
            serde_json::from_str(&body).map_err(|err| PortError::Parse {
                carrier: self.meta.id.clone(),
                reason: err.to_string(),
            })?;

        Ok(response.shipments.unwrap_or_default())
    }

    async fn tracking_info(
        &self,
        shipment_number: &str,
        token: &SessionToken,
        language: &str,
    ) -> Result<TrackingInfo, PortError> {
        let request = HttpRequest::get_with_query(
            DETAILS_URL,
            &[("parcelNumber", shipment_number), ("language", language)],
        )?
        .header("Authorization", token.as_str())
        .header("Content-Type", "application/json");

        let body = send_checked(self.transport.as_ref(), request).await?;
        serde_json::from_str(&body).map_err(|err| PortError::Parse {
            carrier: self.meta.id.clone(),
            reason: err.to_string(),
        })
    }

    fn auth_error<E: ToString>(&self, err: E) -> PortError {
        PortError::Auth {
            carrier: self.meta.id.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl CarrierPort for MatkahuoltoCarrierPort {
    fn carrier(&self) -> &CarrierMeta {
        &self.meta
    }

    async fn fetch_parcels(
        &self,
        credentials: &Credentials,
        language: &str,
    ) -> Result<Vec<Parcel>, PortError> {
        let token = self
            .tokens
            .get_or_login(|| self.login(credentials))
            .await?;

        let shipments = match self.query(&token).await {
            Ok(shipments) => shipments,
            Err(err) => {
                if err.invalidates_token() {
                    self.tokens.invalidate();
                }
                return Err(err);
            }
        };
        debug!(carrier = %self.meta.id, shipments = shipments.len(), "Shipment list loaded");

        let partial: Vec<Parcel> = shipments
            .into_iter()
            .filter_map(|shipment| {
                let parcel = map_shipment(shipment);
                if parcel.is_none() {
                    warn!(carrier = %self.meta.id, "Skipping shipment without shipment number");
                }
                parcel
            })
            .collect();

        Ok(DetailFanoutJoiner::new(self)
            .enrich(partial, &token, language)
            .await)
    }
}

#[async_trait]
impl DetailPort for MatkahuoltoCarrierPort {
    async fn detail(
        &self,
        shipment_number: &str,
        token: &SessionToken,
        language: &str,
    ) -> Result<ParcelDetail, PortError> {
        let detail_error = |reason: String| PortError::Detail {
            shipment: shipment_number.to_owned(),
            reason,
        };

        let info = self
            .tracking_info(shipment_number, token, language)
            .await
            .map_err(|err| detail_error(err.to_string()))?;

        let events = info.tracking_events.unwrap_or_default();
        let (Some(latest), Some(earliest)) = (events.first(), events.last()) else {
            return Err(detail_error("no tracking events".to_owned()));
        };

        Ok(ParcelDetail {
            latest_event: latest.description.clone(),
            latest_event_city: latest.place.clone(),
            latest_event_date: event_date(shipment_number, latest),
            shipment_date: event_date(shipment_number, earliest),
        })
    }
}

/// Build the plugin bundle for the Matkahuolto provider.
#[must_use]
pub fn plugin(transport: Arc<dyn Transport>) -> CarrierPlugin {
    CarrierPlugin {
        meta: carrier_meta(),
        port: Arc::new(MatkahuoltoCarrierPort::new(transport)),
    }
}

fn carrier_meta() -> CarrierMeta {
    CarrierMeta {
        id: CarrierId(String::from("matkahuolto")),
        name: String::from("Matkahuolto"),
    }
}

/// Map a numeric Matkahuolto status code to the shared status taxonomy.
#[must_use]
pub fn map_status_code(code: i64) -> ParcelStatus {
    match code {
        60.. => ParcelStatus::Delivered,
        50..=59 => ParcelStatus::ReadyForPickup,
        40..=49 => ParcelStatus::BeingDelivered,
        30..=39 => ParcelStatus::InTransit,
        20..=29 => ParcelStatus::Pending,
        _ => ParcelStatus::InfoReceived,
    }
}

/// Map a raw Matkahuolto status; non-numeric codes are unknown.
#[must_use]
pub fn map_status(raw: &str) -> ParcelStatus {
    raw.trim()
        .parse::<i64>()
        .map_or(ParcelStatus::Unknown, map_status_code)
}

/// Combine a `DD.MM.YYYY` date and an `HH:MM` time into a UTC instant.
///
/// Seconds in the time part are ignored.
///
/// # Errors
///
/// Returns [`PortError::Date`] when either part does not match the format.
pub fn parse_event_date(date: &str, time: &str) -> Result<DateTime<Utc>, PortError> {
    let time = time.trim();
    let clock = time.get(..5).unwrap_or(time);
    let naive =
        NaiveDateTime::parse_from_str(&format!("{} {clock}", date.trim()), EVENT_DATE_FORMAT)?;
    Ok(naive.and_utc())
}

fn event_date(shipment_number: &str, event: &TrackingEvent) -> Option<DateTime<Utc>> {
    let (date, time) = (event.date.as_deref()?, event.time.as_deref()?);
    parse_event_date(date, time)
        .inspect_err(|err| warn!(shipment = shipment_number, error = %err, "Ignoring event date"))
        .ok()
}

/// Raw status as shown to the user; non-scalar values keep their JSON form.
fn status_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn map_shipment(shipment: Shipment) -> Option<Parcel> {
    let shipment_number = shipment
        .shipment_number
        .filter(|number| !number.trim().is_empty())?;
    let raw_status = shipment
        .shipment_status
        .map(status_text)
        .unwrap_or_default();

    let mut parcel = Parcel::new(shipment_number, map_status(&raw_status), raw_status);
    parcel.sender = shipment.sender_name;
    parcel.destination = shipment.destination_place_name;
    parcel.sender_city = shipment.sender_city;
    parcel.receiver_city = shipment.receiver_city;
    Some(parcel)
}
