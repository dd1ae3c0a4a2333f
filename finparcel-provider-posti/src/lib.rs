//! Provider implementation for Posti using the `OmaPosti` GraphQL API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use finparcel_core::{
    model::{CarrierId, CarrierMeta, Credentials, FALLBACK_LANGUAGE, Parcel, ParcelStatus},
    plugin::CarrierPlugin,
    ports::{CarrierPort, PortError},
    token::{SessionToken, TokenCache},
    transport::{HttpRequest, Transport, send_checked},
};

const LOGIN_URL: &str = "https://oma.posti.fi/api/auth/v1/login";
const QUERY_URL: &str = "https://oma.posti.fi/graphql/v2";

const SHIPMENT_QUERY: &str = r#"{"query":"{ shipment { shipmentNumber trackingNumbers parties { name role location { city country } } departure { city country } destination { city country } events { eventLocation { city country } eventDescription { lang value } timestamp } shipmentPhase savedDateTime } }"}"#;

/// Body of the login call.
#[derive(Debug, Serialize)]
struct LoginRequest<'req> {
    user: &'req str,
    password: &'req str,
}

/// GraphQL envelope.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: Option<QueryData>,
    #[serde(default, deserialize_with = "nullable_list")]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default, deserialize_with = "nullable_list")]
    shipment: Vec<Shipment>,
}

/// Single shipment of the account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Shipment {
    shipment_number: Option<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    tracking_numbers: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    parties: Vec<Party>,
    departure: Option<Place>,
    destination: Option<Place>,
    #[serde(default, deserialize_with = "nullable_list")]
    events: Vec<Event>,
    shipment_phase: Option<String>,
    saved_date_time: Option<String>,
}

/// Sender, recipient, or pickup point attached to a shipment.
#[derive(Debug, Deserialize)]
struct Party {
    #[serde(default, deserialize_with = "nullable_list")]
    name: Vec<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    city: Option<String>,
    country: Option<String>,
}

/// Tracking event; the last element of the list is the most recent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    event_location: Option<Place>,
    #[serde(default, deserialize_with = "nullable_list")]
    event_description: Vec<LocalizedText>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    lang: Option<String>,
    value: Option<String>,
}

/// Shipment source for Posti accounts.
pub struct PostiCarrierPort {
    transport: Arc<dyn Transport>,
    meta: CarrierMeta,
    tokens: TokenCache,
}

impl PostiCarrierPort {
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
            user: &credentials.user_name,
            password: &credentials.password,
        })
        .map_err(|err| self.auth_error(err))?;

        let raw = send_checked(self.transport.as_ref(), HttpRequest::post_json(LOGIN_URL, body))
            .await
            .map_err(|err| self.auth_error(err))?;

        parse_login_token(&raw).ok_or_else(|| self.auth_error("login returned no usable token"))
    }

    async fn query(&self, token: &SessionToken) -> Result<Vec<Shipment>, PortError> {
        let request = HttpRequest::post_json(QUERY_URL, SHIPMENT_QUERY)
            .header("Authorization", format!("Bearer {}", token.as_str()));

        let body = send_checked(self.transport.as_ref(), request)
            .await
            .map_err(|err| PortError::Fetch {
                carrier: self.meta.id.clone(),
                reason: err.to_string(),
            })?;

        let response: QueryResponse =
            serde_json::from_str(&body).map_err(|err| PortError::Parse {
                carrier: self.meta.id.clone(),
                reason: err.to_string(),
            })?;

        match response.data {
            Some(data) => Ok(data.shipment),
            None => {
                let messages: Vec<String> = response
                    .errors
                    .into_iter()
                    .map(|error| error.message)
                    .collect();
                Err(PortError::Fetch {
                    carrier: self.meta.id.clone(),
                    reason: if messages.is_empty() {
                        "response carried no data".to_owned()
                    } else {
                        messages.join("; ")
                    },
                })
            }
        }
    }

    fn auth_error<E: ToString>(&self, err: E) -> PortError {
        PortError::Auth {
            carrier: self.meta.id.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl CarrierPort for PostiCarrierPort {
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

        let parcels = shipments
            .into_iter()
            .filter_map(|shipment| {
                let parcel = map_shipment(shipment, language);
                if parcel.is_none() {
                    warn!(carrier = %self.meta.id, "Skipping shipment without tracking number");
                }
                parcel
            })
            .collect();

        Ok(parcels)
    }
}

/// Build the plugin bundle for the Posti provider.
#[must_use]
pub fn plugin(transport: Arc<dyn Transport>) -> CarrierPlugin {
    CarrierPlugin {
        meta: carrier_meta(),
        port: Arc::new(PostiCarrierPort::new(transport)),
    }
}

fn carrier_meta() -> CarrierMeta {
    CarrierMeta {
        id: CarrierId(String::from("posti")),
        name: String::from("Posti"),
    }
}

/// Map a Posti shipment phase to the shared status taxonomy.
#[must_use]
pub fn map_phase(phase: &str) -> ParcelStatus {
    match phase {
        "WAITING" => ParcelStatus::InfoReceived,
        "RECEIVED" => ParcelStatus::Pending,
        "IN_TRANSPORT" => ParcelStatus::InTransit,
        "IN_DELIVERY" => ParcelStatus::BeingDelivered,
        "READY_FOR_PICKUP" => ParcelStatus::ReadyForPickup,
        "RETURNED_TO_SENDER" => ParcelStatus::Exception,
        "DELIVERED" => ParcelStatus::Delivered,
        _ => ParcelStatus::Unknown,
    }
}

fn map_shipment(shipment: Shipment, language: &str) -> Option<Parcel> {
    let shipment_number = shipment
        .tracking_numbers
        .into_iter()
        .chain(shipment.shipment_number)
        .find(|number| !number.trim().is_empty())?;

    let raw_status = shipment.shipment_phase.unwrap_or_default();
    let mut parcel = Parcel::new(shipment_number, map_phase(&raw_status), raw_status);

    parcel.sender = party_name(&shipment.parties, &["CONSIGNOR"]);
    parcel.destination = party_name(&shipment.parties, &["DELIVERY", "CONSIGNEE"]);
    parcel.sender_city = shipment.departure.and_then(|place| place.city);
    parcel.receiver_city = shipment.destination.and_then(|place| place.city);
    parcel.shipment_date = shipment.saved_date_time.as_deref().and_then(parse_timestamp);

    if let Some(event) = shipment.events.last() {
        parcel.latest_event = localized(&event.event_description, language);
        if let Some(location) = &event.event_location {
            parcel.latest_event_city.clone_from(&location.city);
            parcel.latest_event_country.clone_from(&location.country);
        }
        parcel.latest_event_date = event.timestamp.as_deref().and_then(parse_timestamp);
    }

    Some(parcel)
}

/// Name of the first party holding one of `roles`, in preference order.
fn party_name(parties: &[Party], roles: &[&str]) -> Option<String> {
    roles.iter().find_map(|role| {
        parties
            .iter()
            .find(|party| party.role.as_deref() == Some(*role))
            .map(|party| party.name.join(", "))
            .filter(|name| !name.trim().is_empty())
    })
}

/// Non-blank text in `language`, else English, else nothing.
fn localized(texts: &[LocalizedText], language: &str) -> Option<String> {
    let pick = |wanted: &str| {
        texts
            .iter()
            .find(|text| text.lang.as_deref() == Some(wanted))
            .and_then(|text| text.value.clone())
            .filter(|value| !value.trim().is_empty())
    };
    pick(language).or_else(|| pick(FALLBACK_LANGUAGE))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .or_else(|_err| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .inspect_err(|err| debug!(raw, error = %err, "Ignoring unparsable timestamp"))
        .ok()
}

/// Login answers with the bare token, either as a JSON string or as plain text.
fn parse_login_token(body: &str) -> Option<SessionToken> {
    let token = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(token)) => token,
        Ok(_) => return None,
        Err(_) => body.to_owned(),
    };
    SessionToken::new(token).filter(|session| is_token_shaped(session.as_str()))
}

/// Bearer tokens are base64url/JWT text; anything else is an error page or similar.
fn is_token_shaped(token: &str) -> bool {
    token.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~' | '+' | '/' | '=')
    })
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
