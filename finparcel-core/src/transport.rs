//! Narrow HTTP interface used by carrier clients.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};

use crate::ports::PortError;

#[derive(Debug, Clone)]
/// Outgoing request as seen by the carrier clients.
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Build a GET request.
    #[must_use]
    pub fn get<U: Into<String>>(url: U) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Build a GET request with URL-encoded query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Network`] when `base` is not a valid URL.
    pub fn get_with_query(base: &str, params: &[(&str, &str)]) -> Result<Self, PortError> {
        let url = Url::parse_with_params(base, params)
            .map_err(|err| PortError::Network(format!("invalid URL {base}: {err}")))?;
        Ok(Self::get(url.as_str()))
    }

    /// Build a POST request with a JSON body.
    #[must_use]
    pub fn post_json<U: Into<String>, B: Into<String>>(url: U, body: B) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![(
                "Content-Type".to_owned(),
                "application/json;charset=UTF-8".to_owned(),
            )],
            body: Some(body.into()),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Response status and body text.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
/// Transport service performing a single HTTP exchange.
pub trait Transport: Send + Sync {
    /// Send the request once, without retries.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Network`] when the exchange could not be completed.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PortError>;
}

/// [`Transport`] backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PortError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;

        Ok(HttpResponse { status, body })
    }
}

fn network_error(err: reqwest::Error) -> PortError {
    PortError::Network(err.to_string())
}

/// Send a request and return the body of a successful response.
///
/// # Errors
///
/// Returns [`PortError::Network`] on transport failure or a non-success status.
pub async fn send_checked(
    transport: &dyn Transport,
    request: HttpRequest,
) -> Result<String, PortError> {
    let url = request.url.clone();
    let response = transport.send(request).await?;
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(PortError::Network(format!(
            "{url} answered with HTTP {}",
            response.status
        )))
    }
}
