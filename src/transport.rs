//! Delivery transports.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::data::SerializeError;
use crate::envelope::CONTENT_TYPE_JSON;

/// Header carrying the correlation id on outbound requests.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Where a payload is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub url: String,
    pub content_type: String,
}

impl Destination {
    /// A destination that receives JSON.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: CONTENT_TYPE_JSON.to_string(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Error returned by a delivery attempt.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Nothing was passed to the sender.
    #[error("No Data Received")]
    NoData,

    /// The data could not be serialized.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// The request could not be completed.
    #[error("failed to deliver to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The destination answered with a non-success status.
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    /// The attempt did not finish in time.
    #[error("delivery to {url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },

    /// The destination could not be reached.
    #[error("destination unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl DeliveryError {
    /// Create an unavailable error.
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unavailable(err.into())
    }

    /// Returns true if a later attempt could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NoData | Self::Serialize(_))
    }
}

/// Sends serialized payloads to a destination.
///
/// Connection parameters are fixed when the transport is built.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The destination this transport delivers to.
    fn destination(&self) -> &Destination;

    /// Send a payload and return the response body.
    async fn send(&self, payload: &[u8], correlation_id: &str) -> Result<Vec<u8>, DeliveryError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn destination(&self) -> &Destination {
        (**self).destination()
    }

    async fn send(&self, payload: &[u8], correlation_id: &str) -> Result<Vec<u8>, DeliveryError> {
        (**self).send(payload, correlation_id).await
    }
}

/// HTTP POST transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    destination: Destination,
    auth: Option<(String, String)>,
}

impl HttpTransport {
    /// Start building a transport for `url`.
    pub fn builder(url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            destination: Destination::new(url),
            auth: None,
            timeout: Duration::from_secs(30),
            keep_alive: true,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn send(&self, payload: &[u8], correlation_id: &str) -> Result<Vec<u8>, DeliveryError> {
        let url = &self.destination.url;
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, self.destination.content_type.as_str())
            .header(CORRELATION_HEADER, correlation_id)
            .body(payload.to_vec());
        if let Some((name, value)) = &self.auth {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| DeliveryError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(body.to_vec())
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    destination: Destination,
    auth: Option<(String, String)>,
    timeout: Duration,
    keep_alive: bool,
}

impl HttpTransportBuilder {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.destination.content_type = content_type.into();
        self
    }

    /// Send `name: value` with every request.
    pub fn auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth = Some((name.into(), value.into()));
        self
    }

    /// Request timeout enforced by the HTTP client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether idle connections are kept for reuse.
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn build(self) -> Result<HttpTransport, reqwest::Error> {
        let mut client = reqwest::Client::builder().timeout(self.timeout);
        if !self.keep_alive {
            client = client.pool_max_idle_per_host(0);
        }
        Ok(HttpTransport {
            client: client.build()?,
            destination: self.destination,
            auth: self.auth,
        })
    }
}
