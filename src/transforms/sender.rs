//! Terminal transform that delivers pipeline output.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::{ConfigError, DeliveryConfig};
use crate::context::PipelineContext;
use crate::data::Data;
use crate::retry::RetryRecord;
use crate::transform::{Flow, Input, Transform};
use crate::transport::{DeliveryError, HttpTransport, Transport};

/// Sends its input to a destination.
///
/// On a failed send the run stops with the transport error. When
/// `persist_on_failure` is set, the serialized payload is also left in the
/// context's retry slot for the store-and-forward loop to pick up; this
/// transform never retries on its own.
pub struct DeliverySender<T> {
    transport: T,
    persist_on_failure: bool,
    pass_response: bool,
    timeout: Duration,
}

impl<T: Transport> DeliverySender<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            persist_on_failure: false,
            pass_response: false,
            timeout: Duration::from_secs(30),
        }
    }

    /// Keep failed payloads for redelivery.
    pub fn persist_on_failure(mut self, enabled: bool) -> Self {
        self.persist_on_failure = enabled;
        self
    }

    /// Continue with the response body instead of nothing.
    pub fn pass_response(mut self, enabled: bool) -> Self {
        self.pass_response = enabled;
        self
    }

    /// Deadline for a single send. Expiry counts as a failed send.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serialize and send `data`.
    pub async fn send(&self, ctx: &mut PipelineContext, data: Option<Data>) -> Flow {
        let Some(data) = data else {
            error!(correlation_id = ctx.correlation_id(), "No data received for delivery");
            return Flow::fail(DeliveryError::NoData);
        };

        let payload = match data.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    correlation_id = ctx.correlation_id(),
                    kind = data.kind(),
                    error = %e,
                    "Data cannot be serialized for delivery"
                );
                return Flow::fail(DeliveryError::from(e));
            }
        };

        match self.deliver(&payload, ctx.correlation_id()).await {
            Ok(response) => {
                debug!(
                    correlation_id = ctx.correlation_id(),
                    url = %self.transport.destination().url,
                    bytes = payload.len(),
                    "Delivered payload"
                );
                if self.pass_response {
                    Flow::Continue(Some(Data::Bytes(response)))
                } else {
                    Flow::Continue(None)
                }
            }
            Err(e) => {
                error!(
                    correlation_id = ctx.correlation_id(),
                    url = %self.transport.destination().url,
                    persist = self.persist_on_failure,
                    error = %e,
                    "Delivery failed"
                );
                if self.persist_on_failure {
                    let record = RetryRecord::new(
                        ctx.correlation_id(),
                        payload,
                        self.transport.destination().clone(),
                    );
                    ctx.set_retry_data(record);
                }
                Flow::fail(e)
            }
        }
    }

    async fn deliver(
        &self,
        payload: &[u8],
        correlation_id: &str,
    ) -> Result<Vec<u8>, DeliveryError> {
        match tokio::time::timeout(self.timeout, self.transport.send(payload, correlation_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                url: self.transport.destination().url.clone(),
                elapsed: self.timeout,
            }),
        }
    }
}

impl DeliverySender<HttpTransport> {
    /// Build an HTTP sender from configuration.
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut builder = HttpTransport::builder(&config.url)
            .content_type(&config.content_type)
            .timeout(config.timeout())
            .keep_alive(config.keep_alive);
        if let (Some(name), Some(value)) = (&config.auth_header, &config.auth_value) {
            builder = builder.auth_header(name, value);
        }
        let transport = builder.build().map_err(ConfigError::Transport)?;

        Ok(Self::new(transport)
            .persist_on_failure(config.persist_on_failure)
            .pass_response(config.pass_response)
            .timeout(config.timeout()))
    }
}

#[async_trait]
impl<T: Transport> Transform for DeliverySender<T> {
    fn name(&self) -> &'static str {
        "delivery_sender"
    }

    async fn execute(&self, ctx: &mut PipelineContext, input: Input) -> Flow {
        self.send(ctx, input.into_data()).await
    }
}
