//! Pipeline runtime: decodes envelopes and drives them through the chain.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::{ConfigError, RuntimeConfig};
use crate::context::PipelineContext;
use crate::decode::{self, DecodeError, TargetType};
use crate::envelope::Envelope;
use crate::registry::{ChainSnapshot, TransformChain, TransformRegistry};
use crate::retry::RetryRecord;
use crate::store::RetryStore;
use crate::transform::{Flow, Input, Transform};

/// Transport-facing class of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The envelope itself was bad.
    ClientError,
    /// The runtime is misconfigured.
    ServerError,
    /// A pipeline function rejected the input.
    Unprocessable,
}

impl StatusClass {
    pub fn http_status(self) -> u16 {
        match self {
            Self::ClientError => 400,
            Self::ServerError => 500,
            Self::Unprocessable => 422,
        }
    }
}

/// Error returned by a pipeline run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A pipeline function stopped the run with an error.
    #[error("pipeline function {stage} ('{name}') failed: {source}")]
    Pipeline {
        stage: usize,
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl RuntimeError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::Config(_) => StatusClass::ServerError,
            Self::Decode(_) => StatusClass::ClientError,
            Self::Pipeline { .. } => StatusClass::Unprocessable,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.status_class().http_status()
    }
}

/// Runs envelopes through the registered transform chain.
///
/// Shared by all concurrent runs. Each run takes its own chain snapshot and
/// context, so [`set_transforms`](Self::set_transforms) never disturbs a run
/// that has already started.
pub struct PipelineRuntime {
    target: TargetType,
    registry: TransformRegistry,
    retry_store: Option<Arc<dyn RetryStore>>,
}

impl PipelineRuntime {
    /// Create a runtime with an empty chain.
    pub fn new(target: TargetType) -> Self {
        Self {
            target,
            registry: TransformRegistry::default(),
            retry_store: None,
        }
    }

    /// Create a runtime for the configured target type.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.resolve_target_type()?))
    }

    /// Set the initial transform chain.
    pub fn with_transforms(self, chain: TransformChain) -> Self {
        self.registry.replace(chain);
        self
    }

    /// Hand retry records left by failed deliveries to `store`.
    pub fn with_retry_store(mut self, store: Arc<dyn RetryStore>) -> Self {
        self.retry_store = Some(store);
        self
    }

    /// Replace the transform chain. Runs already in flight are unaffected.
    pub fn set_transforms(&self, chain: TransformChain) {
        self.registry.replace(chain);
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn target_type(&self) -> &TargetType {
        &self.target
    }

    /// Process one envelope with a fresh context.
    ///
    /// A retry record left in the context is appended to the retry store,
    /// whatever the outcome of the run.
    pub async fn process_message(&self, envelope: &Envelope) -> Result<(), RuntimeError> {
        let mut ctx = PipelineContext::new(envelope.correlation_id.clone());
        let result = self.run(envelope, &mut ctx).await;
        if let Some(record) = ctx.take_retry_data() {
            self.hand_off(record).await;
        }
        result
    }

    /// Run one envelope against the current chain using `ctx`.
    pub async fn run(
        &self,
        envelope: &Envelope,
        ctx: &mut PipelineContext,
    ) -> Result<(), RuntimeError> {
        let chain: ChainSnapshot = self.registry.snapshot();
        execute(envelope, &self.target, &chain, ctx).await
    }

    async fn hand_off(&self, record: RetryRecord) {
        let correlation_id = record.correlation_id.clone();
        let Some(store) = &self.retry_store else {
            warn!(
                correlation_id = %correlation_id,
                "No retry store configured, dropping retry record"
            );
            return;
        };

        match store.append(record).await {
            Ok(id) => info!(
                correlation_id = %correlation_id,
                record_id = id.0,
                "Stored payload for redelivery"
            ),
            Err(e) => error!(
                correlation_id = %correlation_id,
                error = %e,
                "Failed to store retry record"
            ),
        }
    }
}

impl std::fmt::Debug for PipelineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRuntime")
            .field("target", &self.target)
            .field("registry", &self.registry)
            .field("retry_store", &self.retry_store.is_some())
            .finish()
    }
}

/// Decode `envelope` and run it through `chain` in order.
///
/// The first stage receives the decoded target, every later stage the
/// previous stage's result. A stage that stops without an error ends the run
/// successfully; one that fails ends it with [`RuntimeError::Pipeline`].
pub async fn execute(
    envelope: &Envelope,
    target: &TargetType,
    chain: &[Arc<dyn Transform>],
    ctx: &mut PipelineContext,
) -> Result<(), RuntimeError> {
    let decoded = decode::decode(envelope, target).map_err(|e| {
        error!(
            correlation_id = %envelope.correlation_id,
            content_type = %envelope.content_type,
            target = target.name(),
            error = %e,
            "Failed to decode message"
        );
        e
    })?;

    ctx.stamp(&envelope.correlation_id, &decoded);
    let span = ctx.span().clone();

    async move {
        debug!(
            transforms = chain.len(),
            event_id = ctx.event_id(),
            "Pipeline run started"
        );

        let mut input = Input::First {
            target: decoded.data,
            content_type: decoded.content_type,
        };

        for (stage, transform) in chain.iter().enumerate() {
            match transform.execute(ctx, input).await {
                Flow::Continue(result) => input = Input::Next(result),
                Flow::Stop(_) => {
                    debug!(
                        correlation_id = ctx.correlation_id(),
                        stage,
                        transform = transform.name(),
                        "Pipeline stopped early"
                    );
                    return Ok(());
                }
                Flow::Fail(source) => {
                    error!(
                        correlation_id = ctx.correlation_id(),
                        stage,
                        transform = transform.name(),
                        error = %source,
                        "Pipeline function failed"
                    );
                    return Err(RuntimeError::Pipeline {
                        stage,
                        name: transform.name(),
                        source,
                    });
                }
            }
        }

        debug!(correlation_id = ctx.correlation_id(), "Pipeline run completed");
        Ok(())
    }
    .instrument(span)
    .await
}
