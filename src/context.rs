//! Per-run pipeline context.

use tracing::{info_span, Span};

use crate::decode::Decoded;
use crate::retry::RetryRecord;

/// State threaded through every stage of a single run.
///
/// A context belongs to exactly one run and is dropped when the run ends.
#[derive(Debug)]
pub struct PipelineContext {
    correlation_id: String,
    event_id: Option<String>,
    event_checksum: Option<String>,
    retry_data: Option<RetryRecord>,
    span: Span,
}

impl PipelineContext {
    /// Create a context for the run identified by `correlation_id`.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        let span = info_span!("pipeline_run", correlation_id = %correlation_id);
        Self {
            correlation_id,
            event_id: None,
            event_checksum: None,
            retry_data: None,
            span,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Identifier of the decoded event, if the payload carried one.
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// Checksum of the source message, set for CBOR payloads.
    pub fn event_checksum(&self) -> Option<&str> {
        self.event_checksum.as_deref()
    }

    /// The span all log events of this run belong to.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn retry_data(&self) -> Option<&RetryRecord> {
        self.retry_data.as_ref()
    }

    /// Store a record for later redelivery, replacing any previous one.
    pub fn set_retry_data(&mut self, record: RetryRecord) {
        self.retry_data = Some(record);
    }

    /// Take the pending retry record out of the context.
    pub fn take_retry_data(&mut self) -> Option<RetryRecord> {
        self.retry_data.take()
    }

    pub(crate) fn stamp(&mut self, correlation_id: &str, decoded: &Decoded) {
        if self.correlation_id != correlation_id {
            self.correlation_id = correlation_id.to_string();
            self.span = info_span!("pipeline_run", correlation_id = %self.correlation_id);
        }
        self.event_id = decoded.event_id.clone();
        self.event_checksum = decoded.checksum.clone();
    }
}
