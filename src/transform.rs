//! Transform trait and the values it exchanges with the executor.

use async_trait::async_trait;

use crate::context::PipelineContext;
use crate::data::Data;
use crate::envelope::ContentType;

/// Input handed to a stage.
#[derive(Debug)]
pub enum Input {
    /// Input of the first stage: the decoded target.
    ///
    /// `content_type` is only set when the target is raw bytes, so the stage
    /// knows how to interpret them.
    First {
        target: Data,
        content_type: Option<ContentType>,
    },

    /// Input of every later stage: the previous stage's result.
    Next(Option<Data>),
}

impl Input {
    /// Borrow the carried data.
    pub fn data(&self) -> Option<&Data> {
        match self {
            Self::First { target, .. } => Some(target),
            Self::Next(data) => data.as_ref(),
        }
    }

    /// Take the carried data.
    pub fn into_data(self) -> Option<Data> {
        match self {
            Self::First { target, .. } => Some(target),
            Self::Next(data) => data,
        }
    }

    /// Content type side channel of the first stage.
    pub fn content_type(&self) -> Option<&ContentType> {
        match self {
            Self::First { content_type, .. } => content_type.as_ref(),
            Self::Next(_) => None,
        }
    }

    pub fn is_first(&self) -> bool {
        matches!(self, Self::First { .. })
    }
}

/// What a stage tells the executor to do next.
#[derive(Debug)]
pub enum Flow {
    /// Hand the value to the next stage.
    Continue(Option<Data>),

    /// End the run successfully; remaining stages are skipped.
    Stop(Option<Data>),

    /// End the run with an error.
    Fail(anyhow::Error),
}

impl Flow {
    /// Create a failing flow.
    pub fn fail(err: impl Into<anyhow::Error>) -> Self {
        Self::Fail(err.into())
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    /// Returns the error if this flow failed.
    pub fn err(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Fail(err) => Some(err),
            _ => None,
        }
    }
}

/// A single stage of a pipeline.
#[async_trait]
pub trait Transform: Send + Sync {
    /// The name of this stage for logging.
    fn name(&self) -> &'static str;

    /// Execute the stage.
    async fn execute(&self, ctx: &mut PipelineContext, input: Input) -> Flow;
}
