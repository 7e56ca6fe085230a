//! Built-in transforms.

pub mod conversion;
pub mod filter;
pub mod sender;

pub use conversion::TransformToJson;
pub use filter::{FilterByDeviceName, FilterByReadingName};
pub use sender::DeliverySender;

use async_trait::async_trait;

use crate::context::PipelineContext;
use crate::transform::{Flow, Input, Transform};

/// A transform backed by a synchronous closure.
pub struct FnTransform<F> {
    name: &'static str,
    f: F,
}

/// Wrap a closure as a [`Transform`].
///
/// ```rust,ignore
/// let upper = fn_transform("uppercase", |_ctx, input| match input.into_data() {
///     Some(Data::Text(text)) => Flow::Continue(Some(Data::Text(text.to_uppercase()))),
///     other => Flow::Continue(other),
/// });
/// ```
pub fn fn_transform<F>(name: &'static str, f: F) -> FnTransform<F>
where
    F: Fn(&mut PipelineContext, Input) -> Flow + Send + Sync,
{
    FnTransform { name, f }
}

#[async_trait]
impl<F> Transform for FnTransform<F>
where
    F: Fn(&mut PipelineContext, Input) -> Flow + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, ctx: &mut PipelineContext, input: Input) -> Flow {
        (self.f)(ctx, input)
    }
}
