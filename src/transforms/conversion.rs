//! Format conversions.

use async_trait::async_trait;

use crate::context::PipelineContext;
use crate::data::{Data, Marshal, SerializeError};
use crate::transform::{Flow, Input, Transform};

/// Converts a structured value into JSON text.
///
/// Text passes through unchanged. Bytes and opaque values fail the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformToJson;

#[async_trait]
impl Transform for TransformToJson {
    fn name(&self) -> &'static str {
        "transform_to_json"
    }

    async fn execute(&self, _ctx: &mut PipelineContext, input: Input) -> Flow {
        match input.into_data() {
            Some(Data::Marshal(value)) => match json_text(&*value) {
                Ok(text) => Flow::Continue(Some(Data::Text(text))),
                Err(e) => Flow::fail(e),
            },
            Some(text @ Data::Text(_)) => Flow::Continue(Some(text)),
            Some(other) => Flow::fail(anyhow::anyhow!(
                "cannot convert {} data to JSON",
                other.kind()
            )),
            None => Flow::fail(anyhow::anyhow!("No Data Received")),
        }
    }
}

fn json_text(value: &dyn Marshal) -> Result<String, SerializeError> {
    Ok(String::from_utf8(value.to_json()?)?)
}
