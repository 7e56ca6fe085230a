//! Event filters.
//!
//! An empty filter set passes everything through. Otherwise only events (or
//! readings) whose name is in the set pass, or those not in it when inverted.
//! An event that does not pass stops the run without an error.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

use crate::context::PipelineContext;
use crate::data::Data;
use crate::event::Event;
use crate::transform::{Flow, Input, Transform};

fn expect_event(data: Option<&Data>) -> Result<&Event, anyhow::Error> {
    let data = data.ok_or_else(|| anyhow!("No Event Received"))?;
    data.downcast_ref::<Event>()
        .ok_or_else(|| anyhow!("type received is not an Event: {}", data.kind()))
}

/// Passes only events from the listed devices.
#[derive(Debug, Default, Clone)]
pub struct FilterByDeviceName {
    devices: HashSet<String>,
    invert: bool,
}

impl FilterByDeviceName {
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            invert: false,
        }
    }

    /// Block the listed devices instead of allowing them.
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    fn passes(&self, device: &str) -> bool {
        self.devices.is_empty() || self.devices.contains(device) != self.invert
    }
}

#[async_trait]
impl Transform for FilterByDeviceName {
    fn name(&self) -> &'static str {
        "filter_by_device_name"
    }

    async fn execute(&self, _ctx: &mut PipelineContext, input: Input) -> Flow {
        let passes = match expect_event(input.data()) {
            Ok(event) => {
                let passes = self.passes(&event.device);
                if !passes {
                    debug!(device = %event.device, "Event filtered out by device name");
                }
                passes
            }
            Err(e) => return Flow::Fail(e),
        };

        if passes {
            Flow::Continue(input.into_data())
        } else {
            Flow::Stop(None)
        }
    }
}

/// Keeps only the listed readings of an event.
///
/// Stops the run when no reading is left.
#[derive(Debug, Default, Clone)]
pub struct FilterByReadingName {
    names: HashSet<String>,
    invert: bool,
}

impl FilterByReadingName {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            invert: false,
        }
    }

    /// Drop the listed readings instead of keeping them.
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

#[async_trait]
impl Transform for FilterByReadingName {
    fn name(&self) -> &'static str {
        "filter_by_reading_name"
    }

    async fn execute(&self, _ctx: &mut PipelineContext, input: Input) -> Flow {
        let event = match expect_event(input.data()) {
            Ok(event) => event,
            Err(e) => return Flow::Fail(e),
        };

        if self.names.is_empty() {
            return Flow::Continue(input.into_data());
        }

        let mut filtered = event.clone();
        filtered
            .readings
            .retain(|r| self.names.contains(&r.name) != self.invert);

        if filtered.readings.is_empty() {
            debug!(device = %event.device, "All readings filtered out");
            return Flow::Stop(None);
        }
        Flow::Continue(Some(Data::marshal(filtered)))
    }
}
