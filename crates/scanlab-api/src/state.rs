//! Shared state handed to every handler.

use scanlab_pipeline::Pipeline;
use scanlab_telemetry::Metrics;

pub(crate) struct ApiState {
    pub(crate) pipeline: Pipeline,
    pub(crate) telemetry: Metrics,
}

impl ApiState {
    pub(crate) const fn new(pipeline: Pipeline, telemetry: Metrics) -> Self {
        Self {
            pipeline,
            telemetry,
        }
    }
}
