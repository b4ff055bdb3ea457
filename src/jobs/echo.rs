use crate::executor::{Job, JobContext, JobError, JobParams};
use serde_json::Value as JsonValue;

/// Returns its params unchanged.
pub struct EchoJob;

impl EchoJob {
    pub const CLASS_NAME: &'static str = "builtin.Echo";
}

impl Job for EchoJob {
    fn run(&self, _ctx: &JobContext, params: &JobParams) -> Result<JsonValue, JobError> {
        Ok(JsonValue::Object(params.clone()))
    }
}
