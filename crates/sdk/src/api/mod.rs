//! API endpoint groups, one per resource.

mod health;
mod runs;
mod workflows;

pub use health::{HealthApi, HealthCheck};
pub use runs::RunsApi;
pub use workflows::{StepInput, UpdateStepRequest, UpdateWorkflowRequest, WorkflowsApi};
