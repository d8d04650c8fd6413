//! Multi-step workflow execution: DAG definitions, on-disk store, prompt
//! templating, and the layer-parallel runner.
//!
//! A workflow is a DAG of steps. Each step runs the agent engine with a
//! specific profile and prompt. Steps can reference outputs of prior steps
//! using `{{step_name.output}}` template syntax. Independent steps (no
//! dependency edges between them) execute in parallel.

pub mod engine;
pub mod model;
pub mod store;
pub mod template;

pub use engine::WorkflowRunner;
pub use model::{StepDef, StepResult, StepStatus, WorkflowDef, WorkflowRunResult, WorkflowStatus};
pub use store::WorkflowStore;
pub use template::{MAX_TEMPLATE_OUTPUT_LENGTH, resolve_templates};
