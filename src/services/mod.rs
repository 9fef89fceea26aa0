pub mod assessment;
pub mod consultation;
pub mod diet_plan;
pub mod flow_registry;
pub mod gemini;
pub mod prompts;
pub mod realtime;
pub mod structured;
