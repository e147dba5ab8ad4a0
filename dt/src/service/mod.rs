//! Planning service client
//!
//! HTTP contracts of the planning backend (`/plan`, `/llm/next`,
//! `/llm/explain`, `/tags`, `/normalize_tags`) behind two traits so the
//! engine can be driven by mocks, the live service, or the offline fallbacks.

mod client;
mod error;
mod types;

#[cfg(test)]
pub use client::mock;
pub use client::{Assistant, DisabledPlanner, HttpPlannerClient, PlannerApi};
pub use error::ServiceError;
pub use types::{
    AssistantReply, ExplainRequest, ExplainResponse, ExplainStop, InputKind, NextStepRequest, PlanRequest,
    PlanResponse, TagsPayload, UserLocation, WireStop,
};
