//! Application services: orchestration, startup rehydration and read queries.

pub mod orchestrator;
pub mod query_handlers;
pub mod rehydrator;
