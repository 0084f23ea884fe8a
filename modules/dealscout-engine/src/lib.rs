//! The sourcing-funnel engine: stage transitions, the outreach queue, the
//! periodic queue processor, and the auto-pipeline orchestrator.
//!
//! All persistence and external collaborators sit behind the traits in
//! [`traits`], so the whole engine is testable with the in-memory mocks in
//! [`testing`]: no network, no database, no Docker.

pub mod orchestrator;
pub mod processor;
pub mod queue;
pub mod stage;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
