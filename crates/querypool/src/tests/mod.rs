//! Test suites for the orchestrator.

mod behaviour;
pub(crate) mod support;
