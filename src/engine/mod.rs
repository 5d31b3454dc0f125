//! Core engine — the resilience and orchestration layer.
//!
//! - `retry` — bounded retries with exponential backoff
//! - `cost_gate` — blocks transactions while fees exceed the ceiling
//! - `orchestrator` — the claim → approve → stake state machine
//! - `health` — best-effort connectivity and balance probe
//! - `scheduler` — main-cycle and health timers, non-overlap, shutdown

pub mod retry;
pub mod cost_gate;
pub mod orchestrator;
pub mod health;
pub mod scheduler;
