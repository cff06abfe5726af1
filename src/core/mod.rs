// src/core/mod.rs

// The scanning pipeline. `main.rs` only wires these together.

/// Data structures shared across the pipeline: jobs, verdicts and the
/// payloads exchanged with the scheduler and the moderation workflow.
pub mod models;

/// Static table of the fixed verdicts handed out by the heuristics and the
/// fail-closed paths.
pub mod knowledge_base;

/// The per-URL checks: threat intelligence lookup and structural heuristics.
pub mod scanner;

/// Combines per-URL checks into verdicts and per-URL verdicts into a job verdict.
pub mod aggregator;

/// Scan-job persistence with atomic claims.
pub mod store;

/// Escalation of unsafe findings to moderators.
pub mod notifier;

/// Claims jobs and drives them through the pipeline.
pub mod orchestrator;
