//! Orchestration core for Kognia: turns a free-text request into a routed
//! execution plan of specialist calls and drives the job to a terminal state.
//!
//! A job is claimed from the store, its prompt is classified into one of the
//! fixed intents, the resulting plan is walked in dependency order on a
//! bounded worker pool, and the outcome is persisted as a report, a set of
//! simulated dialogue messages, or a structured failure.
//!
//! # Main types
//!
//! - [`JobExecutor`]: Bounded worker pool that claims and runs jobs.
//! - [`Dispatcher`]: Feeds pending jobs from the store into the executor.
//! - [`DelegationRouter`]: Rule-based intent classification and plan building.
//! - [`ExecutionPlan`]: Dependency graph of specialist capabilities.
//! - [`ContextCompactor`]: Bounded per-node payloads from job and session history.
//! - [`Specialist`]: Typed boundary around one analytical capability.
//! - [`RetryPolicy`]: Bounded exponential backoff for transient failures.
//! - [`ExecutionMonitor`]: Per-capability and per-job metrics.

/// Context compaction for specialist invocations.
pub mod compactor;
/// Orchestrator configuration sections.
pub mod config;
/// Polling loop over pending jobs.
pub mod dispatcher;
/// Background executor and plan walker.
pub mod executor;
/// Job state machine over the store.
pub mod lifecycle;
/// Execution metrics.
pub mod monitor;
/// Execution plans and intents.
pub mod plan;
/// Default specialist profiles.
pub mod profiles;
/// Retry policy with exponential backoff.
pub mod retry;
/// Delegation router.
pub mod router;
/// Specialist boundary, registry and output checks.
pub mod specialist;

pub use compactor::{CompactedContext, CompactorConfig, ContextCompactor};
pub use config::{ExecutorConfig, OrchestratorConfig};
pub use dispatcher::Dispatcher;
pub use executor::{JobExecutor, JobOutcome, PlanRun};
pub use lifecycle::JobLifecycle;
pub use monitor::{CapabilityMetrics, ExecutionMonitor, JobMetrics};
pub use plan::{ExecutionPlan, Intent, NodeId, PlanNode};
pub use profiles::{default_profile, default_profiles, SpecialistProfile};
pub use retry::{Retrier, RetryOutcome, RetryPolicy};
pub use router::{
    default_precedence, Classification, DelegationRouter, IntentRule, RankBy, RouterConfig,
    RoutingContext,
};
pub use specialist::{
    parse_dialogue_turns, validate_output, DialogueTurn, LlmSpecialist, ResearchSpecialist,
    Specialist, SpecialistRegistry,
};
