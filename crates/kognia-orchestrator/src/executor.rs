use crate::compactor::{CompactedContext, ContextCompactor};
use crate::config::{ExecutorConfig, OrchestratorConfig};
use crate::lifecycle::JobLifecycle;
use crate::monitor::ExecutionMonitor;
use crate::plan::{ExecutionPlan, NodeId};
use crate::retry::{Retrier, RetryOutcome};
use crate::router::{DelegationRouter, RoutingContext};
use crate::specialist::{
    parse_dialogue_turns, validate_output, DialogueTurn, Specialist, SpecialistRegistry,
};
use kognia_core::{
    Capability, FailureKind, FailureReason, Job, KogniaError, KogniaResult, Message, Report, Role,
    SpecialistError, SpecialistOutput,
};
use kognia_store::JobStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Terminal result of one executor run over a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The plan finished; `report` is set for report-producing plans,
    /// `turns` counts the simulated dialogue turns appended to the session.
    Completed {
        /// Job id.
        job_id: Uuid,
        /// Persisted report, if any.
        report: Option<Report>,
        /// Dialogue turns appended as agent messages.
        turns: usize,
    },
    /// The job was moved to `failed`.
    Failed {
        /// Job id.
        job_id: Uuid,
        /// Persisted failure reason.
        reason: FailureReason,
    },
    /// Another executor claimed the job first, or it already left `pending`.
    NotClaimed {
        /// Job id.
        job_id: Uuid,
    },
}

impl JobOutcome {
    /// The job this outcome is about.
    pub fn job_id(&self) -> Uuid {
        match self {
            JobOutcome::Completed { job_id, .. }
            | JobOutcome::Failed { job_id, .. }
            | JobOutcome::NotClaimed { job_id } => *job_id,
        }
    }
}

/// Result of walking an execution plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanRun {
    /// Every node produced an output.
    Finished(BTreeMap<NodeId, SpecialistOutput>),
    /// A node failed for good, or cancellation was requested.
    Aborted(FailureReason),
}

struct ExecutorInner {
    store: Arc<dyn JobStore>,
    lifecycle: JobLifecycle,
    router: DelegationRouter,
    compactor: ContextCompactor,
    registry: SpecialistRegistry,
    retrier: Retrier,
    monitor: ExecutionMonitor,
    config: ExecutorConfig,
    slots: Arc<Semaphore>,
}

/// Background executor: claims pending jobs, runs their plans on a bounded
/// worker pool and drives every persistence transition.
///
/// A job holds one pool slot for its whole plan. Independent plan nodes run
/// concurrently inside that slot.
#[derive(Clone)]
pub struct JobExecutor {
    inner: Arc<ExecutorInner>,
}

impl JobExecutor {
    /// Build an executor over a store and a set of specialists.
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: SpecialistRegistry,
        config: OrchestratorConfig,
    ) -> KogniaResult<Self> {
        let router = DelegationRouter::new(&config.router)?;
        let missing = registry.missing();
        if !missing.is_empty() {
            warn!(?missing, "Executor started without specialists for some capabilities");
        }
        let max_jobs = config.executor.max_concurrent_jobs.max(1);
        Ok(Self {
            inner: Arc::new(ExecutorInner {
                lifecycle: JobLifecycle::new(store.clone()),
                store,
                router,
                compactor: ContextCompactor::new(config.compactor),
                registry,
                retrier: Retrier::new(config.retry),
                monitor: ExecutionMonitor::new(),
                config: config.executor,
                slots: Arc::new(Semaphore::new(max_jobs)),
            }),
        })
    }

    /// Execution metrics.
    pub fn monitor(&self) -> &ExecutionMonitor {
        &self.inner.monitor
    }

    /// Job state machine used by this executor.
    pub fn lifecycle(&self) -> &JobLifecycle {
        &self.inner.lifecycle
    }

    /// Free worker slots.
    pub fn available_slots(&self) -> usize {
        self.inner.slots.available_permits()
    }

    /// Run a job in the background.
    pub fn submit(&self, job_id: Uuid) -> JoinHandle<KogniaResult<JobOutcome>> {
        let executor = self.clone();
        tokio::spawn(async move { executor.run_job(job_id).await })
    }

    /// Claim and run a job to a terminal state.
    ///
    /// Waits for a free worker slot before claiming, so an excess pending job
    /// stays `pending` until capacity frees up.
    pub async fn run_job(&self, job_id: Uuid) -> KogniaResult<JobOutcome> {
        let _permit = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| KogniaError::Orchestrator(format!("worker pool closed: {e}")))?;

        let Some(job) = self.inner.lifecycle.claim(job_id).await? else {
            return Ok(JobOutcome::NotClaimed { job_id });
        };
        self.inner.monitor.job_claimed().await;

        let start = Instant::now();
        let outcome = match self.process(&job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job aborted by internal error");
                self.fail(&job, FailureReason::internal(e.to_string())).await?
            }
        };
        info!(
            job_id = %job_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Job finished"
        );
        Ok(outcome)
    }

    async fn process(&self, job: &Job) -> KogniaResult<JobOutcome> {
        let inner = &self.inner;
        if inner.lifecycle.cancellation_requested(job.id).await? {
            info!(job_id = %job.id, "Cancelled before processing started");
            return self.fail(job, FailureReason::cancelled()).await;
        }

        inner
            .store
            .append_message(job.session_id, job.user_id, Role::User, &job.prompt)
            .await?;

        let conversation = inner
            .store
            .get_recent_context(job.session_id, inner.config.context_messages)
            .await?;
        let prior_report = match inner.router.referenced_job(&job.prompt) {
            Some(referenced) => match inner.store.get_report_for_job(referenced).await? {
                Some(report) if report.user_id == job.user_id => Some(report),
                _ => {
                    return self
                        .fail(
                            job,
                            FailureReason::unroutable(format!(
                                "referenced job {referenced} has no report to build on"
                            )),
                        )
                        .await;
                }
            },
            None => inner.store.latest_report_for_session(job.session_id).await?,
        };

        let ctx = RoutingContext {
            recent_messages: &conversation,
            prior_report: prior_report.as_ref(),
        };
        let plan = match inner.router.route(&job.prompt, &ctx) {
            Ok(plan) => plan,
            Err(KogniaError::UnroutablePrompt(detail)) => {
                return self.fail(job, FailureReason::unroutable(detail)).await;
            }
            Err(e) => return Err(e),
        };
        info!(
            job_id = %job.id,
            intent = %plan.intent(),
            nodes = plan.len(),
            "Executing plan"
        );

        let mut outputs = match self
            .execute_plan(job, &plan, &conversation, prior_report.as_ref())
            .await?
        {
            PlanRun::Finished(outputs) => outputs,
            PlanRun::Aborted(reason) => return self.fail(job, reason).await,
        };

        let terminal = plan
            .terminal()
            .ok_or_else(|| KogniaError::Orchestrator("plan has no terminal node".to_string()))?;
        let output = outputs.remove(&terminal.id).ok_or_else(|| {
            KogniaError::Orchestrator(format!("no output for terminal node {}", terminal.id))
        })?;
        self.finish(job, terminal.capability, output).await
    }

    /// Walk a plan in dependency waves and collect one output per node.
    ///
    /// Cancellation is checked before every wave. Dependencies must finish
    /// before a node starts; nodes of the same wave run concurrently.
    pub async fn execute_plan(
        &self,
        job: &Job,
        plan: &ExecutionPlan,
        conversation: &[Message],
        grounding: Option<&Report>,
    ) -> KogniaResult<PlanRun> {
        plan.validate()?;
        let inner = &self.inner;
        let mut done: HashSet<NodeId> = HashSet::new();
        let mut outputs: BTreeMap<NodeId, SpecialistOutput> = BTreeMap::new();
        let mut history: Vec<SpecialistOutput> = Vec::new();

        while done.len() < plan.len() {
            if inner.lifecycle.cancellation_requested(job.id).await? {
                info!(job_id = %job.id, completed_nodes = done.len(), "Cancellation observed");
                return Ok(PlanRun::Aborted(FailureReason::cancelled()));
            }

            let ready = plan.ready(&done);
            if ready.is_empty() {
                return Err(KogniaError::Orchestrator(
                    "plan has nodes with unmet dependencies".to_string(),
                ));
            }

            let mut wave = JoinSet::new();
            for node in ready {
                let capability = plan
                    .node(node)
                    .map(|n| n.capability)
                    .ok_or_else(|| KogniaError::Orchestrator(format!("unknown node {node}")))?;
                let Some(specialist) = inner.registry.get(capability) else {
                    return Ok(PlanRun::Aborted(FailureReason::internal(format!(
                        "no specialist registered for {capability}"
                    ))));
                };
                let context = inner.compactor.compact(
                    plan,
                    node,
                    &job.prompt,
                    &history,
                    conversation,
                    grounding,
                );
                let inner = self.inner.clone();
                let job_id = job.id;
                wave.spawn(async move {
                    let start = Instant::now();
                    let outcome = inner.invoke_node(specialist, context, job_id).await;
                    (node, capability, outcome, start.elapsed().as_millis() as u64)
                });
            }

            while let Some(joined) = wave.join_next().await {
                let (node, capability, outcome, duration_ms) = joined.map_err(|e| {
                    KogniaError::Orchestrator(format!("specialist task failed: {e}"))
                })?;
                inner
                    .monitor
                    .record_node(capability, outcome.attempts, outcome.result.is_ok(), duration_ms)
                    .await;
                match outcome.result {
                    Ok(output) => {
                        debug!(
                            job_id = %job.id,
                            capability = %capability,
                            attempts = outcome.attempts,
                            duration_ms,
                            "Node completed"
                        );
                        history.push(output.clone());
                        outputs.insert(node, output);
                        done.insert(node);
                    }
                    Err(e) => {
                        // Dropping the wave aborts its siblings; their outputs are discarded.
                        return Ok(PlanRun::Aborted(FailureReason::specialist(capability, &e)));
                    }
                }
            }
        }

        Ok(PlanRun::Finished(outputs))
    }

    /// Persist the terminal output and complete the job in one store call.
    async fn finish(
        &self,
        job: &Job,
        capability: Capability,
        output: SpecialistOutput,
    ) -> KogniaResult<JobOutcome> {
        let (report, messages, turns) = match capability {
            Capability::ReportSynthesis | Capability::ExecutiveBriefing => {
                (Some(output.content.clone()), vec![output.content], 0)
            }
            Capability::ConversationSimulation => {
                let turns = parse_dialogue_turns(&output.content);
                let messages: Vec<String> =
                    turns.iter().map(DialogueTurn::to_message_content).collect();
                (None, messages, turns.len())
            }
            Capability::Research | Capability::SwotEvaluation => (None, vec![output.content], 0),
        };
        let report = self
            .inner
            .lifecycle
            .complete(job.id, report.as_deref(), &messages)
            .await?;
        self.inner.monitor.job_completed().await;
        Ok(JobOutcome::Completed {
            job_id: job.id,
            report,
            turns,
        })
    }

    async fn fail(&self, job: &Job, reason: FailureReason) -> KogniaResult<JobOutcome> {
        self.inner.lifecycle.fail(job.id, &reason).await?;
        self.inner
            .monitor
            .job_failed(reason.kind == FailureKind::Cancelled)
            .await;
        Ok(JobOutcome::Failed {
            job_id: job.id,
            reason,
        })
    }
}

impl ExecutorInner {
    /// One plan node: timed, validated attempts under the retry policy.
    async fn invoke_node(
        &self,
        specialist: Arc<dyn Specialist>,
        context: CompactedContext,
        job_id: Uuid,
    ) -> RetryOutcome<SpecialistOutput> {
        let capability = context.capability;
        let timeout = self.config.invocation_timeout();
        let specialist = specialist.as_ref();
        let context = &context;
        self.retrier
            .run(capability, job_id, move |attempt| async move {
                debug!(job_id = %job_id, capability = %capability, attempt, "Invoking specialist");
                match tokio::time::timeout(timeout, specialist.invoke(context)).await {
                    Ok(Ok(output)) => validate_output(capability, &output).map(|()| output),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(SpecialistError::ToolTimeout(format!(
                        "no response within {} ms",
                        timeout.as_millis()
                    ))),
                }
            })
            .await
    }
}
