use kognia_core::{Capability, KogniaError, KogniaResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Index of a node inside its [`ExecutionPlan`].
pub type NodeId = usize;

/// The fixed set of task graph shapes the router can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Research -> SWOT -> report synthesis (-> executive briefing).
    FullAnalysis,
    /// Executive briefing over a prior report or session context.
    SummaryOnly,
    /// Persona dialogue grounded on a prior report.
    Simulation,
}

impl Intent {
    /// Every intent, in default precedence order.
    pub const ALL: [Intent; 3] = [Intent::FullAnalysis, Intent::Simulation, Intent::SummaryOnly];

    /// Stable identifier used in logs and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FullAnalysis => "full_analysis",
            Intent::SummaryOnly => "summary_only",
            Intent::Simulation => "simulation",
        }
    }

    /// Length of the canonical dependency chain, without optional nodes.
    pub fn chain_len(&self) -> usize {
        match self {
            Intent::FullAnalysis => 3,
            Intent::SummaryOnly | Intent::Simulation => 1,
        }
    }

    /// Whether the plan only makes sense on top of earlier session output.
    pub fn needs_grounding(&self) -> bool {
        matches!(self, Intent::SummaryOnly | Intent::Simulation)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One specialist invocation in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    /// Position in the plan.
    pub id: NodeId,
    /// Capability to invoke.
    pub capability: Capability,
    /// Nodes whose outputs must exist before this one starts.
    pub depends_on: Vec<NodeId>,
}

/// A per-job directed acyclic graph of specialist invocations.
///
/// Built by the router, walked by the executor, dropped when the job ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    intent: Intent,
    nodes: Vec<PlanNode>,
}

impl ExecutionPlan {
    /// An empty plan for an intent.
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            nodes: Vec::new(),
        }
    }

    /// A strict chain: every node depends on the one before it.
    pub fn chain(intent: Intent, capabilities: &[Capability]) -> Self {
        let mut plan = Self::new(intent);
        let mut previous: Option<NodeId> = None;
        for &capability in capabilities {
            let id = plan.add(capability, previous.into_iter().collect());
            previous = Some(id);
        }
        plan
    }

    /// Append a node and return its id.
    pub fn add(&mut self, capability: Capability, depends_on: Vec<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(PlanNode {
            id,
            capability,
            depends_on,
        });
        id
    }

    /// The intent this plan was built for.
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the plan has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Capabilities in insertion order.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.nodes.iter().map(|n| n.capability).collect()
    }

    /// Nodes not yet done whose dependencies are all done, in insertion order.
    pub fn ready(&self, done: &HashSet<NodeId>) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !done.contains(&n.id))
            .filter(|n| n.depends_on.iter().all(|d| done.contains(d)))
            .map(|n| n.id)
            .collect()
    }

    /// Transitive dependencies of a node, in insertion order.
    pub fn upstream(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = self
            .node(id)
            .map(|n| n.depends_on.clone())
            .unwrap_or_default();
        while let Some(dep) = stack.pop() {
            if seen.insert(dep) {
                if let Some(node) = self.node(dep) {
                    stack.extend(node.depends_on.iter().copied());
                }
            }
        }
        let mut upstream: Vec<NodeId> = seen.into_iter().collect();
        upstream.sort_unstable();
        upstream
    }

    /// The single node nothing depends on. Its output is the job's artifact.
    pub fn terminal(&self) -> Option<&PlanNode> {
        let depended: HashSet<NodeId> = self
            .nodes
            .iter()
            .flat_map(|n| n.depends_on.iter().copied())
            .collect();
        let mut sinks = self.nodes.iter().filter(|n| !depended.contains(&n.id));
        match (sinks.next(), sinks.next()) {
            (Some(sink), None) => Some(sink),
            _ => None,
        }
    }

    /// Check for cycles in the dependency graph.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        self.nodes
            .iter()
            .any(|n| self.dfs_cycle(n.id, &mut visited))
    }

    fn dfs_cycle(&self, id: NodeId, visited: &mut HashMap<NodeId, u8>) -> bool {
        match visited.get(&id) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(node) = self.node(id) {
            for &dep in &node.depends_on {
                if self.dfs_cycle(dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }

    /// Reject plans the executor cannot walk to a single artifact.
    pub fn validate(&self) -> KogniaResult<()> {
        if self.is_empty() {
            return Err(KogniaError::Orchestrator("Empty execution plan".to_string()));
        }
        for node in &self.nodes {
            if let Some(dep) = node.depends_on.iter().find(|&&d| d >= self.len()) {
                return Err(KogniaError::Orchestrator(format!(
                    "Node {} depends on unknown node {dep}",
                    node.id
                )));
            }
        }
        if self.has_cycle() {
            return Err(KogniaError::Orchestrator(
                "Dependency cycle detected in execution plan".to_string(),
            ));
        }
        if self.terminal().is_none() {
            return Err(KogniaError::Orchestrator(
                "Execution plan must have exactly one terminal node".to_string(),
            ));
        }
        Ok(())
    }
}
