use crate::plan::{ExecutionPlan, NodeId};
use kognia_core::{Capability, Message, Report, SpecialistOutput};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Retention limits for compacted payloads, read from `[compactor]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactorConfig {
    /// How many of the most recent session messages to keep.
    #[serde(default = "default_conversation_window")]
    pub conversation_window: usize,
    /// Per upstream output (and grounding report) character cap.
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// Per message character cap.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_conversation_window() -> usize {
    5
}

fn default_max_output_chars() -> usize {
    24_000
}

fn default_max_message_chars() -> usize {
    2_000
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            conversation_window: default_conversation_window(),
            max_output_chars: default_max_output_chars(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

const TRUNCATION_MARKER: &str = "\n[...truncated]";

/// Cut a string to at most `max` characters, marking the cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// The bounded payload handed to one specialist invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactedContext {
    /// Capability about to be invoked.
    pub capability: Capability,
    /// The job's prompt.
    pub prompt: String,
    /// Latest output of each upstream capability, in plan order.
    pub upstream: Vec<SpecialistOutput>,
    /// Prior report the node is grounded on, if any.
    pub grounding: Option<String>,
    /// Rolling window of recent session messages, oldest first.
    pub conversation: Vec<Message>,
}

impl CompactedContext {
    /// Upstream output of a given capability.
    pub fn output(&self, capability: Capability) -> Option<&SpecialistOutput> {
        self.upstream.iter().find(|o| o.role_tag == capability)
    }

    /// Render as the user turn sent to a model.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "USER_REQUEST:\n{}\n", self.prompt);
        for output in &self.upstream {
            let _ = write!(
                out,
                "\n{}:\n{}\n",
                output.role_tag.output_label(),
                output.content
            );
        }
        if let Some(grounding) = &self.grounding {
            let _ = write!(out, "\nPRIOR_REPORT:\n{grounding}\n");
        }
        if !self.conversation.is_empty() {
            out.push_str("\nCONVERSATION:\n");
            for message in &self.conversation {
                let _ = writeln!(out, "{}: {}", message.role, message.content);
            }
        }
        out
    }
}

/// Reduces accumulated job and session history to a bounded payload.
///
/// Retention policy:
/// - for every transitive upstream dependency of the node, only the most
///   recent output of that capability is kept; older ones are superseded;
/// - only the last `conversation_window` session messages are kept;
/// - every kept text is capped in characters.
pub struct ContextCompactor {
    config: CompactorConfig,
}

impl ContextCompactor {
    /// New compactor with the given limits.
    pub fn new(config: CompactorConfig) -> Self {
        Self { config }
    }

    /// Build the payload for one plan node.
    ///
    /// `history` holds every output produced so far for the job, oldest first.
    pub fn compact(
        &self,
        plan: &ExecutionPlan,
        node: NodeId,
        prompt: &str,
        history: &[SpecialistOutput],
        conversation: &[Message],
        grounding: Option<&Report>,
    ) -> CompactedContext {
        let capability = plan
            .node(node)
            .map(|n| n.capability)
            .unwrap_or(Capability::Research);

        let mut upstream: Vec<SpecialistOutput> = Vec::new();
        for dep in plan.upstream(node) {
            let Some(dep_cap) = plan.node(dep).map(|n| n.capability) else {
                continue;
            };
            if upstream.iter().any(|o| o.role_tag == dep_cap) {
                continue;
            }
            if let Some(latest) = history.iter().rev().find(|o| o.role_tag == dep_cap) {
                let mut kept = latest.clone();
                kept.content = truncate_chars(&kept.content, self.config.max_output_chars);
                upstream.push(kept);
            }
        }

        let grounding = if upstream.is_empty() {
            grounding.map(|r| truncate_chars(&r.content, self.config.max_output_chars))
        } else {
            None
        };

        let start = conversation
            .len()
            .saturating_sub(self.config.conversation_window);
        let conversation = conversation[start..]
            .iter()
            .map(|m| {
                let mut kept = m.clone();
                kept.content = truncate_chars(&kept.content, self.config.max_message_chars);
                kept
            })
            .collect();

        CompactedContext {
            capability,
            prompt: prompt.to_string(),
            upstream,
            grounding,
            conversation,
        }
    }
}

impl Default for ContextCompactor {
    fn default() -> Self {
        Self::new(CompactorConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::plan::Intent;
    use uuid::Uuid;

    fn full_plan() -> ExecutionPlan {
        ExecutionPlan::chain(
            Intent::FullAnalysis,
            &[
                Capability::Research,
                Capability::SwotEvaluation,
                Capability::ReportSynthesis,
            ],
        )
    }

    fn messages(n: usize) -> Vec<Message> {
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();
        (0..n)
            .map(|i| Message::user(session, user, format!("message {i}")))
            .collect()
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        let cut = truncate_chars("ééééé", 2);
        assert!(cut.starts_with("éé"));
        assert!(cut.ends_with("[...truncated]"));
    }

    #[test]
    fn test_latest_output_supersedes_older() {
        let compactor = ContextCompactor::default();
        let history = vec![
            SpecialistOutput::new(Capability::Research, "first findings"),
            SpecialistOutput::new(Capability::Research, "second findings"),
            SpecialistOutput::new(Capability::SwotEvaluation, "swot"),
        ];
        let ctx = compactor.compact(&full_plan(), 2, "Brand X", &history, &[], None);
        assert_eq!(ctx.upstream.len(), 2);
        assert_eq!(
            ctx.output(Capability::Research).unwrap().content,
            "second findings"
        );
        assert_eq!(ctx.output(Capability::SwotEvaluation).unwrap().content, "swot");
        assert_eq!(ctx.capability, Capability::ReportSynthesis);
    }

    #[test]
    fn test_only_upstream_outputs_are_kept() {
        let compactor = ContextCompactor::default();
        let history = vec![
            SpecialistOutput::new(Capability::Research, "findings"),
            SpecialistOutput::new(Capability::SwotEvaluation, "swot"),
        ];
        let ctx = compactor.compact(&full_plan(), 1, "Brand X", &history, &[], None);
        assert_eq!(ctx.upstream.len(), 1);
        assert!(ctx.output(Capability::SwotEvaluation).is_none());
    }

    #[test]
    fn test_conversation_window_and_caps() {
        let compactor = ContextCompactor::new(CompactorConfig {
            conversation_window: 3,
            max_output_chars: 4,
            max_message_chars: 100,
        });
        let history = vec![SpecialistOutput::new(Capability::Research, "abcdefgh")];
        let convo = messages(10);
        let ctx = compactor.compact(&full_plan(), 1, "p", &history, &convo, None);
        assert_eq!(ctx.conversation.len(), 3);
        assert_eq!(ctx.conversation[0].content, "message 7");
        assert_eq!(ctx.conversation[2].content, "message 9");
        assert!(ctx.upstream[0].content.starts_with("abcd\n"));
    }

    #[test]
    fn test_grounding_only_for_root_nodes() {
        let compactor = ContextCompactor::default();
        let report = Report::new(Uuid::new_v4(), Uuid::new_v4(), "# Prior report");
        let summary = ExecutionPlan::chain(Intent::SummaryOnly, &[Capability::ExecutiveBriefing]);
        let ctx = compactor.compact(&summary, 0, "Summarize", &[], &[], Some(&report));
        assert_eq!(ctx.grounding.as_deref(), Some("# Prior report"));

        let history = vec![SpecialistOutput::new(Capability::Research, "findings")];
        let ctx = compactor.compact(&full_plan(), 1, "p", &history, &[], Some(&report));
        assert!(ctx.grounding.is_none());
    }

    #[test]
    fn test_render_labels_sections() {
        let compactor = ContextCompactor::default();
        let history = vec![
            SpecialistOutput::new(Capability::Research, "findings"),
            SpecialistOutput::new(Capability::SwotEvaluation, "swot"),
        ];
        let rendered = compactor
            .compact(&full_plan(), 2, "Brand X", &history, &messages(1), None)
            .render();
        assert!(rendered.starts_with("USER_REQUEST:\nBrand X\n"));
        let research = rendered.find("RESEARCH_FINDINGS:").unwrap();
        let swot = rendered.find("SWOT_ANALYSIS:").unwrap();
        assert!(research < swot);
        assert!(rendered.contains("CONVERSATION:\nuser: message 0\n"));
    }
}
