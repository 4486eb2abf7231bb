use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of analytical capabilities a specialist can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Market and competitor research.
    Research,
    /// SWOT evaluation over research findings.
    SwotEvaluation,
    /// Strategic report assembled from research and SWOT.
    ReportSynthesis,
    /// Short executive summary of a report.
    ExecutiveBriefing,
    /// Simulated persona dialogue grounded on a report.
    ConversationSimulation,
}

impl Capability {
    /// Every capability, in canonical chain order.
    pub const ALL: [Capability; 5] = [
        Capability::Research,
        Capability::SwotEvaluation,
        Capability::ReportSynthesis,
        Capability::ExecutiveBriefing,
        Capability::ConversationSimulation,
    ];

    /// Stable snake_case identifier, used in failure codes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Research => "research",
            Capability::SwotEvaluation => "swot_evaluation",
            Capability::ReportSynthesis => "report_synthesis",
            Capability::ExecutiveBriefing => "executive_briefing",
            Capability::ConversationSimulation => "conversation_simulation",
        }
    }

    /// Section label used when the output is handed downstream.
    pub fn output_label(&self) -> &'static str {
        match self {
            Capability::Research => "RESEARCH_FINDINGS",
            Capability::SwotEvaluation => "SWOT_ANALYSIS",
            Capability::ReportSynthesis => "STRATEGIC_REPORT",
            Capability::ExecutiveBriefing => "EXECUTIVE_SUMMARY",
            Capability::ConversationSimulation => "SIMULATED_CONVERSATION",
        }
    }

    /// Whether this capability's output becomes the persisted report when it
    /// is the terminal node of a plan.
    pub fn produces_report(&self) -> bool {
        matches!(
            self,
            Capability::ReportSynthesis | Capability::ExecutiveBriefing
        )
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{s}'"))
    }
}

/// Output of one specialist invocation, passed along plan edges.
///
/// Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistOutput {
    /// Capability that produced the output.
    pub role_tag: Capability,
    /// Main textual payload.
    pub content: String,
    /// Free-form metadata (model, temperature, turn count, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SpecialistOutput {
    /// Output with empty metadata.
    pub fn new(role_tag: Capability, content: impl Into<String>) -> Self {
        Self {
            role_tag,
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Builder-style metadata insert.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_roundtrip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
            let json = serde_json::to_string(&cap).unwrap();
            assert_eq!(json, format!("\"{cap}\""));
        }
        assert!("planner".parse::<Capability>().is_err());
    }

    #[test]
    fn test_report_producers() {
        let producers: Vec<_> = Capability::ALL
            .into_iter()
            .filter(Capability::produces_report)
            .collect();
        assert_eq!(
            producers,
            vec![Capability::ReportSynthesis, Capability::ExecutiveBriefing]
        );
    }

    #[test]
    fn test_output_metadata() {
        let out = SpecialistOutput::new(Capability::Research, "findings")
            .with_metadata("temperature", serde_json::json!(0.4));
        assert_eq!(out.metadata["temperature"], serde_json::json!(0.4));
        assert_eq!(out.role_tag.output_label(), "RESEARCH_FINDINGS");
    }
}
