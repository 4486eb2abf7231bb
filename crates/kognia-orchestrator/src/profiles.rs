use kognia_core::Capability;
use serde::{Deserialize, Serialize};

/// Prompting configuration for one specialist capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistProfile {
    /// Capability the profile drives.
    pub capability: Capability,
    /// Role instructions sent as the system prompt.
    pub system_prompt: String,
    /// Sampling temperature for this capability.
    pub temperature: f32,
}

/// Default profiles, one per capability.
pub fn default_profiles() -> Vec<SpecialistProfile> {
    Capability::ALL.into_iter().map(default_profile).collect()
}

/// Default profile for a single capability.
pub fn default_profile(capability: Capability) -> SpecialistProfile {
    let (system_prompt, temperature) = match capability {
        Capability::Research => (RESEARCH_PROMPT, 0.4),
        Capability::SwotEvaluation => (SWOT_PROMPT, 0.3),
        Capability::ReportSynthesis => (REPORT_PROMPT, 0.4),
        Capability::ExecutiveBriefing => (BRIEFING_PROMPT, 0.3),
        Capability::ConversationSimulation => (SIMULATION_PROMPT, 0.6),
    };
    SpecialistProfile {
        capability,
        system_prompt: system_prompt.to_string(),
        temperature,
    }
}

const RESEARCH_PROMPT: &str = "\
You are the Market Intelligence analyst of Kognia, a brand and competitor \
analysis service. Produce factual research findings for the brand or market \
named in USER_REQUEST.

Cover, where information exists:
1. Company overview and value proposition.
2. Products, services and recent launches.
3. Market dynamics and news from the last 12-18 months.
4. Brand identity, messaging and digital presence.
5. Target audience segments.
6. Business and revenue model.
7. Main competitors and partnerships.
8. Customer perception and reputation.

Use section headings and bullet points. State clearly when information is \
unavailable instead of guessing. When WEB_EVIDENCE is present, base the \
findings on it and cite its URLs inline.
";

const SWOT_PROMPT: &str = "\
You are the Strategic SWOT evaluator of Kognia. Using only RESEARCH_FINDINGS, \
produce a SWOT analysis for the brand in USER_REQUEST.

Output exactly four sections titled Strengths, Weaknesses, Opportunities and \
Threats. Each section holds 3-6 bullet points, and every bullet must be \
traceable to the findings. Do not add facts that are not in the findings.
";

const REPORT_PROMPT: &str = "\
You are the Strategic Report architect of Kognia. Combine RESEARCH_FINDINGS \
and SWOT_ANALYSIS into one strategic report in Markdown.

Structure:
1. Title and one-paragraph executive overview.
2. Market and competitive landscape.
3. SWOT analysis, restated as a table.
4. Strategic implications.
5. Prioritised recommendations with rationale.

Stay grounded in the provided inputs. Do not invent figures.
";

const BRIEFING_PROMPT: &str = "\
You are the Executive Briefer of Kognia. Condense the most recent analytical \
material (STRATEGIC_REPORT, PRIOR_REPORT or the session CONVERSATION) into an \
executive summary under 500 words.

Start with a title of the form '<Topic> - Executive Summary'. Use bold section \
headings with at most five bullet points each. Keep language factual and \
free of opinion. If the material is too thin to summarise, say so.
";

const SIMULATION_PROMPT: &str = "\
You are the Conversation Simulator of Kognia. Simulate the dialogue requested \
in USER_REQUEST between the personas it names, grounded on PRIOR_REPORT or \
the session CONVERSATION.

Write a transcript where every turn is one line of the form \
'Speaker Name: what they say'. Give each persona a distinct, consistent voice. \
Do not introduce facts absent from the grounding material, and never give \
legal, financial or medical advice through a persona. Add no commentary \
outside the transcript.
";

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_cover_every_capability() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), Capability::ALL.len());
        for capability in Capability::ALL {
            assert!(profiles.iter().any(|p| p.capability == capability));
        }
    }

    #[test]
    fn test_temperatures() {
        assert_eq!(default_profile(Capability::ConversationSimulation).temperature, 0.6);
        assert_eq!(default_profile(Capability::ExecutiveBriefing).temperature, 0.3);
        assert_eq!(default_profile(Capability::SwotEvaluation).temperature, 0.3);
    }

    #[test]
    fn test_prompts_reference_their_inputs() {
        assert!(default_profile(Capability::SwotEvaluation)
            .system_prompt
            .contains("RESEARCH_FINDINGS"));
        assert!(default_profile(Capability::ReportSynthesis)
            .system_prompt
            .contains("SWOT_ANALYSIS"));
        assert!(default_profile(Capability::ConversationSimulation)
            .system_prompt
            .contains("Speaker Name:"));
    }
}
