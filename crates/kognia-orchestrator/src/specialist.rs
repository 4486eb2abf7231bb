use crate::compactor::CompactedContext;
use crate::profiles::{default_profiles, SpecialistProfile};
use async_trait::async_trait;
use kognia_agent::{LlmClient, WebResearchTools};
use kognia_core::{Capability, SpecialistError, SpecialistOutput};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// One analytical capability behind a typed boundary.
///
/// A specialist reads the compacted context, may call external services, and
/// returns either an output or a typed failure. It never retries and never
/// touches persistence.
#[async_trait]
pub trait Specialist: Send + Sync {
    /// The capability this specialist implements.
    fn capability(&self) -> Capability;

    /// Produce an output for the given context.
    async fn invoke(&self, context: &CompactedContext)
        -> Result<SpecialistOutput, SpecialistError>;
}

/// Lookup table from capability to implementation.
#[derive(Default, Clone)]
pub struct SpecialistRegistry {
    specialists: HashMap<Capability, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// LLM-backed specialists for every capability, using the default profiles.
    pub fn with_llm(client: LlmClient) -> Self {
        let mut registry = Self::new();
        for profile in default_profiles() {
            registry.register(Arc::new(LlmSpecialist::new(profile, client.clone())));
        }
        registry
    }

    /// Back the Research capability with web search and page fetches.
    pub fn with_research_tools(mut self, client: LlmClient, tools: WebResearchTools) -> Self {
        let profile = crate::profiles::default_profile(Capability::Research);
        self.register(Arc::new(ResearchSpecialist::new(profile, client, tools)));
        self
    }

    /// Add or replace the specialist for its capability.
    pub fn register(&mut self, specialist: Arc<dyn Specialist>) {
        self.specialists.insert(specialist.capability(), specialist);
    }

    /// The specialist for a capability.
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Specialist>> {
        self.specialists.get(&capability).cloned()
    }

    /// Capabilities without a registered specialist.
    pub fn missing(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| !self.specialists.contains_key(c))
            .collect()
    }
}

/// Specialist that prompts a chat model with its profile.
pub struct LlmSpecialist {
    profile: SpecialistProfile,
    client: LlmClient,
}

impl LlmSpecialist {
    /// Bind a profile to a client.
    pub fn new(profile: SpecialistProfile, client: LlmClient) -> Self {
        Self { profile, client }
    }
}

#[async_trait]
impl Specialist for LlmSpecialist {
    fn capability(&self) -> Capability {
        self.profile.capability
    }

    async fn invoke(
        &self,
        context: &CompactedContext,
    ) -> Result<SpecialistOutput, SpecialistError> {
        let content = self
            .client
            .complete(
                &self.profile.system_prompt,
                &context.render(),
                Some(self.profile.temperature),
            )
            .await?;
        Ok(SpecialistOutput::new(self.profile.capability, content)
            .with_metadata("temperature", serde_json::json!(self.profile.temperature)))
    }
}

/// Research specialist that gathers web evidence before prompting the model.
///
/// Search and fetch failures come back as tool errors, so a flaky search
/// service is retried like a flaky model.
pub struct ResearchSpecialist {
    profile: SpecialistProfile,
    client: LlmClient,
    tools: WebResearchTools,
}

impl ResearchSpecialist {
    /// Bind the research profile to a client and tool set.
    pub fn new(profile: SpecialistProfile, client: LlmClient, tools: WebResearchTools) -> Self {
        Self {
            profile,
            client,
            tools,
        }
    }
}

#[async_trait]
impl Specialist for ResearchSpecialist {
    fn capability(&self) -> Capability {
        Capability::Research
    }

    async fn invoke(
        &self,
        context: &CompactedContext,
    ) -> Result<SpecialistOutput, SpecialistError> {
        let evidence = self.tools.gather(&context.prompt).await?;
        let mut user_prompt = context.render();
        if evidence.is_empty() {
            info!("No web evidence found, researching from model knowledge");
        } else {
            user_prompt.push_str("\nWEB_EVIDENCE:\n");
            user_prompt.push_str(&evidence.render());
        }
        let content = self
            .client
            .complete(
                &self.profile.system_prompt,
                &user_prompt,
                Some(self.profile.temperature),
            )
            .await?;
        Ok(SpecialistOutput::new(Capability::Research, content)
            .with_metadata("temperature", serde_json::json!(self.profile.temperature))
            .with_metadata("sources", serde_json::json!(evidence.sources())))
    }
}

/// One speaker turn parsed from a simulated conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTurn {
    /// Persona name.
    pub speaker: String,
    /// What the persona said.
    pub text: String,
}

impl DialogueTurn {
    /// `Speaker: text`, the form persisted as a session message.
    pub fn to_message_content(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

fn turn_regex() -> Option<&'static Regex> {
    static TURN: OnceLock<Option<Regex>> = OnceLock::new();
    TURN.get_or_init(|| {
        Regex::new(r"^\s*[\[*]*([^\[\]:*\n]{1,60}?)[\]*]*\s*:[\s*]*(\S.*)$").ok()
    })
    .as_ref()
}

/// Extract `Speaker: text` turns, skipping narration and headings.
pub fn parse_dialogue_turns(content: &str) -> Vec<DialogueTurn> {
    let Some(turn) = turn_regex() else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| {
            let caps = turn.captures(line)?;
            let speaker = caps.get(1)?.as_str().trim();
            let text = caps.get(2)?.as_str().trim();
            if speaker.is_empty() || speaker.split_whitespace().count() > 6 {
                return None;
            }
            Some(DialogueTurn {
                speaker: speaker.to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}

const SWOT_QUADRANTS: [&str; 4] = ["strength", "weakness", "opportunit", "threat"];

/// Structural checks every specialist output must pass.
pub fn validate_output(
    expected: Capability,
    output: &SpecialistOutput,
) -> Result<(), SpecialistError> {
    if output.role_tag != expected {
        return Err(SpecialistError::InvalidOutput(format!(
            "expected {expected} output, got {}",
            output.role_tag
        )));
    }
    if output.content.trim().is_empty() {
        return Err(SpecialistError::InvalidOutput("empty output".to_string()));
    }
    match expected {
        Capability::SwotEvaluation => {
            let lower = output.content.to_lowercase();
            let missing: Vec<&str> = SWOT_QUADRANTS
                .into_iter()
                .filter(|q| !lower.contains(q))
                .collect();
            if !missing.is_empty() {
                return Err(SpecialistError::InvalidOutput(format!(
                    "SWOT analysis is missing quadrants: {}",
                    missing.join(", ")
                )));
            }
        }
        Capability::ConversationSimulation => {
            if parse_dialogue_turns(&output.content).is_empty() {
                return Err(SpecialistError::InvalidOutput(
                    "simulated conversation has no speaker turns".to_string(),
                ));
            }
        }
        Capability::Research | Capability::ReportSynthesis | Capability::ExecutiveBriefing => {}
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kognia_agent::{CompletionRequest, LlmBackend};
    use std::sync::Mutex;

    struct EchoBackend {
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, SpecialistError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok("Strengths / Weaknesses / Opportunities / Threats".to_string())
        }
    }

    #[test]
    fn test_parse_dialogue_turns() {
        let transcript = "\
Kognia presents the following simulated conversation:

Ana (Gen Z User): Honestly the app feels dated.
**Marco**: I disagree, the loyalty program is strong.
[Brand Manager]: Let's look at the churn numbers.
- a bullet without a speaker
";
        let turns = parse_dialogue_turns(transcript);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].speaker, "Ana (Gen Z User)");
        assert_eq!(turns[1].speaker, "Marco");
        assert_eq!(turns[1].text, "I disagree, the loyalty program is strong.");
        assert_eq!(turns[2].speaker, "Brand Manager");
        assert_eq!(
            turns[2].to_message_content(),
            "Brand Manager: Let's look at the churn numbers."
        );
    }

    #[test]
    fn test_validate_swot_requires_all_quadrants() {
        let partial = SpecialistOutput::new(
            Capability::SwotEvaluation,
            "Strengths: x\nWeaknesses: y\nOpportunities: z",
        );
        let err = validate_output(Capability::SwotEvaluation, &partial).unwrap_err();
        assert!(err.to_string().contains("threat"));

        let full = SpecialistOutput::new(
            Capability::SwotEvaluation,
            "## Strengths\n## Weaknesses\n## Opportunities\n## Threats",
        );
        validate_output(Capability::SwotEvaluation, &full).unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_and_mismatched() {
        let empty = SpecialistOutput::new(Capability::Research, "   ");
        assert!(validate_output(Capability::Research, &empty).is_err());

        let wrong = SpecialistOutput::new(Capability::Research, "findings");
        let err = validate_output(Capability::ReportSynthesis, &wrong).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_validate_simulation_needs_turns() {
        let prose = SpecialistOutput::new(
            Capability::ConversationSimulation,
            "The personas would probably disagree.",
        );
        assert!(validate_output(Capability::ConversationSimulation, &prose).is_err());
    }

    #[test]
    fn test_registry_missing() {
        let registry = SpecialistRegistry::new();
        assert_eq!(registry.missing().len(), 5);
        let client = LlmClient::from_backend(Arc::new(EchoBackend {
            seen: Mutex::new(Vec::new()),
        }));
        let registry = SpecialistRegistry::with_llm(client);
        assert!(registry.missing().is_empty());
    }

    #[test]
    fn test_with_research_tools_replaces_research_only() {
        let client = LlmClient::from_backend(Arc::new(EchoBackend {
            seen: Mutex::new(Vec::new()),
        }));
        let registry = SpecialistRegistry::with_llm(client.clone()).with_research_tools(
            client,
            WebResearchTools::new(kognia_agent::ResearchToolsConfig::default()),
        );
        assert!(registry.missing().is_empty());
        assert_eq!(
            registry.get(Capability::Research).unwrap().capability(),
            Capability::Research
        );
    }

    #[tokio::test]
    async fn test_llm_specialist_uses_profile() {
        let backend = Arc::new(EchoBackend {
            seen: Mutex::new(Vec::new()),
        });
        let client = LlmClient::from_backend(backend.clone());
        let specialist = LlmSpecialist::new(
            crate::profiles::default_profile(Capability::SwotEvaluation),
            client,
        );
        let context = CompactedContext {
            capability: Capability::SwotEvaluation,
            prompt: "Brand X".to_string(),
            upstream: vec![SpecialistOutput::new(Capability::Research, "findings")],
            grounding: None,
            conversation: Vec::new(),
        };
        let output = specialist.invoke(&context).await.unwrap();
        assert_eq!(output.role_tag, Capability::SwotEvaluation);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, Some(0.3));
        assert!(seen[0].user_prompt.contains("RESEARCH_FINDINGS:\nfindings"));
    }
}
