use crate::plan::{ExecutionPlan, Intent};
use kognia_core::{Capability, KogniaError, KogniaResult, Message, Report, Role};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// A keyword pattern that votes for an intent.
///
/// An intent's confidence is the highest weight among its matching rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRule {
    /// Intent the rule votes for.
    pub intent: Intent,
    /// Case-insensitive regular expression.
    pub pattern: String,
    /// Confidence contributed on match, in `0.0..=1.0`.
    pub weight: f32,
}

impl IntentRule {
    fn new(intent: Intent, pattern: &str, weight: f32) -> Self {
        Self {
            intent,
            pattern: pattern.to_string(),
            weight,
        }
    }
}

/// How the router picks among intents that cleared `min_confidence`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    /// First qualifying intent in precedence order.
    #[default]
    Precedence,
    /// Highest confidence; precedence only breaks exact ties.
    Score,
}

/// Router settings, read from the `[router]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum confidence an intent needs to be considered.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Replaces the built-in rules when non-empty.
    #[serde(default)]
    pub rules: Vec<IntentRule>,
    /// Intent order used for ranking. Intents left out keep their default
    /// relative order after the listed ones.
    #[serde(default)]
    pub precedence: Vec<Intent>,
    /// Ranking mode.
    #[serde(default)]
    pub rank_by: RankBy,
    /// Append an executive briefing to every full analysis.
    #[serde(default)]
    pub include_briefing: bool,
}

fn default_min_confidence() -> f32 {
    0.5
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            rules: Vec::new(),
            precedence: Vec::new(),
            rank_by: RankBy::default(),
            include_briefing: false,
        }
    }
}

/// Built-in ranking order.
///
/// Simulation comes first because no other plan produces dialogue turns. The
/// remaining intents are ordered by dependency chain length, longest first,
/// so a full analysis absorbs a summary request (with a briefing appended).
pub fn default_precedence() -> Vec<Intent> {
    let mut order = Intent::ALL.to_vec();
    order.sort_by_key(|i| (*i != Intent::Simulation, std::cmp::Reverse(i.chain_len())));
    order
}

/// Built-in classification rules.
pub fn default_rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new(Intent::FullAnalysis, r"\bswot\b", 0.7),
        IntentRule::new(
            Intent::FullAnalysis,
            r"\b(full|complete|comprehensive|in-depth|deep[- ]dive|detailed|strategic)\b",
            0.6,
        ),
        IntentRule::new(
            Intent::FullAnalysis,
            r"\b(analy[sz]\w*|research\w*|evaluat\w*|assess\w*|investigat\w*)\b",
            0.5,
        ),
        IntentRule::new(Intent::FullAnalysis, r"\breport (on|about|for)\b", 0.5),
        IntentRule::new(
            Intent::FullAnalysis,
            r"\b(competitors?|competition|market|brand|positioning|industry)\b",
            0.4,
        ),
        IntentRule::new(
            Intent::SummaryOnly,
            r"\b(summar\w*|recap|tl;?dr|condense|digest|key takeaways)\b",
            0.9,
        ),
        IntentRule::new(
            Intent::SummaryOnly,
            r"\b(brief(ing)?|executive summary|highlights|in short)\b",
            0.7,
        ),
        IntentRule::new(
            Intent::SummaryOnly,
            r"\b(last|previous|prior|latest) (report|analysis)\b",
            0.3,
        ),
        IntentRule::new(
            Intent::Simulation,
            r"\b(simulat\w*|role[- ]?play\w*|focus group|personas?)\b",
            0.9,
        ),
        IntentRule::new(
            Intent::Simulation,
            r"\b((mock|simulated|imagined|hypothetical) (dialogue|conversation|debate|interview)|panel discussion)\b",
            0.6,
        ),
    ]
}

/// What the router knows about the session when it classifies a prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingContext<'a> {
    /// Most recent session messages, oldest first.
    pub recent_messages: &'a [Message],
    /// Report the prompt refers to, or else the newest one of the session.
    pub prior_report: Option<&'a Report>,
}

impl RoutingContext<'_> {
    /// Whether a summary or simulation has anything to stand on.
    pub fn has_grounding(&self) -> bool {
        self.prior_report.is_some() || self.recent_messages.iter().any(|m| m.role == Role::Agent)
    }
}

/// The router's verdict for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Winning intent.
    pub intent: Intent,
    /// Its confidence.
    pub confidence: f32,
    /// Confidence of every intent that cleared the threshold.
    pub candidates: Vec<(Intent, f32)>,
}

struct CompiledRule {
    intent: Intent,
    regex: Regex,
    weight: f32,
}

/// Rule-based delegation router.
///
/// Classifies a prompt into one of the fixed intents and expands it into the
/// canonical execution plan for that intent.
pub struct DelegationRouter {
    rules: Vec<CompiledRule>,
    min_confidence: f32,
    precedence: Vec<Intent>,
    rank_by: RankBy,
    include_briefing: bool,
    job_ref: Regex,
}

impl DelegationRouter {
    /// Compile the configured (or built-in) rules.
    pub fn new(config: &RouterConfig) -> KogniaResult<Self> {
        let source = if config.rules.is_empty() {
            default_rules()
        } else {
            config.rules.clone()
        };
        let rules = source
            .into_iter()
            .map(|rule| {
                let regex = Regex::new(&format!("(?i){}", rule.pattern)).map_err(|e| {
                    KogniaError::Config(format!("Invalid router pattern '{}': {e}", rule.pattern))
                })?;
                Ok(CompiledRule {
                    intent: rule.intent,
                    regex,
                    weight: rule.weight.clamp(0.0, 1.0),
                })
            })
            .collect::<KogniaResult<Vec<_>>>()?;

        let mut precedence = config.precedence.clone();
        for intent in default_precedence() {
            if !precedence.contains(&intent) {
                precedence.push(intent);
            }
        }
        let job_ref = Regex::new(r"(?i)\bjob:([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\b")
            .map_err(|e| KogniaError::Config(format!("Invalid job reference pattern: {e}")))?;

        Ok(Self {
            rules,
            min_confidence: config.min_confidence,
            precedence,
            rank_by: config.rank_by,
            include_briefing: config.include_briefing,
            job_ref,
        })
    }

    /// The job named by a `job:<uuid>` token in the prompt, if any.
    pub fn referenced_job(&self, prompt: &str) -> Option<Uuid> {
        let caps = self.job_ref.captures(prompt)?;
        Uuid::parse_str(caps.get(1)?.as_str()).ok()
    }

    /// Confidence per intent: the highest weight among matching rules.
    pub fn scores(&self, prompt: &str) -> Vec<(Intent, f32)> {
        self.precedence
            .iter()
            .map(|&intent| {
                let score = self
                    .rules
                    .iter()
                    .filter(|r| r.intent == intent && r.regex.is_match(prompt))
                    .map(|r| r.weight)
                    .fold(0.0_f32, f32::max);
                (intent, score)
            })
            .collect()
    }

    /// Classify a prompt, ignoring intents the session cannot ground.
    pub fn classify(&self, prompt: &str, ctx: &RoutingContext<'_>) -> KogniaResult<Classification> {
        let candidates: Vec<(Intent, f32)> = self
            .scores(prompt)
            .into_iter()
            .filter(|&(_, score)| score > 0.0 && score >= self.min_confidence)
            .collect();
        if candidates.is_empty() {
            return Err(KogniaError::UnroutablePrompt(
                "no intent matched with sufficient confidence".to_string(),
            ));
        }

        let grounded = ctx.has_grounding();
        // Candidates are in precedence order.
        let mut eligible = candidates
            .iter()
            .copied()
            .filter(|(intent, _)| grounded || !intent.needs_grounding());
        let winner = match self.rank_by {
            RankBy::Precedence => eligible.next(),
            RankBy::Score => eligible.fold(None::<(Intent, f32)>, |best, (intent, score)| {
                match best {
                    Some((_, best_score)) if best_score >= score => best,
                    _ => Some((intent, score)),
                }
            }),
        };

        match winner {
            Some((intent, confidence)) => Ok(Classification {
                intent,
                confidence,
                candidates,
            }),
            None => Err(KogniaError::UnroutablePrompt(
                "request needs a prior report but the session has none".to_string(),
            )),
        }
    }

    /// Classify a prompt and build its execution plan.
    pub fn route(&self, prompt: &str, ctx: &RoutingContext<'_>) -> KogniaResult<ExecutionPlan> {
        let classification = self.classify(prompt, ctx)?;
        let wants_summary = classification
            .candidates
            .iter()
            .any(|(intent, _)| *intent == Intent::SummaryOnly);

        let plan = match classification.intent {
            Intent::FullAnalysis => {
                let mut chain = vec![
                    Capability::Research,
                    Capability::SwotEvaluation,
                    Capability::ReportSynthesis,
                ];
                if self.include_briefing || wants_summary {
                    chain.push(Capability::ExecutiveBriefing);
                }
                ExecutionPlan::chain(Intent::FullAnalysis, &chain)
            }
            Intent::SummaryOnly => {
                ExecutionPlan::chain(Intent::SummaryOnly, &[Capability::ExecutiveBriefing])
            }
            Intent::Simulation => {
                ExecutionPlan::chain(Intent::Simulation, &[Capability::ConversationSimulation])
            }
        };
        plan.validate()?;

        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            nodes = plan.len(),
            "Prompt routed"
        );
        Ok(plan)
    }
}
