//! The single state type threaded through a research walk
//! (`helm_graph::ScenarioGraph<ResearchState>`).

use serde::{Deserialize, Serialize};

/// What the user's request was classified as, per `spec.md` §4.8's
/// Intent Parsing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// A literature-survey style research request.
    Research,
    /// A request to turn findings into slides.
    Ppt,
    /// A request to summarize, not synthesize.
    Summary,
    /// Not a research task at all.
    GeneralChat,
}

/// One discovered paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Stable identifier the synthesis step cites by.
    pub id: String,
    /// Title as returned by the search source.
    pub title: String,
    /// Source the paper was found through (e.g. `"arxiv"`, `"semantic_scholar"`).
    pub source: String,
    /// Short abstract or snippet, if the source provided one.
    pub summary: Option<String>,
}

/// The reformulation strategy a recall attempt used, per `spec.md` §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallStrategy {
    /// The user's query, unmodified.
    Original,
    /// Adjective-stripped or clause-split simplification.
    Simplified,
    /// A clause extracted from the original query and searched alone.
    SubQuery,
    /// Stopword-core or domain-alias broadened query.
    Broadened,
    /// A direct pass-through search with no reformulation, used once the
    /// attempt budget is nearly exhausted.
    AcademicSkillDirect,
}

/// One recorded paper-discovery search attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallAttempt {
    /// 1-based position in the attempt sequence.
    pub attempt_number: u32,
    /// The query text actually sent.
    pub query: String,
    /// Sources queried for this attempt.
    pub sources: Vec<String>,
    /// How many (possibly duplicate, pre-dedup) results came back.
    pub results_found: usize,
    /// Which reformulation strategy produced `query`.
    pub strategy: RecallStrategy,
    /// Emission time.
    pub timestamp_ms: i64,
}

/// The state folded through every research graph node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchState {
    /// The user's original request text.
    pub query: String,
    /// Set by Intent Parsing.
    pub intent: Option<Intent>,
    /// Confidence attached to `intent`, `0.5` on a model parse failure per
    /// `spec.md` §4.8.
    pub intent_confidence: f64,
    /// Every discovery/recovery attempt made so far, in order.
    pub attempts: Vec<RecallAttempt>,
    /// Distinct papers found across all attempts, deduped by id.
    pub papers: Vec<Paper>,
    /// Set once `attempts.len() == MAX_RECALL_ATTEMPTS` with no further
    /// budget to spend.
    pub recall_exhausted: bool,
    /// Per-paper summaries, set by the Summarize node.
    pub summaries: Vec<(String, String)>,
    /// Cross-paper comparison text, set by the Compare node.
    pub comparison: Option<String>,
    /// Synthesized claims, each citing at least one paper id. Fatal
    /// postcondition on the Synthesize node if any claim cites outside
    /// `papers`.
    pub synthesis_claims: Vec<SynthesisClaim>,
    /// The Final Writer's rendered output, or the Halt node's Evidence Gap
    /// Report markdown.
    pub final_output: Option<String>,
}

/// One synthesized claim and the paper ids it cites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisClaim {
    /// The claim text.
    pub text: String,
    /// Paper ids supporting this claim. Non-empty and a subset of
    /// `ResearchState::papers`' ids, enforced by the Synthesize node's
    /// postcondition (`spec.md` §8 P8).
    pub supporting_paper_ids: Vec<String>,
}

impl ResearchState {
    /// Start a walk for `query`.
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    /// Distinct paper count found so far, the Discovery Validation node's
    /// routing input.
    pub fn paper_count(&self) -> usize {
        self.papers.len()
    }
}
