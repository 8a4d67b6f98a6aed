//! # helm-research — Research Graph Nodes
//!
//! The concrete `spec.md` §4.8 research workflow (Intent Parsing → Paper
//! Discovery → Discovery Validation → Recall Recovery/Halt → Summarize →
//! Compare → Synthesize → Final Writer), built atop [`helm_graph`]. This
//! crate owns no generic graph machinery — that lives in `helm-graph` — only
//! the node bodies, state shape, and the wiring that assembles them into one
//! [`helm_graph::ScenarioGraph`].

#![deny(missing_docs)]

pub mod intent;
pub mod nodes;
pub mod query;
pub mod search;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use helm_graph::{ConditionalEdge, EdgeTarget, GraphEventSink, NullGraphEventSink, ScenarioGraph, ScenarioGraphBuilder};
use helm_types::provider::Provider;

use crate::nodes::{
    discovery_validation_route, ids, CompareNode, FinalWriterNode, HaltNode, IntentParsingNode, PaperDiscoveryNode,
    RecallRecoveryNode, SummarizeNode, SynthesizeNode,
};
use crate::search::PaperSearch;
use crate::state::ResearchState;

/// Assemble the full research [`ScenarioGraph`] over `provider` (used by
/// Intent Parsing and, in a fuller build, per-paper summarization) and
/// `search` (used by Paper Discovery and Recall Recovery).
///
/// Routing, per `spec.md` §4.8's Discovery Validation framing: from both
/// Paper Discovery and Recall Recovery, `paper_count() >= 3` routes to
/// Summarize; `!recall_exhausted` routes (back) to Recall Recovery; otherwise
/// routes to Halt. Halt and Final Writer both terminate the walk.
pub fn build_research_graph<P, S>(provider: Arc<P>, search: Arc<S>) -> ScenarioGraph<ResearchState>
where
    P: Provider + 'static,
    S: PaperSearch + 'static,
{
    build_research_graph_with_sink(provider, search, Arc::new(NullGraphEventSink))
}

/// As [`build_research_graph`], observing `agent.start`/`agent.node`/
/// `agent.error` events through `event_sink` as the walk proceeds.
pub fn build_research_graph_with_sink<P, S>(
    provider: Arc<P>,
    search: Arc<S>,
    event_sink: Arc<dyn GraphEventSink>,
) -> ScenarioGraph<ResearchState>
where
    P: Provider + 'static,
    S: PaperSearch + 'static,
{
    let mut discovery_routes = HashMap::new();
    discovery_routes.insert("continue".to_string(), EdgeTarget::Node(ids::SUMMARIZE.to_string()));
    discovery_routes.insert("recover".to_string(), EdgeTarget::Node(ids::RECALL_RECOVERY.to_string()));
    discovery_routes.insert("halt".to_string(), EdgeTarget::Node(ids::HALT.to_string()));

    let mut recovery_routes = HashMap::new();
    recovery_routes.insert("continue".to_string(), EdgeTarget::Node(ids::SUMMARIZE.to_string()));
    recovery_routes.insert("recover".to_string(), EdgeTarget::Node(ids::RECALL_RECOVERY.to_string()));
    recovery_routes.insert("halt".to_string(), EdgeTarget::Node(ids::HALT.to_string()));

    ScenarioGraphBuilder::<ResearchState>::new(ids::INTENT_PARSING)
        .node(Arc::new(IntentParsingNode::new(Arc::clone(&provider))))
        .node(Arc::new(PaperDiscoveryNode::new(Arc::clone(&search))))
        .node(Arc::new(RecallRecoveryNode::new(Arc::clone(&search))))
        .node(Arc::new(HaltNode))
        .node(Arc::new(SummarizeNode::new(Arc::clone(&provider))))
        .node(Arc::new(CompareNode))
        .node(Arc::new(SynthesizeNode))
        .node(Arc::new(FinalWriterNode))
        .edge(ids::INTENT_PARSING, EdgeTarget::Node(ids::PAPER_DISCOVERY.to_string()))
        .conditional_edge(ConditionalEdge::new(ids::PAPER_DISCOVERY, discovery_validation_route, discovery_routes))
        .conditional_edge(ConditionalEdge::new(ids::RECALL_RECOVERY, discovery_validation_route, recovery_routes))
        .edge(ids::HALT, EdgeTarget::End)
        .edge(ids::SUMMARIZE, EdgeTarget::Node(ids::COMPARE.to_string()))
        .edge(ids::COMPARE, EdgeTarget::Node(ids::SYNTHESIZE.to_string()))
        .edge(ids::SYNTHESIZE, EdgeTarget::Node(ids::FINAL_WRITER.to_string()))
        .edge(ids::FINAL_WRITER, EdgeTarget::End)
        .event_sink(event_sink)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use helm_graph::{GraphContext, GraphStatus};
    use helm_proto::{SessionId, TraceId};
    use helm_provider_mock::MockProvider;
    use crate::state::{Paper, RecallStrategy};

    struct ScriptedSearch {
        /// Maps a query (lowercased) to the papers it returns; anything not
        /// listed returns no results, matching `spec.md` §4.8's "zero
        /// results is ordinary, not a failure."
        table: std::collections::HashMap<String, Vec<Paper>>,
    }

    #[async_trait]
    impl PaperSearch for ScriptedSearch {
        async fn search(&self, query: &str) -> Result<Vec<Paper>, String> {
            Ok(self.table.get(&query.to_lowercase()).cloned().unwrap_or_default())
        }

        fn source_name(&self) -> &str {
            "scripted"
        }
    }

    fn paper(id: &str, title: &str) -> Paper {
        Paper { id: id.to_string(), title: title.to_string(), source: "scripted".to_string(), summary: None }
    }

    fn ctx() -> GraphContext {
        GraphContext::new(SessionId::new("sess_research"), TraceId::new("trace_research"))
    }

    #[tokio::test]
    async fn evidence_gap_report_on_total_recall_exhaustion() {
        // Scenario 5: every attempt returns nothing; the walk must halt
        // with `status: completed` and a well-formed report.
        let provider = Arc::new(MockProvider::always_text("{\"intent\":\"research\",\"confidence\":0.9}"));
        let search = Arc::new(ScriptedSearch { table: std::collections::HashMap::new() });
        let graph = build_research_graph(provider, search);

        let outcome = graph.execute(ResearchState::new("xyzzy_no_such_topic"), &ctx()).await.unwrap();

        assert_eq!(outcome.status, GraphStatus::Completed);
        let report = outcome.final_state.final_output.expect("halt node always sets final_output");
        assert!(report.starts_with("# Research Process & Evidence Gap Report"));
        assert!(report.contains("## Queries Attempted"));
        assert!(report.contains("## Recommendations"));
        assert_eq!(outcome.final_state.attempts.len(), nodes::MAX_RECALL_ATTEMPTS as usize);
        assert!(outcome.final_state.recall_exhausted);
        assert!(
            outcome.final_state.attempts.iter().any(|a| a.strategy == RecallStrategy::AcademicSkillDirect),
            "recall recovery must eventually try a direct, unreformulated pass"
        );
    }

    #[tokio::test]
    async fn successful_walk_produces_claims_citing_only_valid_papers() {
        // Every reformulation of "diffusion models" resolves to the same
        // three papers so Discovery Validation's >=3 threshold is met on
        // the very first attempt.
        let papers = vec![
            paper("p1", "Denoising Diffusion Probabilistic Models"),
            paper("p2", "Score-Based Generative Modeling"),
            paper("p3", "Latent Diffusion Models"),
        ];
        let mut table = std::collections::HashMap::new();
        for q in ["diffusion models", "models", "diffusion"] {
            table.insert(q.to_string(), papers.clone());
        }
        let provider = Arc::new(MockProvider::always_text("{\"intent\":\"research\",\"confidence\":0.9}"));
        let search = Arc::new(ScriptedSearch { table });
        let graph = build_research_graph(provider, search);

        let outcome = graph.execute(ResearchState::new("diffusion models"), &ctx()).await.unwrap();

        assert_eq!(outcome.status, GraphStatus::Completed);
        let state = &outcome.final_state;
        assert!(state.paper_count() >= 3);
        assert!(!state.synthesis_claims.is_empty());
        let valid: std::collections::HashSet<&str> = state.papers.iter().map(|p| p.id.as_str()).collect();
        for claim in &state.synthesis_claims {
            assert!(!claim.supporting_paper_ids.is_empty());
            assert!(claim.supporting_paper_ids.iter().all(|id| valid.contains(id.as_str())));
        }
        let report = state.final_output.as_ref().expect("final writer sets final_output");
        assert!(report.starts_with("# Research Findings"));
    }

    #[tokio::test]
    async fn discovery_validation_routes_by_paper_count_and_exhaustion() {
        assert_eq!(discovery_validation_route(&ResearchState { papers: vec![paper("a", "A"), paper("b", "B"), paper("c", "C")], ..Default::default() }), "continue");
        assert_eq!(discovery_validation_route(&ResearchState { recall_exhausted: false, ..Default::default() }), "recover");
        assert_eq!(discovery_validation_route(&ResearchState { recall_exhausted: true, ..Default::default() }), "halt");
    }
}
