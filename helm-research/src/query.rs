//! Query reformulation strategies for Paper Discovery (`spec.md` §4.8).

use crate::state::RecallStrategy;

const CONNECTORS: &[&str] = &["and", "or", "for", "in", "with", "using", "about"];
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "on", "is", "are", "be", "this", "that", "these", "those", "how", "what", "why",
];
const ADJECTIVES: &[&str] = &[
    "novel", "new", "recent", "efficient", "robust", "scalable", "comprehensive", "advanced", "state-of-the-art",
];

/// Domain alias substitutions applied during broadening — narrow jargon
/// swapped for the more commonly indexed umbrella term.
const DOMAIN_ALIASES: &[(&str, &str)] = &[
    ("llm", "large language model"),
    ("llms", "large language models"),
    ("rl", "reinforcement learning"),
    ("cv", "computer vision"),
    ("nlp", "natural language processing"),
];

fn words(query: &str) -> Vec<&str> {
    query.split_whitespace().collect()
}

/// Strip adjectives from `query` (e.g. "novel efficient transformer" →
/// "transformer").
pub fn strip_adjectives(query: &str) -> String {
    words(query)
        .into_iter()
        .filter(|w| !ADJECTIVES.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `query` on connector words, returning each clause as its own
/// sub-query candidate.
pub fn split_clauses(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut clauses = vec![lower.clone()];
    for connector in CONNECTORS {
        clauses = clauses
            .into_iter()
            .flat_map(|clause| {
                clause
                    .split(&format!(" {connector} "))
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    clauses.into_iter().filter(|c| !c.is_empty() && c != &query.to_lowercase()).collect()
}

/// Reduce `query` to its stopword-free content words — the broadest,
/// most recall-permissive reformulation.
pub fn stopword_core(query: &str) -> String {
    words(query)
        .into_iter()
        .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substitute recognized domain jargon for its broader alias.
pub fn domain_alias_substitution(query: &str) -> String {
    words(query)
        .into_iter()
        .map(|w| {
            let lower = w.to_lowercase();
            DOMAIN_ALIASES.iter().find(|(term, _)| *term == lower).map(|(_, alias)| alias.to_string()).unwrap_or_else(|| w.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the ordered, deduped reformulation queue for one paper-discovery
/// run: the original query, then adjective-stripped and clause-split
/// simplifications, then stopword-core and domain-alias broadenings. Each
/// candidate carries the [`RecallStrategy`] that produced it, so a caller
/// with a fixed attempt budget can always tell which reformulation a
/// given attempt used — unlike zipping the queue against a fixed-length
/// strategy list, this survives a query that yields more (or fewer)
/// candidates than any one reformulation stage expects, e.g. a
/// multi-clause query under [`split_clauses`]. Entries are deduped
/// case-insensitively, preserving first occurrence.
pub fn reformulation_queue(original: &str) -> Vec<(String, RecallStrategy)> {
    let mut candidates = vec![(original.to_string(), RecallStrategy::Original)];
    candidates.push((strip_adjectives(original), RecallStrategy::Simplified));
    candidates.extend(split_clauses(original).into_iter().map(|clause| (clause, RecallStrategy::SubQuery)));
    candidates.push((stopword_core(original), RecallStrategy::Broadened));
    candidates.push((domain_alias_substitution(original), RecallStrategy::Broadened));

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|(q, _)| !q.trim().is_empty())
        .filter(|(q, _)| seen.insert(q.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_adjectives_removes_known_modifiers() {
        assert_eq!(strip_adjectives("novel efficient transformer architectures"), "transformer architectures");
    }

    #[test]
    fn split_clauses_breaks_on_connectors() {
        let clauses = split_clauses("transformers for vision and robotics");
        assert!(clauses.contains(&"transformers".to_string()));
        assert!(clauses.contains(&"vision".to_string()));
        assert!(clauses.contains(&"robotics".to_string()));
    }

    #[test]
    fn reformulation_queue_dedupes_case_insensitively() {
        let queue = reformulation_queue("LLM reasoning");
        let lowered: Vec<String> = queue.iter().map(|(q, _)| q.to_lowercase()).collect();
        let mut deduped = lowered.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(lowered.len(), deduped.len());
    }

    #[test]
    fn reformulation_queue_tags_each_candidate_by_how_it_was_produced() {
        // Two connectors means split_clauses alone yields 3 candidates
        // (see split_clauses_breaks_on_connectors); combined with a
        // stripped adjective and a removed stopword, this query produces
        // 6 distinct candidates — more than a fixed 5-slot strategy list
        // would have room for.
        let query = "the novel transformers for vision and robotics";
        let queue = reformulation_queue(query);
        assert!(queue.len() > 5, "expected more than 5 candidates, got {}", queue.len());
        assert_eq!(queue[0], (query.to_string(), RecallStrategy::Original));
        let sub_query_count = queue.iter().filter(|(_, s)| *s == RecallStrategy::SubQuery).count();
        assert_eq!(sub_query_count, 3, "every split_clauses candidate must keep its SubQuery tag, none dropped");
    }
}
