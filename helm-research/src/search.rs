//! The paper-search collaborator seam Paper Discovery runs queries
//! through. Kept abstract so the graph doesn't depend on any particular
//! literature index.

use async_trait::async_trait;

use crate::state::Paper;

/// A source of papers for a single query string.
#[async_trait]
pub trait PaperSearch: Send + Sync {
    /// Run `query` and return whatever papers the source found. An empty
    /// `Ok` result (not an error) is how a source reports "nothing
    /// matched" — `spec.md` §4.8's recall-permissive discovery treats a
    /// zero-result attempt as ordinary, not a failure.
    async fn search(&self, query: &str) -> Result<Vec<Paper>, String>;

    /// The source name recorded on each [`crate::state::RecallAttempt`].
    fn source_name(&self) -> &str;
}
