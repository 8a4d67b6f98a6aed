//! Goal inference: a pure function over the user's prompt.

use serde::{Deserialize, Serialize};

/// What a turn is trying to accomplish, inferred once at task
/// initialization from the user's prompt text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGoal {
    /// Short human-readable description of the inferred goal.
    pub description: String,
    /// The prompt calls for external information retrieval.
    pub requires_search: bool,
    /// The prompt asks for a slide deck / presentation artifact.
    pub requires_ppt: bool,
    /// The prompt references a video that needs to be probed for
    /// metadata (duration, format) before further processing.
    pub requires_video_probe: bool,
    /// The prompt requires the video's bytes to be fetched locally.
    pub requires_video_download: bool,
    /// The prompt requires a transcript extracted from video/audio.
    pub requires_transcript: bool,
    /// The video URL mentioned in the prompt, if one was found.
    pub video_url: Option<String>,
}

impl TaskGoal {
    /// A turn is "video-heavy" if it touches video processing in any way.
    /// `helm-turn`'s dynamic timeout budget keys off this (`spec.md` §4.5).
    pub fn is_video_heavy(&self) -> bool {
        self.requires_video_probe || self.requires_video_download || self.requires_transcript
    }
}

const VIDEO_URL_MARKERS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", ".mp4", ".mov", ".webm"];

/// Infer a [`TaskGoal`] from the user's raw prompt text.
///
/// Keyword-heuristic, not model-backed — matches `spec.md` §4.3's
/// "pure function over the prompt using keyword heuristics."
pub fn infer_goal(user_prompt: &str) -> TaskGoal {
    let lower = user_prompt.to_lowercase();

    let requires_search = ["search", "find", "look up", "latest", "current", "news", "research"]
        .iter()
        .any(|kw| lower.contains(kw));

    let requires_ppt = ["powerpoint", "ppt", "slide deck", "slides", "presentation"]
        .iter()
        .any(|kw| lower.contains(kw));

    let video_url = user_prompt
        .split_whitespace()
        .find(|tok| VIDEO_URL_MARKERS.iter().any(|m| tok.contains(m)))
        .map(|s| s.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '.' && c != ':').to_string());

    let mentions_video = video_url.is_some() || lower.contains("video");
    let requires_transcript =
        mentions_video && ["transcript", "subtitle", "caption", "what do they say", "what is said"]
            .iter()
            .any(|kw| lower.contains(kw));
    let requires_video_probe = mentions_video
        && (requires_transcript || lower.contains("how long") || lower.contains("duration"));
    let requires_video_download =
        mentions_video && (lower.contains("download") || lower.contains("save the video"));

    let description = if requires_transcript {
        "Extract and answer from a video transcript".to_string()
    } else if requires_ppt {
        "Produce a presentation artifact".to_string()
    } else if requires_search {
        "Answer using current information via search".to_string()
    } else {
        "Answer directly from the conversation".to_string()
    };

    TaskGoal {
        description,
        requires_search,
        requires_ppt,
        requires_video_probe,
        requires_video_download,
        requires_transcript,
        video_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_question_requires_nothing() {
        let goal = infer_goal("What is the capital of France?");
        assert!(!goal.requires_search);
        assert!(!goal.is_video_heavy());
    }

    #[test]
    fn search_keyword_sets_requires_search() {
        let goal = infer_goal("Search for the latest Rust release notes");
        assert!(goal.requires_search);
    }

    #[test]
    fn video_transcript_prompt_is_video_heavy() {
        let goal = infer_goal("What's the transcript of https://youtu.be/abc123 ?");
        assert!(goal.requires_transcript);
        assert!(goal.requires_video_probe);
        assert!(goal.is_video_heavy());
        assert_eq!(goal.video_url.as_deref(), Some("https://youtu.be/abc123"));
    }

    #[test]
    fn ppt_keyword_sets_requires_ppt() {
        let goal = infer_goal("Build me a slide deck about Rust async");
        assert!(goal.requires_ppt);
    }
}
