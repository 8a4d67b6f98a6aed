//! Typed ID wrappers for sessions, traces, steps, tool calls, and messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up a session ID with a trace ID, etc.
/// These are plain strings underneath — no UUID enforcement, no format
/// requirement. The orchestrator doesn't care what your IDs look like;
/// the persistence collaborator (`helm-state`) assigns them.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(SessionId, "Unique identifier for a chat session.");
typed_id!(TraceId, "Unique identifier for a reasoning trace (one per turn).");
typed_id!(StepId, "Unique identifier for a single reasoning step.");
typed_id!(ToolCallId, "Unique identifier for a tool-call request, as assigned by the model.");
typed_id!(MessageId, "Unique identifier for a persisted message.");
