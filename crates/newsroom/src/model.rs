//! Shared domain enums persisted as lowercase text columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declares a text-backed enum with `as_str`, `Display` and `FromStr`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// A text value that does not name any variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl From<UnknownVariant> for crate::db::DatabaseError {
    fn from(e: UnknownVariant) -> Self {
        crate::db::DatabaseError::UnknownValue {
            kind: e.kind,
            value: e.value,
        }
    }
}

text_enum! {
    /// Operation a pipeline run performs.
    RunType, "run type" {
        CategoryRefresh => "category_refresh",
        KeywordSearch => "keyword_search",
        FullRefresh => "full_refresh",
        ReanalyzeCategory => "reanalyze_category",
    }
}

text_enum! {
    /// Lifecycle state of a pipeline run.
    ///
    /// `analyzing` is entered when the first unit of work reaches analysis
    /// and is kept until the run finishes, even while later categories are
    /// fetching. The live phase of a run is its progress stage.
    RunState, "run status" {
        Pending => "pending",
        Running => "running",
        Analyzing => "analyzing",
        Complete => "complete",
        Failed => "failed",
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed)
    }

    /// Whether a run in `self` may move to `next`.
    ///
    /// Staying in the same non-terminal state is allowed so that
    /// multi-category runs can re-enter `analyzing` per category.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (a, b) if *a == b => !a.is_terminal(),
            (Pending, Running) | (Pending, Failed) => true,
            (Running, Analyzing) | (Running, Complete) | (Running, Failed) => true,
            (Analyzing, Complete) | (Analyzing, Failed) => true,
            _ => false,
        }
    }
}

text_enum! {
    /// Who or what triggered a run.
    TriggerSource, "trigger source" {
        Manual => "manual",
        Scheduled => "scheduled",
        Api => "api",
        Cli => "cli",
    }
}

text_enum! {
    /// Quota state of one category within one run.
    CategoryState, "category status" {
        Pending => "pending",
        Fetching => "fetching",
        Complete => "complete",
        Exhausted => "exhausted",
    }
}

text_enum! {
    /// State of one article's analysis job.
    JobState, "job status" {
        Pending => "pending",
        Running => "running",
        Done => "done",
        Failed => "failed",
    }
}

text_enum! {
    /// Political viewpoint bucket.
    Lean, "lean" {
        Left => "left",
        Center => "center",
        Right => "right",
    }
}
