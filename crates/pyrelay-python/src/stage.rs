use std::fmt;

/// Initialization state of one bridge stage
///
/// `Failed` keeps the reason of the last attempt. Any state other than
/// `Ready` makes the next `ensure_ready` start over from scratch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
    Stopped,
}

impl Stage {
    pub fn is_ready(&self) -> bool {
        matches!(self, Stage::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Uninitialized => write!(f, "uninitialized"),
            Stage::Initializing => write!(f, "initializing"),
            Stage::Ready => write!(f, "ready"),
            Stage::Failed(reason) => write!(f, "failed: {}", reason),
            Stage::Stopped => write!(f, "stopped"),
        }
    }
}
