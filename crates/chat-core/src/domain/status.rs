//! Session lifecycle states.
//!
//! ```text
//!   Idle ──► Connecting ──► Subscribing ──► Active
//!    ▲           │               │            │
//!    │           └───────┬───────┴────────────┤
//!    │                   ▼                    ▼
//!    ├──────────────── Closing            Failed
//!    └────────────────────────────────────────┘
//! ```
//!
//! The lifecycle only moves forward.  A dropped connection never takes an
//! `Active` session back to `Connecting`; the caller joins again, which builds
//! a fresh session.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Subscribing,
    Active,
    Closing,
    Failed,
}

impl SessionStatus {
    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Subscribing)
                | (Subscribing, Active)
                | (Connecting | Subscribing | Active, Closing)
                | (Closing, Idle)
                | (Connecting | Subscribing | Active, Failed)
                | (Failed, Idle)
        )
    }

    /// `Connecting`, `Subscribing` and `Active` own a live connection.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Subscribing | SessionStatus::Active
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Subscribing => "subscribing",
            SessionStatus::Active => "active",
            SessionStatus::Closing => "closing",
            SessionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    #[test]
    fn test_happy_path_is_allowed() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Subscribing));
        assert!(Subscribing.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Idle));
    }

    #[test]
    fn test_active_never_returns_to_connecting() {
        assert!(!Active.can_transition_to(Connecting));
        assert!(!Active.can_transition_to(Subscribing));
        assert!(!Failed.can_transition_to(Connecting));
    }

    #[test]
    fn test_failure_and_cleanup_edges() {
        assert!(Connecting.can_transition_to(Failed));
        assert!(Active.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Failed));
    }

    #[test]
    fn test_is_live() {
        assert!(Subscribing.is_live());
        assert!(!Failed.is_live());
        assert!(!Idle.is_live());
    }
}
