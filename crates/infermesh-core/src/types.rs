use serde::{Deserialize, Serialize};

/// Identifies a network. Keys all chain-scoped state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key for per-session state: session ids are monotonic
/// per chain, so the pair is globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chain_id: ChainId,
    pub session_id: u64,
}

impl SessionKey {
    pub fn new(chain_id: ChainId, session_id: u64) -> Self {
        Self { chain_id, session_id }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.session_id)
    }
}

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single conversation message.
///
/// `index` is strictly increasing within a session. Streaming assistant
/// output is emitted as fragments sharing an index until the terminal
/// fragment arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub index: u64,
    pub role: Role,
    pub content: String,
    /// Unix milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

impl Message {
    pub fn new(index: u64, role: Role, content: impl Into<String>, created_at: u64) -> Self {
        Self { index, role, content: content.into(), created_at }
    }
}

/// Session lifecycle states.
///
/// `Completed` and `Failed` are terminal. Transitions outside
/// [`SessionStatus::can_transition`] are state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Negotiating,
    Posted,
    Claimed,
    Active,
    Paused,
    Draining,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Any non-terminal state may fail; `Active -> Active` is the
    /// streaming self-loop.
    pub fn can_transition(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Negotiating, Posted)
                | (Posted, Claimed)
                | (Claimed, Active)
                | (Active, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Draining)
                | (Draining, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// States in which the engine accepts prompt submission.
    pub fn accepts_prompts(self) -> bool {
        self == SessionStatus::Active
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Negotiating => "negotiating",
            SessionStatus::Posted => "posted",
            SessionStatus::Claimed => "claimed",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Draining => "draining",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use SessionStatus::*;
        assert!(Negotiating.can_transition(Posted));
        assert!(Posted.can_transition(Claimed));
        assert!(Claimed.can_transition(Active));
        assert!(Active.can_transition(Active));
        assert!(Active.can_transition(Paused));
        assert!(Paused.can_transition(Active));
        assert!(Active.can_transition(Draining));
        assert!(Draining.can_transition(Completed));
    }

    #[test]
    fn test_any_state_may_fail() {
        use SessionStatus::*;
        for s in [Negotiating, Posted, Claimed, Active, Paused, Draining] {
            assert!(s.can_transition(Failed), "{s} must be allowed to fail");
        }
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        use SessionStatus::*;
        for next in [Negotiating, Posted, Claimed, Active, Paused, Draining, Completed, Failed] {
            assert!(!Completed.can_transition(next));
            assert!(!Failed.can_transition(next));
        }
    }

    #[test]
    fn test_failed_cannot_complete() {
        assert!(!SessionStatus::Failed.can_transition(SessionStatus::Completed));
    }

    #[test]
    fn test_skipping_states_rejected() {
        use SessionStatus::*;
        assert!(!Negotiating.can_transition(Active));
        assert!(!Posted.can_transition(Active));
        assert!(!Active.can_transition(Completed));
        assert!(!Paused.can_transition(Draining));
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Negotiating).unwrap();
        assert_eq!(json, r#""negotiating""#);
        let back: SessionStatus = serde_json::from_str(r#""draining""#).unwrap();
        assert_eq!(back, SessionStatus::Draining);
    }

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new(ChainId(84532), 7);
        assert_eq!(key.to_string(), "84532/7");
    }
}
