use serde::{Deserialize, Serialize};

/// Lifecycle of an interception layer instance.
///
/// Ordering follows the progression: a state only ever moves to a greater
/// one, and `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Freshly registered, install work in progress
    Installing,
    /// Installed, held back by a predecessor that still controls clients
    Waiting,
    /// Controls clients and intercepts their requests
    Active,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// Whether moving from `self` to `next` is a forward transition
    pub fn can_advance_to(&self, next: LifecycleState) -> bool {
        next > *self
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Waiting => write!(f, "waiting"),
            LifecycleState::Active => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_forward_only() {
        assert!(LifecycleState::Installing.can_advance_to(LifecycleState::Waiting));
        assert!(LifecycleState::Installing.can_advance_to(LifecycleState::Active));
        assert!(LifecycleState::Waiting.can_advance_to(LifecycleState::Active));
        assert!(!LifecycleState::Active.can_advance_to(LifecycleState::Waiting));
        assert!(!LifecycleState::Active.can_advance_to(LifecycleState::Active));
    }
}
