//! Invalidation objects and their state machine

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// What an invalidation targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationKind {
    Tag,
    Url,
    WildcardUrl,
    Everything,
}

impl std::fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationKind::Tag => write!(f, "tag"),
            InvalidationKind::Url => write!(f, "url"),
            InvalidationKind::WildcardUrl => write!(f, "wildcardurl"),
            InvalidationKind::Everything => write!(f, "everything"),
        }
    }
}

/// Lifecycle of an invalidation: `New -> Processing -> {Succeeded | Failed}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationState {
    New,
    Processing,
    Succeeded,
    Failed,
}

impl InvalidationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InvalidationState::Succeeded | InvalidationState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            InvalidationState::New => 0,
            InvalidationState::Processing => 1,
            InvalidationState::Succeeded | InvalidationState::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition
    pub fn can_transition_to(self, next: InvalidationState) -> bool {
        next.rank() > self.rank()
    }
}

/// One purge intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invalidation {
    pub id: Uuid,
    pub kind: InvalidationKind,
    pub expression: String,
    state: InvalidationState,
}

impl Invalidation {
    pub fn new(kind: InvalidationKind, expression: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, expression)
    }

    pub fn with_id(id: Uuid, kind: InvalidationKind, expression: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            expression: expression.into(),
            state: InvalidationState::New,
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new(InvalidationKind::Tag, tag)
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::new(InvalidationKind::Url, url)
    }

    pub fn wildcard_url(pattern: impl Into<String>) -> Self {
        Self::new(InvalidationKind::WildcardUrl, pattern)
    }

    pub fn everything() -> Self {
        Self::new(InvalidationKind::Everything, "")
    }

    pub fn state(&self) -> InvalidationState {
        self.state
    }

    /// Move to `next`; regressions and moves out of a terminal state are
    /// ignored. Returns whether the state changed.
    pub fn set_state(&mut self, next: InvalidationState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_transition_to(next) {
            warn!(
                invalidation_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Ignoring backwards invalidation state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn processing(&mut self) -> bool {
        self.set_state(InvalidationState::Processing)
    }

    pub fn succeed(&mut self) -> bool {
        self.set_state(InvalidationState::Succeeded)
    }

    pub fn fail(&mut self) -> bool {
        self.set_state(InvalidationState::Failed)
    }

    /// Succeed or fail in one step
    pub fn settle(&mut self, success: bool) -> bool {
        if success {
            self.succeed()
        } else {
            self.fail()
        }
    }

    /// Fail unless the invalidation already reached a terminal state
    pub fn fail_unless_terminal(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.fail()
    }
}

/// Mutable view over the invalidations of one kind taken from a dispatch call
pub type Batch<'a> = Vec<&'a mut Invalidation>;

/// Mark every invalidation of a batch with the same outcome
pub(crate) fn settle_all(batch: &mut [&mut Invalidation], success: bool) {
    for invalidation in batch.iter_mut() {
        invalidation.settle(success);
    }
}
