//! Time-bounded advisory error flag for vendor backends
//!
//! A backend that detects a systemic fault (bad credentials, unknown
//! environment) records it here with a cooldown. Health checks read it, and
//! the backend itself may consult it before issuing further requests.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
struct RuntimeError {
    message: String,
    expires_at: DateTime<Utc>,
}

/// Shared, clonable error flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct RuntimeErrorGate {
    state: Arc<RwLock<Option<RuntimeError>>>,
}

impl RuntimeErrorGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `message` until `ttl` elapses, replacing any previous error
    pub fn set_error(&self, message: impl Into<String>, ttl: Duration) {
        let message = message.into();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        warn!(
            message = %message,
            expires_at = %expires_at,
            "Recording runtime error"
        );

        *self.state.write() = Some(RuntimeError {
            message,
            expires_at,
        });
    }

    /// Current message, or an empty string when none is set or it expired
    pub fn get_error(&self) -> String {
        self.health().unwrap_or_default()
    }

    /// Current message for operational dashboards
    pub fn health(&self) -> Option<String> {
        let state = self.state.read();
        match state.as_ref() {
            Some(err) if Utc::now() < err.expires_at => Some(err.message.clone()),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.health().is_some()
    }

    /// When the current error stops being reported
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read();
        state
            .as_ref()
            .map(|err| err.expires_at)
            .filter(|expires_at| Utc::now() < *expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_gate() {
        let gate = RuntimeErrorGate::new();
        assert_eq!(gate.get_error(), "");
        assert!(gate.health().is_none());
        assert!(!gate.is_set());
        assert!(gate.expires_at().is_none());
    }

    #[test]
    fn test_expires_at_follows_ttl() {
        let gate = RuntimeErrorGate::new();
        let before = Utc::now();
        gate.set_error("x", Duration::from_secs(3600));

        let expires_at = gate.expires_at().unwrap();
        assert!(expires_at >= before + chrono::Duration::hours(1));
        assert!(expires_at <= Utc::now() + chrono::Duration::hours(1));
    }

    #[test]
    fn test_set_and_get() {
        let gate = RuntimeErrorGate::new();
        gate.set_error("x", Duration::from_secs(1));
        assert_eq!(gate.get_error(), "x");
        assert_eq!(gate.health(), Some("x".to_string()));
    }

    #[test]
    fn test_expires_after_ttl() {
        let gate = RuntimeErrorGate::new();
        gate.set_error("x", Duration::from_secs(1));
        assert_eq!(gate.get_error(), "x");

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(gate.get_error(), "");
    }

    #[test]
    fn test_overwrite() {
        let gate = RuntimeErrorGate::new();
        gate.set_error("first", Duration::from_secs(60));
        gate.set_error("second", Duration::from_secs(60));
        assert_eq!(gate.get_error(), "second");
    }

    #[test]
    fn test_overwrite_with_zero_ttl_clears() {
        let gate = RuntimeErrorGate::new();
        gate.set_error("first", Duration::from_secs(60));
        gate.set_error("second", Duration::ZERO);
        assert_eq!(gate.get_error(), "");
    }

    #[test]
    fn test_clones_share_state() {
        let gate = RuntimeErrorGate::new();
        let clone = gate.clone();
        clone.set_error("shared", Duration::from_secs(60));
        assert_eq!(gate.get_error(), "shared");
    }

    #[test]
    fn test_concurrent_access() {
        let gate = RuntimeErrorGate::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        gate.set_error(format!("err-{i}"), Duration::from_secs(60));
                        assert!(gate.get_error().starts_with("err-"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(gate.is_set());
    }
}
