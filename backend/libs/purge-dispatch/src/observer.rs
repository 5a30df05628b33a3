//! Optional observer invoked at purge call boundaries

use tracing::trace;

use crate::PurgeError;

/// Cross-cutting hook around purge operations. Every method defaults to a
/// no-op so implementors only override what they need.
pub trait PurgeObserver: Send + Sync {
    fn enter(&self, _scope: &str) {}

    fn exit(&self, _scope: &str) {}

    /// A single outbound request failed or panicked
    fn request_failed(&self, _key: &str, _error: &PurgeError) {}
}

/// Observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PurgeObserver for NoopObserver {}

/// Observer that emits `trace!` events for every call boundary
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PurgeObserver for TracingObserver {
    fn enter(&self, scope: &str) {
        trace!(scope, "enter");
    }

    fn exit(&self, scope: &str) {
        trace!(scope, "exit");
    }

    fn request_failed(&self, key: &str, error: &PurgeError) {
        trace!(key, error = %error, "request failed");
    }
}

/// Calls `exit` when dropped, so early returns are still observed
pub(crate) struct ScopeGuard<'a> {
    observer: &'a dyn PurgeObserver,
    scope: &'static str,
}

impl<'a> ScopeGuard<'a> {
    pub(crate) fn enter(observer: &'a dyn PurgeObserver, scope: &'static str) -> Self {
        observer.enter(scope);
        Self { observer, scope }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.observer.exit(self.scope);
    }
}
