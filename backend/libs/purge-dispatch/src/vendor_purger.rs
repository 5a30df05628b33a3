//! Purger that forwards invalidations to a third-party CDN

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::PurgeConfig;
use crate::invalidation::{Batch, InvalidationKind, InvalidationState};
use crate::observer::{NoopObserver, PurgeObserver, ScopeGuard};
use crate::platform::PlatformInfo;
use crate::purger::Purger;
use crate::selector::BackendSelector;
use crate::stats::{PurgeStats, StatsCollector};
use crate::vendor::{BackendContext, VendorBackend};
use crate::{PurgeError, Result};

const SUPPORTED_KINDS: &[InvalidationKind] = &[
    InvalidationKind::Tag,
    InvalidationKind::Url,
    InvalidationKind::Everything,
];

/// Backend operations a batch can be forwarded to
#[derive(Debug, Clone, Copy)]
enum Operation {
    Tags,
    Urls,
    Everything,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Tags => "invalidate_tags",
            Operation::Urls => "invalidate_urls",
            Operation::Everything => "invalidate_everything",
        }
    }
}

/// Delegates every batch unchanged to the configured vendor backend.
///
/// The backend is resolved on first use, since vendor configuration may
/// not exist yet when the purger is built. A failed resolution is retried
/// on the next call; a successful one is kept for the purger's lifetime.
pub struct VendorCdnPurger {
    platform: Arc<dyn PlatformInfo>,
    context: BackendContext,
    backend: OnceCell<Arc<dyn VendorBackend>>,
    stats: StatsCollector,
    observer: Arc<dyn PurgeObserver>,
}

impl VendorCdnPurger {
    pub fn new(platform: Arc<dyn PlatformInfo>, context: BackendContext) -> Self {
        Self {
            platform,
            stats: context.stats.clone(),
            context,
            backend: OnceCell::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Use the timeouts of `config` with a fresh error gate
    pub fn from_config(platform: Arc<dyn PlatformInfo>, config: &PurgeConfig) -> Self {
        let context = BackendContext {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            ..BackendContext::default()
        };
        Self::new(platform, context)
    }

    pub fn with_observer(mut self, observer: Arc<dyn PurgeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Standing vendor fault, if one has been recorded and not yet expired
    pub fn health(&self) -> Option<String> {
        self.context.gate.health()
    }

    pub fn stats(&self) -> PurgeStats {
        self.stats.snapshot()
    }

    fn backend(&self) -> Result<&Arc<dyn VendorBackend>> {
        self.backend.get_or_try_init(|| {
            let config = self.platform.vendor_cdn_config();
            let site_identifier = self.platform.site_identifier();
            BackendSelector::select(config.as_ref(), &site_identifier, &self.context).ok_or_else(
                || PurgeError::Configuration("no usable CDN vendor backend configured".into()),
            )
        })
    }

    /// Resolve the backend, failing the whole batch when none is available
    fn resolve(&self, batch: &mut Batch<'_>) -> Result<Arc<dyn VendorBackend>> {
        match self.backend() {
            Ok(backend) => Ok(Arc::clone(backend)),
            Err(e) => {
                error!(error = %e, count = batch.len(), "Cannot dispatch to CDN vendor");
                for invalidation in batch.iter_mut() {
                    invalidation.fail();
                }
                self.stats.record_outcome(false, batch.len());
                Err(e)
            }
        }
    }

    /// Mark every unsettled invalidation failed after a backend error
    fn absorb(&self, batch: &mut Batch<'_>, operation: &str, outcome: Result<()>) {
        if let Err(e) = outcome {
            warn!(operation, error = %e, "CDN vendor call failed");
            self.observer.request_failed(operation, &e);
            for invalidation in batch.iter_mut() {
                invalidation.fail_unless_terminal();
            }
        }
    }

    fn tally(&self, batch: &Batch<'_>) {
        let succeeded = batch
            .iter()
            .filter(|inv| inv.state() == InvalidationState::Succeeded)
            .count();
        self.stats.record_outcome(true, succeeded);
        self.stats.record_outcome(false, batch.len() - succeeded);
    }

    async fn forward(&self, mut batch: Batch<'_>, operation: Operation) -> Result<()> {
        let backend = self.resolve(&mut batch)?;

        for invalidation in batch.iter_mut() {
            invalidation.processing();
        }

        let outcome = match operation {
            Operation::Tags => backend.invalidate_tags(&mut batch).await,
            Operation::Urls => backend.invalidate_urls(&mut batch).await,
            Operation::Everything => backend.invalidate_everything(&mut batch).await,
        };

        let operation = operation.as_str();
        self.absorb(&mut batch, operation, outcome);
        self.tally(&batch);

        info!(
            vendor = backend.name(),
            operation,
            count = batch.len(),
            "CDN vendor purge complete"
        );

        Ok(())
    }
}

#[async_trait]
impl Purger for VendorCdnPurger {
    fn name(&self) -> &'static str {
        "vendor_cdn"
    }

    fn supported_kinds(&self) -> &'static [InvalidationKind] {
        SUPPORTED_KINDS
    }

    async fn invalidate_tags(&self, batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), Operation::Tags.as_str());
        self.forward(batch, Operation::Tags).await
    }

    async fn invalidate_urls(&self, batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), Operation::Urls.as_str());
        self.forward(batch, Operation::Urls).await
    }

    async fn invalidate_everything(&self, batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), Operation::Everything.as_str());
        self.forward(batch, Operation::Everything).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VendorConfig;
    use crate::invalidation::Invalidation;
    use crate::platform::StaticPlatform;

    fn purger(vendor: Option<VendorConfig>) -> VendorCdnPurger {
        let mut platform = StaticPlatform::new("site-a", vec![]);
        if let Some(vendor) = vendor {
            platform = platform.with_vendor(vendor);
        }
        VendorCdnPurger::new(Arc::new(platform), BackendContext::default())
    }

    #[tokio::test]
    async fn test_unconfigured_is_a_configuration_error() {
        let purger = purger(None);
        let mut invalidations = vec![Invalidation::tag("a"), Invalidation::url("https://x/")];

        let err = tokio_test::assert_err!(purger.dispatch(&mut invalidations).await);

        assert!(err.is_configuration());
        assert!(invalidations
            .iter()
            .all(|inv| inv.state() == InvalidationState::Failed));
    }

    #[tokio::test]
    async fn test_empty_token_is_a_configuration_error() {
        let config = VendorConfig::new("fastly")
            .with_setting("service_id", "svc")
            .with_setting("token", "");
        let purger = purger(Some(config));
        let mut invalidations = vec![Invalidation::tag("a")];

        let err = purger.dispatch(&mut invalidations).await.unwrap_err();

        assert!(matches!(err, PurgeError::Configuration(_)));
        assert_eq!(invalidations[0].state(), InvalidationState::Failed);
        assert_eq!(purger.stats().requests_sent, 0);
    }

    #[tokio::test]
    #[should_panic(expected = "does not support wildcardurl")]
    async fn test_wildcard_urls_unsupported() {
        let purger = purger(None);
        let mut invalidations = vec![Invalidation::wildcard_url("http://x/*")];
        let _ = purger.dispatch(&mut invalidations).await;
    }

    #[test]
    fn test_health_reflects_gate() {
        let purger = purger(None);
        assert!(purger.health().is_none());

        purger
            .context
            .gate
            .set_error("fastly: bad token", std::time::Duration::from_secs(60));
        assert_eq!(purger.health().as_deref(), Some("fastly: bad token"));
    }
}
