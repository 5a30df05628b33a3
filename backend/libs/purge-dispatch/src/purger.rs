//! Purger trait and the kind-to-handler dispatch table

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::invalidation::{Batch, Invalidation, InvalidationKind};
use crate::Result;

/// Handler name for each invalidation kind
pub fn handler_name(kind: InvalidationKind) -> &'static str {
    match kind {
        InvalidationKind::Tag => "invalidate_tags",
        InvalidationKind::Url => "invalidate_urls",
        InvalidationKind::WildcardUrl => "invalidate_wildcard_urls",
        InvalidationKind::Everything => "invalidate_everything",
    }
}

fn unsupported(purger: &str, kind: InvalidationKind) -> ! {
    panic!(
        "purger '{}' does not support {} invalidations; callers must only submit supported kinds",
        purger, kind
    )
}

/// Something that can execute invalidations.
///
/// Handlers move every invalidation they receive to a terminal state. An
/// `Err` is reserved for faults that make the purger unusable as a whole
/// (see [`crate::PurgeError::Configuration`]); per-invalidation failures are
/// reported through state only.
#[async_trait]
pub trait Purger: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_kinds(&self) -> &'static [InvalidationKind];

    async fn invalidate_tags(&self, _batch: Batch<'_>) -> Result<()> {
        unsupported(self.name(), InvalidationKind::Tag)
    }

    async fn invalidate_urls(&self, _batch: Batch<'_>) -> Result<()> {
        unsupported(self.name(), InvalidationKind::Url)
    }

    async fn invalidate_wildcard_urls(&self, _batch: Batch<'_>) -> Result<()> {
        unsupported(self.name(), InvalidationKind::WildcardUrl)
    }

    async fn invalidate_everything(&self, _batch: Batch<'_>) -> Result<()> {
        unsupported(self.name(), InvalidationKind::Everything)
    }

    /// Route each invalidation to the handler for its kind.
    ///
    /// Every invalidation is terminal when this returns. The first handler
    /// error is returned after all kinds have been processed.
    ///
    /// # Panics
    ///
    /// Panics if an invalidation kind is not in [`Purger::supported_kinds`].
    async fn dispatch(&self, invalidations: &mut [Invalidation]) -> Result<()> {
        let mut tags = Vec::new();
        let mut urls = Vec::new();
        let mut wildcards = Vec::new();
        let mut everything = Vec::new();

        for invalidation in invalidations.iter_mut() {
            let kind = invalidation.kind;
            if !self.supported_kinds().contains(&kind) {
                unsupported(self.name(), kind);
            }
            match kind {
                InvalidationKind::Tag => tags.push(invalidation),
                InvalidationKind::Url => urls.push(invalidation),
                InvalidationKind::WildcardUrl => wildcards.push(invalidation),
                InvalidationKind::Everything => everything.push(invalidation),
            }
        }

        let buckets = [
            (InvalidationKind::Tag, tags),
            (InvalidationKind::Url, urls),
            (InvalidationKind::WildcardUrl, wildcards),
            (InvalidationKind::Everything, everything),
        ];

        let mut first_error = None;
        for (kind, batch) in buckets {
            if batch.is_empty() {
                continue;
            }
            debug!(
                purger = self.name(),
                handler = handler_name(kind),
                count = batch.len(),
                "Dispatching invalidations"
            );
            let outcome = match kind {
                InvalidationKind::Tag => self.invalidate_tags(batch).await,
                InvalidationKind::Url => self.invalidate_urls(batch).await,
                InvalidationKind::WildcardUrl => self.invalidate_wildcard_urls(batch).await,
                InvalidationKind::Everything => self.invalidate_everything(batch).await,
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        for invalidation in invalidations.iter_mut() {
            if invalidation.fail_unless_terminal() {
                warn!(
                    purger = self.name(),
                    invalidation_id = %invalidation.id,
                    "Handler left invalidation unsettled, marking failed"
                );
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
