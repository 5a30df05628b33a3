//! Edge fleet purger
//!
//! Every invalidation is fanned out to every edge address. A unit (a tag
//! group, or a single URL) only succeeds when every address acknowledged
//! it; a half-purged fleet counts as a failure.
//!
//! ```text
//! tags ──► reject "a b" ──► groups of 15 ──► group × address ──► BAN /tags
//! urls ──────────────────────► url × address ────────────────► PURGE <url>
//! wildcard urls ─────────────► url × address (http) ─────────► BAN <url>
//! everything ──► address by address, sequentially ───────────► BAN /site
//! ```

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::PurgeConfig;
use crate::dispatcher::{ConcurrentDispatcher, DispatchResults, RequestFuture};
use crate::hasher::TagHasher;
use crate::helpers::{authority, edge_url, is_valid_tag, rewrite_for_edge, BAN, PURGE};
use crate::invalidation::{settle_all, Batch, Invalidation, InvalidationKind};
use crate::observer::{NoopObserver, PurgeObserver, ScopeGuard};
use crate::platform::PlatformInfo;
use crate::purger::Purger;
use crate::stats::{PurgeStats, StatsCollector};
use crate::{PurgeError, Result};

/// Hashed tags of one group
pub const TAGS_HEADER: &str = "x-purge-tags";
/// Raw tags of one group, for debugging on the edge
pub const TAGS_FULL_HEADER: &str = "x-purge-tags-full";
/// Site isolation token
pub const SITE_HEADER: &str = "x-purge-site";
/// Original `host[:port]` of a URL purge
pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

const SUPPORTED_KINDS: &[InvalidationKind] = &[
    InvalidationKind::Tag,
    InvalidationKind::Url,
    InvalidationKind::WildcardUrl,
    InvalidationKind::Everything,
];

pub struct EdgeFleetPurger {
    platform: Arc<dyn PlatformInfo>,
    client: Client,
    dispatcher: ConcurrentDispatcher,
    tag_group_size: usize,
    stats: StatsCollector,
    observer: Arc<dyn PurgeObserver>,
}

impl EdgeFleetPurger {
    pub fn new(platform: Arc<dyn PlatformInfo>, config: &PurgeConfig) -> Result<Self> {
        // Edge nodes are addressed by IP, so their certificates never match
        // the host of an https URL being purged.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(true)
            .build()?;

        let stats = StatsCollector::new();
        let dispatcher = ConcurrentDispatcher::new(config.concurrency).with_stats(stats.clone());

        Ok(Self {
            platform,
            client,
            dispatcher,
            tag_group_size: config.tag_group_size.max(1),
            stats,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PurgeObserver>) -> Self {
        self.dispatcher = self.dispatcher.with_observer(Arc::clone(&observer));
        self.observer = observer;
        self
    }

    pub fn stats(&self) -> PurgeStats {
        self.stats.snapshot()
    }

    pub fn tag_group_size(&self) -> usize {
        self.tag_group_size
    }

    /// Shared URL and wildcard URL fan-out, keyed by invalidation id
    async fn fan_out_urls(&self, mut batch: Batch<'_>, method: Method, force_http: bool) {
        let addresses: Arc<[String]> = self.platform.edge_addresses().into();
        let site_identifier: Arc<str> = self.platform.site_identifier().into();

        let mut targets: Vec<(Uuid, String)> = Vec::with_capacity(batch.len());
        for invalidation in batch.iter_mut() {
            let routable = Url::parse(&invalidation.expression)
                .ok()
                .and_then(|url| authority(&url))
                .is_some();
            if routable {
                invalidation.processing();
                targets.push((invalidation.id, invalidation.expression.clone()));
            } else {
                warn!(url = %invalidation.expression, "Rejecting unroutable URL invalidation");
                invalidation.fail();
            }
        }

        let url_count = targets.len();
        let requests = url_requests(
            self.client.clone(),
            targets,
            method.clone(),
            Arc::clone(&addresses),
            force_http,
            site_identifier,
        );
        let results = self.dispatcher.run(requests).await;

        for invalidation in batch.iter_mut() {
            if invalidation.state().is_terminal() {
                continue;
            }
            let success = results.succeeded(&invalidation.id);
            invalidation.settle(success);
            self.stats.record_outcome(success, 1);
        }

        info!(
            method = %method,
            urls = url_count,
            addresses = addresses.len(),
            requests = results.total_requests(),
            "Edge URL purge complete"
        );
    }
}

fn send(client: &Client, method: Method, url: Url, headers: HeaderMap) -> RequestFuture {
    let target = url.to_string();
    let request = client.request(method, url).headers(headers);
    async move {
        debug!(target_url = %target, "Sending edge purge request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PurgeError::UnexpectedStatus {
                target,
                status: status.as_u16(),
            })
        }
    }
    .boxed()
}

fn tag_request(
    client: &Client,
    address: &str,
    hashed: &str,
    raw: &str,
    site_identifier: &str,
) -> RequestFuture {
    let prepared = (|| -> Result<(Url, HeaderMap)> {
        let url = edge_url(address, "/tags")?;
        let mut headers = HeaderMap::new();
        headers.insert(TAGS_HEADER, HeaderValue::from_str(hashed)?);
        headers.insert(TAGS_FULL_HEADER, HeaderValue::from_str(raw)?);
        headers.insert(SITE_HEADER, HeaderValue::from_str(site_identifier)?);
        Ok((url, headers))
    })();

    match prepared {
        Ok((url, headers)) => send(client, BAN.clone(), url, headers),
        Err(e) => future::ready(Err(e)).boxed(),
    }
}

fn url_request(
    client: &Client,
    method: Method,
    url: &str,
    address: &str,
    force_http: bool,
    site_identifier: &str,
) -> RequestFuture {
    let prepared = (|| -> Result<(Url, HeaderMap)> {
        let (target, original_host) = rewrite_for_edge(url, address, force_http)?;
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_HOST_HEADER, HeaderValue::from_str(&original_host)?);
        headers.insert(SITE_HEADER, HeaderValue::from_str(site_identifier)?);
        Ok((target, headers))
    })();

    match prepared {
        Ok((target, headers)) => send(client, method, target, headers),
        Err(e) => future::ready(Err(e)).boxed(),
    }
}

/// One `BAN /tags` per group and address, built lazily as the dispatcher
/// pulls them. Owns everything it touches, so it can live across awaits.
fn tag_requests(
    client: Client,
    groups: Vec<(String, String)>,
    addresses: Arc<[String]>,
    site_identifier: Arc<str>,
) -> impl Iterator<Item = (usize, RequestFuture)> + Send + 'static {
    groups
        .into_iter()
        .enumerate()
        .flat_map(move |(group_id, (hashed, raw))| {
            let client = client.clone();
            let addresses = Arc::clone(&addresses);
            let site_identifier = Arc::clone(&site_identifier);
            (0..addresses.len()).map(move |index| {
                let request =
                    tag_request(&client, &addresses[index], &hashed, &raw, &site_identifier);
                (group_id, request)
            })
        })
}

/// One request per URL and address, keyed by invalidation id
fn url_requests(
    client: Client,
    targets: Vec<(Uuid, String)>,
    method: Method,
    addresses: Arc<[String]>,
    force_http: bool,
    site_identifier: Arc<str>,
) -> impl Iterator<Item = (Uuid, RequestFuture)> + Send + 'static {
    targets.into_iter().flat_map(move |(id, url)| {
        let client = client.clone();
        let method = method.clone();
        let addresses = Arc::clone(&addresses);
        let site_identifier = Arc::clone(&site_identifier);
        (0..addresses.len()).map(move |index| {
            let request = url_request(
                &client,
                method.clone(),
                &url,
                &addresses[index],
                force_http,
                &site_identifier,
            );
            (id, request)
        })
    })
}

/// Split valid tag invalidations into sequentially filled groups
pub fn group_tags<'a, 'b>(
    valid: &'b mut [&'a mut Invalidation],
    group_size: usize,
) -> std::slice::ChunksMut<'b, &'a mut Invalidation> {
    valid.chunks_mut(group_size.max(1))
}

/// Unanimous success for every group, in group order
fn group_outcomes(results: &DispatchResults<usize>, groups: usize) -> Vec<bool> {
    (0..groups).map(|id| results.succeeded(&id)).collect()
}

#[async_trait]
impl Purger for EdgeFleetPurger {
    fn name(&self) -> &'static str {
        "edge_fleet"
    }

    fn supported_kinds(&self) -> &'static [InvalidationKind] {
        SUPPORTED_KINDS
    }

    async fn invalidate_tags(&self, batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), "invalidate_tags");

        let mut valid: Batch<'_> = Vec::with_capacity(batch.len());
        for invalidation in batch {
            if is_valid_tag(&invalidation.expression) {
                invalidation.processing();
                valid.push(invalidation);
            } else {
                warn!(tag = ?invalidation.expression, "Rejecting tag that is not header-safe");
                invalidation.fail();
                self.stats.record_outcome(false, 1);
            }
        }

        let group_headers: Vec<(String, String)> = {
            let hasher = TagHasher::new(self.platform.site_identifier());
            group_tags(&mut valid, self.tag_group_size)
                .map(|group| {
                    let raw: Vec<&str> = group.iter().map(|inv| inv.expression.as_str()).collect();
                    (hasher.hash_tags(&raw).join(" "), raw.join(" "))
                })
                .collect()
        };

        if group_headers.is_empty() {
            settle_all(&mut valid, false);
            return Ok(());
        }

        let addresses: Arc<[String]> = self.platform.edge_addresses().into();
        let site_identifier: Arc<str> = self.platform.site_identifier().into();
        if addresses.is_empty() {
            warn!("No edge addresses known, tag invalidations cannot be acknowledged");
        }

        let group_count = group_headers.len();
        let requests = tag_requests(
            self.client.clone(),
            group_headers,
            Arc::clone(&addresses),
            site_identifier,
        );
        let results = self.dispatcher.run(requests).await;
        let outcomes = group_outcomes(&results, group_count);

        for (group, success) in group_tags(&mut valid, self.tag_group_size).zip(&outcomes) {
            settle_all(group, *success);
            self.stats.record_outcome(*success, group.len());
        }

        info!(
            groups = group_count,
            addresses = addresses.len(),
            requests = results.total_requests(),
            failed_groups = outcomes.iter().filter(|ok| !**ok).count(),
            "Edge tag purge complete"
        );

        Ok(())
    }

    async fn invalidate_urls(&self, batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), "invalidate_urls");
        self.fan_out_urls(batch, PURGE.clone(), false).await;
        Ok(())
    }

    async fn invalidate_wildcard_urls(&self, batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), "invalidate_wildcard_urls");
        self.fan_out_urls(batch, BAN.clone(), true).await;
        Ok(())
    }

    /// Sequential. Every address is visited even after a failure.
    async fn invalidate_everything(&self, mut batch: Batch<'_>) -> Result<()> {
        let _scope = ScopeGuard::enter(self.observer.as_ref(), "invalidate_everything");

        for invalidation in batch.iter_mut() {
            invalidation.processing();
        }

        let addresses = self.platform.edge_addresses();
        let site_identifier = self.platform.site_identifier();
        let mut overall_success = !addresses.is_empty();
        if addresses.is_empty() {
            warn!("No edge addresses known, site purge cannot be acknowledged");
        }

        for address in &addresses {
            let request = (|| -> Result<RequestFuture> {
                let url = edge_url(address, "/site")?;
                let mut headers = HeaderMap::new();
                headers.insert(SITE_HEADER, HeaderValue::from_str(&site_identifier)?);
                Ok(send(&self.client, BAN.clone(), url, headers))
            })();

            let started = Instant::now();
            let outcome = match request {
                Ok(request) => request.await,
                Err(e) => Err(e),
            };
            self.stats.record_request(
                outcome.is_ok(),
                started.elapsed().as_secs_f64() * 1000.0,
            );

            if let Err(e) = outcome {
                warn!(address = %address, error = %e, "Edge site purge failed");
                self.observer.request_failed(address, &e);
                overall_success = false;
            }
        }

        settle_all(&mut batch, overall_success);
        self.stats.record_outcome(overall_success, batch.len());

        info!(
            addresses = addresses.len(),
            success = overall_success,
            "Edge site purge complete"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::InvalidationState;
    use crate::platform::StaticPlatform;

    fn purger(addresses: Vec<String>) -> EdgeFleetPurger {
        let platform = Arc::new(StaticPlatform::new("site-a", addresses));
        EdgeFleetPurger::new(platform, &PurgeConfig::new("site-a", vec![])).unwrap()
    }

    #[test]
    fn test_group_tags_sequential_fill() {
        let mut invalidations: Vec<Invalidation> =
            (0..20).map(|i| Invalidation::tag(format!("t{i}"))).collect();
        let mut refs: Batch<'_> = invalidations.iter_mut().collect();

        let groups: Vec<Vec<String>> = group_tags(&mut refs, 15)
            .map(|g| g.iter().map(|inv| inv.expression.clone()).collect())
            .collect();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 15);
        assert_eq!(groups[1].len(), 5);
        assert_eq!(groups[0][0], "t0");
        assert_eq!(groups[0][14], "t14");
        assert_eq!(groups[1][0], "t15");
    }

    #[test]
    fn test_group_tags_never_exceeds_size() {
        for count in [0usize, 1, 14, 15, 16, 30, 31, 100] {
            let mut invalidations: Vec<Invalidation> =
                (0..count).map(|i| Invalidation::tag(format!("t{i}"))).collect();
            let mut refs: Batch<'_> = invalidations.iter_mut().collect();
            let sizes: Vec<usize> = group_tags(&mut refs, 15).map(|g| g.len()).collect();

            assert_eq!(sizes.iter().sum::<usize>(), count);
            assert!(sizes.iter().all(|s| *s <= 15));
            // Only the last group may be partial
            if let Some((_, head)) = sizes.split_last() {
                assert!(head.iter().all(|s| *s == 15));
            }
        }
    }

    fn assert_send_static<T: Send + 'static>(_: &T) {}

    #[tokio::test]
    async fn test_request_iterators_are_lazy_and_owned() {
        let addresses: Arc<[String]> =
            vec!["127.0.0.1:1".to_string(), "127.0.0.1:2".to_string()].into();
        let groups = vec![
            ("h1".to_string(), "node:1".to_string()),
            ("h2".to_string(), "node:2".to_string()),
        ];

        let tags = tag_requests(Client::new(), groups, Arc::clone(&addresses), "site-a".into());
        assert_send_static(&tags);
        let keys: Vec<usize> = tags.map(|(key, _)| key).collect();
        assert_eq!(keys, vec![0, 0, 1, 1]);

        let id = Uuid::new_v4();
        let urls = url_requests(
            Client::new(),
            vec![(id, "http://www.example.com/a".into())],
            PURGE.clone(),
            addresses,
            false,
            "site-a".into(),
        );
        assert_send_static(&urls);
        assert_eq!(urls.map(|(key, _)| key).collect::<Vec<_>>(), vec![id, id]);
    }

    #[test]
    fn test_header_names_are_valid() {
        for name in [TAGS_HEADER, TAGS_FULL_HEADER, SITE_HEADER, FORWARDED_HOST_HEADER] {
            let parsed = reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap();
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[tokio::test]
    async fn test_all_tags_rejected_fails_everything() {
        let purger = purger(vec!["127.0.0.1:9".into()]);
        let mut invalidations = vec![Invalidation::tag("foo bar"), Invalidation::tag("a b")];

        purger.dispatch(&mut invalidations).await.unwrap();

        assert!(invalidations
            .iter()
            .all(|inv| inv.state() == InvalidationState::Failed));
        assert_eq!(purger.stats().requests_sent, 0);
    }

    #[tokio::test]
    async fn test_empty_fleet_fails_tags() {
        let purger = purger(vec![]);
        let mut invalidations = vec![Invalidation::tag("node:1")];

        purger.dispatch(&mut invalidations).await.unwrap();

        assert_eq!(invalidations[0].state(), InvalidationState::Failed);
        assert_eq!(purger.stats().requests_sent, 0);
    }

    #[tokio::test]
    async fn test_empty_fleet_fails_everything() {
        let purger = purger(vec![]);
        let mut invalidations = vec![Invalidation::everything()];

        purger.dispatch(&mut invalidations).await.unwrap();

        assert_eq!(invalidations[0].state(), InvalidationState::Failed);
    }

    #[tokio::test]
    async fn test_unroutable_url_fails_without_request() {
        let purger = purger(vec!["127.0.0.1:9".into()]);
        let mut invalidations = vec![Invalidation::url("/relative/path")];

        purger.dispatch(&mut invalidations).await.unwrap();

        assert_eq!(invalidations[0].state(), InvalidationState::Failed);
        assert_eq!(purger.stats().requests_sent, 0);
    }
}
