//! Cache invalidation dispatch to edge fleets and CDN vendors
//!
//! Propagates purge intents (by tag, by URL, by wildcard URL, or for the
//! whole site) from the origin to every edge node and to an optional
//! third-party CDN, and records the outcome on each intent.
//!
//! # Architecture
//!
//! ```text
//! caller: Vec<Invalidation>
//!      ↓
//! Purger::dispatch (partition by kind, route to handler)
//!      ↓                                   ↓
//! EdgeFleetPurger                     VendorCdnPurger
//!   1. reject tags with spaces          1. resolve backend once
//!   2. group tags by 15, hash them         (BackendSelector)
//!   3. group × edge address             2. forward batch unchanged
//!      ↓                                   ↓
//! ConcurrentDispatcher (≤ 6 in flight)  FastlyBackend ──► RuntimeErrorGate
//!      ↓
//! unanimous acknowledgement → Succeeded, anything else → Failed
//! ```
//!
//! Every invalidation passed to `dispatch` is `Succeeded` or `Failed` when the
//! call returns. `dispatch` only returns `Err` when the purger cannot work at
//! all, e.g. no CDN vendor is configured.
//!
//! # Example: Edge fleet
//!
//! ```no_run
//! use std::sync::Arc;
//! use purge_dispatch::{EdgeFleetPurger, Invalidation, PurgeConfig, Purger, StaticPlatform};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PurgeConfig::from_env()?;
//!     let platform = Arc::new(StaticPlatform::from_config(&config, None));
//!     let purger = EdgeFleetPurger::new(platform, &config)?;
//!
//!     let mut invalidations = vec![
//!         Invalidation::tag("node:42"),
//!         Invalidation::url("https://example.com/about"),
//!     ];
//!     purger.dispatch(&mut invalidations).await?;
//!
//!     for invalidation in &invalidations {
//!         println!("{} -> {:?}", invalidation.expression, invalidation.state());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Example: CDN vendor
//!
//! ```no_run
//! use std::sync::Arc;
//! use purge_dispatch::{Invalidation, PurgeConfig, Purger, StaticPlatform, VendorCdnPurger, VendorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PurgeConfig::from_env()?;
//!     let platform = Arc::new(StaticPlatform::from_config(&config, VendorConfig::from_env()?));
//!     let purger = VendorCdnPurger::from_config(platform, &config);
//!
//!     let mut invalidations = vec![Invalidation::everything()];
//!     if let Err(e) = purger.dispatch(&mut invalidations).await {
//!         eprintln!("CDN purger unusable: {}", e);
//!     }
//!     if let Some(fault) = purger.health() {
//!         eprintln!("CDN vendor suspended: {}", fault);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod edge;
mod error;
mod error_gate;
pub mod hasher;
pub mod helpers;
mod invalidation;
pub mod observer;
mod platform;
mod purger;
mod selector;
mod stats;
pub mod vendor;
mod vendor_purger;

pub use config::{PurgeConfig, VendorConfig};
pub use dispatcher::{ConcurrentDispatcher, DispatchResults, RequestFuture};
pub use edge::EdgeFleetPurger;
pub use error::PurgeError;
pub use error_gate::RuntimeErrorGate;
pub use hasher::TagHasher;
pub use invalidation::{Batch, Invalidation, InvalidationKind, InvalidationState};
pub use observer::{NoopObserver, PurgeObserver, TracingObserver};
pub use platform::{PlatformInfo, StaticPlatform};
pub use purger::{handler_name, Purger};
pub use selector::BackendSelector;
pub use stats::{PurgeStats, StatsCollector};
pub use vendor::{BackendContext, Vendor, VendorBackend};
pub use vendor_purger::VendorCdnPurger;

pub type Result<T> = std::result::Result<T, PurgeError>;
