//! Example: purge tags and URLs on the edge fleet, then on the CDN vendor
//!
//! Run with:
//! PURGE_SITE_IDENTIFIER=site-a PURGE_EDGE_ADDRESSES=127.0.0.1:6081 \
//!     cargo run --example edge_purge

use purge_dispatch::{
    EdgeFleetPurger, Invalidation, PurgeConfig, Purger, StaticPlatform, TracingObserver,
    VendorCdnPurger, VendorConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("purge_dispatch=debug")
        .init();

    let config = PurgeConfig::from_env()?;
    let platform = Arc::new(StaticPlatform::from_config(
        &config,
        VendorConfig::from_env()?,
    ));

    let edge = EdgeFleetPurger::new(platform.clone(), &config)?
        .with_observer(Arc::new(TracingObserver));

    let mut invalidations = vec![
        Invalidation::tag("node:1"),
        Invalidation::tag("config:system.site"),
        Invalidation::tag("not a tag"),
        Invalidation::url("http://www.example.com/news"),
        Invalidation::wildcard_url("https://www.example.com/blog/*"),
    ];

    println!("Purging {} invalidations on the edge fleet", invalidations.len());
    edge.dispatch(&mut invalidations).await?;
    for invalidation in &invalidations {
        println!(
            "   {:<12} {:<40} {:?}",
            invalidation.kind.to_string(),
            invalidation.expression,
            invalidation.state()
        );
    }
    println!("Edge stats: {:?}", edge.stats());

    let vendor = VendorCdnPurger::from_config(platform, &config);
    let mut vendor_invalidations = vec![Invalidation::tag("node:1"), Invalidation::everything()];
    match vendor.dispatch(&mut vendor_invalidations).await {
        Ok(()) => println!("CDN vendor purge finished"),
        Err(e) => println!("CDN vendor unavailable: {}", e),
    }
    if let Some(fault) = vendor.health() {
        println!("CDN vendor suspended: {}", fault);
    }

    Ok(())
}
