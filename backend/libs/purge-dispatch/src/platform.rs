//! Platform topology consumed by the purgers

use crate::config::{PurgeConfig, VendorConfig};

/// Source of edge addresses, the site identifier and vendor settings.
///
/// Purgers read it once per dispatch call and treat the answers as a
/// snapshot for the rest of that call.
pub trait PlatformInfo: Send + Sync {
    /// Edge node addresses (`host[:port]`). Empty means nothing to fan out to.
    fn edge_addresses(&self) -> Vec<String>;

    fn site_identifier(&self) -> String;

    fn vendor_cdn_config(&self) -> Option<VendorConfig>;
}

/// Fixed topology, typically built from [`PurgeConfig`]
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    edge_addresses: Vec<String>,
    site_identifier: String,
    vendor: Option<VendorConfig>,
}

impl StaticPlatform {
    pub fn new(site_identifier: impl Into<String>, edge_addresses: Vec<String>) -> Self {
        Self {
            edge_addresses,
            site_identifier: site_identifier.into(),
            vendor: None,
        }
    }

    pub fn from_config(config: &PurgeConfig, vendor: Option<VendorConfig>) -> Self {
        Self {
            edge_addresses: config.edge_addresses.clone(),
            site_identifier: config.site_identifier.clone(),
            vendor,
        }
    }

    pub fn with_vendor(mut self, vendor: VendorConfig) -> Self {
        self.vendor = Some(vendor);
        self
    }
}

impl PlatformInfo for StaticPlatform {
    fn edge_addresses(&self) -> Vec<String> {
        self.edge_addresses.clone()
    }

    fn site_identifier(&self) -> String {
        self.site_identifier.clone()
    }

    fn vendor_cdn_config(&self) -> Option<VendorConfig> {
        self.vendor.clone()
    }
}
