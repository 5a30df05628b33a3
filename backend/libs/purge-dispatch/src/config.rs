//! Dispatch configuration loaded from the environment

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::Result;

/// Tag invalidations sent per edge request
pub const DEFAULT_TAG_GROUP_SIZE: usize = 15;
/// Requests in flight per dispatch call
pub const DEFAULT_CONCURRENCY: usize = 6;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Edge fleet and dispatcher settings
///
/// Environment variables (prefix `PURGE_`):
/// - `PURGE_EDGE_ADDRESSES`: comma-separated `host[:port]` list
/// - `PURGE_SITE_IDENTIFIER`: per-site isolation token
/// - `PURGE_TAG_GROUP_SIZE`: tags per edge request (default: 15)
/// - `PURGE_CONCURRENCY`: requests in flight (default: 6)
/// - `PURGE_CONNECT_TIMEOUT_MS`: connect timeout (default: 1500)
/// - `PURGE_REQUEST_TIMEOUT_MS`: total request timeout (default: 3000)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurgeConfig {
    #[serde(default)]
    pub edge_addresses: Vec<String>,

    pub site_identifier: String,

    #[serde(default = "default_tag_group_size")]
    pub tag_group_size: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_tag_group_size() -> usize {
    DEFAULT_TAG_GROUP_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl PurgeConfig {
    pub const ENV_PREFIX: &'static str = "PURGE_";

    pub fn new(site_identifier: impl Into<String>, edge_addresses: Vec<String>) -> Self {
        Self {
            edge_addresses,
            site_identifier: site_identifier.into(),
            tag_group_size: DEFAULT_TAG_GROUP_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(envy::prefixed(Self::ENV_PREFIX).from_env::<Self>()?.normalized())
    }

    /// Load from an explicit variable list instead of the process environment
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(Self::ENV_PREFIX)
            .from_iter::<_, Self>(vars)?
            .normalized())
    }

    fn normalized(mut self) -> Self {
        self.edge_addresses = self
            .edge_addresses
            .into_iter()
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();
        self.tag_group_size = self.tag_group_size.max(1);
        self.concurrency = self.concurrency.max(1);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// CDN vendor selection plus vendor-specific settings
///
/// Environment variables (prefix `CDN_`): `CDN_VENDOR` names the vendor, every
/// other `CDN_*` variable becomes a lowercase setting (e.g. `CDN_TOKEN` ->
/// `token`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorConfig {
    pub vendor: String,

    #[serde(flatten)]
    pub settings: BTreeMap<String, String>,
}

impl VendorConfig {
    pub const ENV_PREFIX: &'static str = "CDN_";

    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Setting value, `None` when missing or blank
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// `Ok(None)` when no vendor is configured
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let vendor_key = format!("{}VENDOR", Self::ENV_PREFIX);
        if !vars.iter().any(|(key, _)| *key == vendor_key) {
            return Ok(None);
        }

        Ok(Some(
            envy::prefixed(Self::ENV_PREFIX).from_iter::<_, Self>(vars)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = PurgeConfig::from_vars(vars(&[("PURGE_SITE_IDENTIFIER", "site-a")])).unwrap();
        assert_eq!(config.site_identifier, "site-a");
        assert!(config.edge_addresses.is_empty());
        assert_eq!(config.tag_group_size, 15);
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.connect_timeout(), Duration::from_millis(1500));
        assert_eq!(config.request_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_edge_addresses_parsed() {
        let config = PurgeConfig::from_vars(vars(&[
            ("PURGE_SITE_IDENTIFIER", "site-a"),
            ("PURGE_EDGE_ADDRESSES", "10.0.0.1, 10.0.0.2:8080,"),
            ("PURGE_CONCURRENCY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.edge_addresses, vec!["10.0.0.1", "10.0.0.2:8080"]);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_missing_site_identifier() {
        let err = PurgeConfig::from_vars(vars(&[("PURGE_CONCURRENCY", "4")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_vendor_absent() {
        let config = VendorConfig::from_vars(vars(&[("CDN_TOKEN", "abc")])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_vendor_settings() {
        let config = VendorConfig::from_vars(vars(&[
            ("CDN_VENDOR", "fastly"),
            ("CDN_SERVICE_ID", "svc"),
            ("CDN_TOKEN", "  "),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.vendor, "fastly");
        assert_eq!(config.setting("service_id"), Some("svc"));
        assert_eq!(config.setting("token"), None);
        assert_eq!(config.setting("path"), None);
    }

    #[test]
    fn test_vendor_builder() {
        let config = VendorConfig::new("fastly").with_setting("token", "abc");
        assert_eq!(config.setting("token"), Some("abc"));
        assert_eq!(config.setting("service_id"), None);
    }
}
