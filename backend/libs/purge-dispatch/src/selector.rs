//! Resolves vendor configuration to a single backend

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::VendorConfig;
use crate::vendor::{BackendContext, Vendor, VendorBackend};

pub struct BackendSelector;

impl BackendSelector {
    /// Pick the configured backend, or `None` when nothing usable is
    /// configured. Missing or invalid configuration is an expected outcome,
    /// never an error.
    pub fn select(
        config: Option<&VendorConfig>,
        site_identifier: &str,
        context: &BackendContext,
    ) -> Option<Arc<dyn VendorBackend>> {
        let Some(config) = config else {
            debug!("No CDN vendor configured");
            return None;
        };

        let vendor = match config.vendor.parse::<Vendor>() {
            Ok(vendor) => vendor,
            Err(e) => {
                warn!(vendor = %config.vendor, error = %e, "Unknown CDN vendor");
                return None;
            }
        };

        if !vendor.validate_config(config) {
            warn!(vendor = %vendor, "CDN vendor configuration is incomplete");
            return None;
        }

        match vendor.build(config, site_identifier, context) {
            Ok(backend) => {
                debug!(vendor = %vendor, "CDN vendor backend selected");
                Some(backend)
            }
            Err(e) => {
                error!(vendor = %vendor, error = %e, "Failed to construct CDN vendor backend");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(config: Option<&VendorConfig>) -> Option<Arc<dyn VendorBackend>> {
        BackendSelector::select(config, "site-a", &BackendContext::default())
    }

    #[test]
    fn test_no_config() {
        assert!(select(None).is_none());
    }

    #[test]
    fn test_unknown_vendor() {
        let config = VendorConfig::new("akamai")
            .with_setting("service_id", "svc")
            .with_setting("token", "t");
        assert!(select(Some(&config)).is_none());
    }

    #[test]
    fn test_empty_token() {
        let config = VendorConfig::new("fastly")
            .with_setting("service_id", "svc")
            .with_setting("token", "");
        assert!(select(Some(&config)).is_none());
    }

    #[test]
    fn test_unparsable_api_base() {
        let config = VendorConfig::new("fastly")
            .with_setting("service_id", "svc")
            .with_setting("token", "t")
            .with_setting("api_base", "::not a url::");
        assert!(select(Some(&config)).is_none());
    }

    #[test]
    fn test_valid_config() {
        let config = VendorConfig::new("fastly")
            .with_setting("service_id", "svc")
            .with_setting("token", "t");
        let backend = select(Some(&config)).unwrap();
        assert_eq!(backend.name(), "fastly");
    }
}
