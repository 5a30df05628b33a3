//! Salted cache tag hashing

use sha2::{Digest, Sha256};

/// Width of every hashed tag, in hex characters
pub const HASH_LENGTH: usize = 16;

/// Hashes cache tags into short, header-safe tokens scoped to one site.
///
/// Two sites sharing a raw tag vocabulary never produce the same hashed tag,
/// because the site identifier is prepended to every tag before digesting.
///
/// ```
/// use purge_dispatch::TagHasher;
///
/// let hasher = TagHasher::new("site-a");
/// let hashed = hasher.hash_tag("node:1");
/// assert_eq!(hashed.len(), purge_dispatch::hasher::HASH_LENGTH);
/// assert_ne!(hashed, TagHasher::new("site-b").hash_tag("node:1"));
/// ```
#[derive(Debug, Clone)]
pub struct TagHasher {
    site_identifier: String,
}

impl TagHasher {
    pub fn new(site_identifier: impl Into<String>) -> Self {
        Self {
            site_identifier: site_identifier.into(),
        }
    }

    pub fn hash_tag(&self, tag: &str) -> String {
        digest(&[self.site_identifier.as_bytes(), tag.as_bytes()])
    }

    pub fn hash_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        tags.iter().map(|tag| self.hash_tag(tag.as_ref())).collect()
    }

    /// Hash standing for "this entire site", used by whole-site purges
    pub fn site_hash(&self) -> String {
        digest(&[self.site_identifier.as_bytes()])
    }
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut encoded = hex::encode(hasher.finalize());
    encoded.truncate(HASH_LENGTH);
    encoded
}
