//! Addressing for bronze artifacts.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Length of the hex prefix used for request-keyed addressing.
pub const URL_HASH_LEN: usize = 16;

/// Stable 16-character hex hash of a URL.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..URL_HASH_LEN].to_string()
}

/// Location of one artifact: `{source}/{item}/{kind}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BronzeKey {
    source: String,
    item: String,
    kind: String,
    ext: String,
}

impl BronzeKey {
    /// Item-keyed address for a payload with a natural external id.
    ///
    /// Ids that are not a single safe path component (feed entry ids are
    /// often URLs) fall back to their hash.
    pub fn item(source: &str, external_id: &str, kind: &str, ext: &str) -> Self {
        let item = if is_safe_component(external_id) {
            external_id.to_string()
        } else {
            url_hash(external_id)
        };
        Self {
            source: source.to_string(),
            item,
            kind: kind.to_string(),
            ext: ext.to_string(),
        }
    }

    /// Request-keyed address for an HTTP response with no natural id.
    pub fn request(source: &str, url: &str, kind: &str, ext: &str) -> Self {
        Self {
            source: source.to_string(),
            item: url_hash(url),
            kind: kind.to_string(),
            ext: ext.to_string(),
        }
    }

    /// Path relative to the store root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.source)
            .join(&self.item)
            .join(format!("{}.{}", self.kind, self.ext))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn item_key(&self) -> &str {
        &self.item
    }
}

impl std::fmt::Display for BronzeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}.{}", self.source, self.item, self.kind, self.ext)
    }
}

fn is_safe_component(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', ':', '\0'])
}
