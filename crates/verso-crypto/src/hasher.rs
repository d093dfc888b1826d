use verso_types::ObjId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"verso-commit-v1"`) that is
/// prepended to every hash computation. This prevents cross-type hash
/// collisions between object kinds.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self {
        domain: "verso-commit-v1",
    };
    /// Hasher for content value objects.
    pub const VALUE: Self = Self {
        domain: "verso-value-v1",
    };
    /// Hasher for key-index segment objects.
    pub const SEGMENT: Self = Self {
        domain: "verso-segment-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash the canonical bincode encoding of a value.
    pub fn hash_canonical<T: serde::Serialize>(&self, value: &T) -> Result<ObjId, HasherError> {
        let data =
            bincode::serialize(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected object id.
    pub fn verify(&self, data: &[u8], expected: &ObjId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Body {
        name: String,
        parents: Vec<u32>,
    }

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::VALUE.hash(data), ContentHasher::VALUE.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        let commit = ContentHasher::COMMIT.hash(data);
        let value = ContentHasher::VALUE.hash(data);
        let segment = ContentHasher::SEGMENT.hash(data);
        assert_ne!(commit, value);
        assert_ne!(commit, segment);
        assert_ne!(value, segment);
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::VALUE.hash(b"original");
        assert!(ContentHasher::VALUE.verify(b"original", &id));
        assert!(!ContentHasher::VALUE.verify(b"tampered", &id));
    }

    #[test]
    fn canonical_hash_tracks_field_changes() {
        let a = Body {
            name: "main".into(),
            parents: vec![1, 2],
        };
        let b = Body {
            name: "main".into(),
            parents: vec![2, 1],
        };
        let id_a = ContentHasher::COMMIT.hash_canonical(&a).unwrap();
        assert_eq!(id_a, ContentHasher::COMMIT.hash_canonical(&a).unwrap());
        assert_ne!(id_a, ContentHasher::COMMIT.hash_canonical(&b).unwrap());
        assert!(!id_a.is_empty());
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_eq!(hasher.domain(), "my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::VALUE.hash(b"data"));
    }
}
