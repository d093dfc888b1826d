use serde::{Deserialize, Serialize};
use verso_store::Content;
use verso_types::ContentKey;

/// One change to a content key, expressed in caller-facing content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ContentOperation {
    /// Store `content` under `key`. With `expected` set, the key must
    /// currently hold exactly that content; otherwise the put is
    /// unconditional.
    Put {
        key: ContentKey,
        content: Content,
        expected: Option<Content>,
    },
    /// Remove `key`, which must exist.
    Delete { key: ContentKey },
}

impl ContentOperation {
    pub fn put(key: ContentKey, content: Content) -> Self {
        Self::Put {
            key,
            content,
            expected: None,
        }
    }

    /// A put that only applies while `key` still holds `expected`.
    pub fn update(key: ContentKey, content: Content, expected: Content) -> Self {
        Self::Put {
            key,
            content,
            expected: Some(expected),
        }
    }

    pub fn delete(key: ContentKey) -> Self {
        Self::Delete { key }
    }

    pub fn key(&self) -> &ContentKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}
