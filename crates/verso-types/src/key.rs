//! Content keys: the hierarchical names under which values are versioned.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum number of elements in a key.
pub const MAX_ELEMENTS: usize = 20;

/// Name of a versioned value, e.g. `["warehouse", "sales", "orders"]`.
///
/// Keys are ordered element-wise, so all keys below a namespace sort
/// contiguously right after the namespace key itself.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ContentKey(Vec<String>);

impl ContentKey {
    /// Build a key from its elements.
    ///
    /// Elements must be non-empty, must not contain NUL characters, and a
    /// key has between 1 and [`MAX_ELEMENTS`] elements.
    pub fn new<I, S>(elements: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let elements: Vec<String> = elements.into_iter().map(Into::into).collect();
        if elements.is_empty() {
            return Err(TypeError::InvalidKey("key has no elements".into()));
        }
        if elements.len() > MAX_ELEMENTS {
            return Err(TypeError::InvalidKey(format!(
                "key has {} elements, at most {MAX_ELEMENTS} allowed",
                elements.len()
            )));
        }
        for element in &elements {
            if element.is_empty() {
                return Err(TypeError::InvalidKey("empty key element".into()));
            }
            if element.contains('\0') {
                return Err(TypeError::InvalidKey(format!(
                    "key element {element:?} contains NUL"
                )));
            }
        }
        Ok(Self(elements))
    }

    /// Parse a dot-separated key such as `"db.schema.table"`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::new(s.split('.'))
    }

    /// The key's elements.
    pub fn elements(&self) -> &[String] {
        &self.0
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: a valid key has at least one element.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last element.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// The enclosing namespace key, `None` for single-element keys.
    pub fn parent(&self) -> Option<ContentKey> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Returns `true` if `self` equals `prefix` or lives below it.
    pub fn starts_with(&self, prefix: &ContentKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({self})")
    }
}

impl TryFrom<Vec<String>> for ContentKey {
    type Error = TypeError;

    fn try_from(elements: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(elements)
    }
}

impl From<ContentKey> for Vec<String> {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for ContentKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_and_display() {
        let key = ContentKey::parse("db.schema.orders").unwrap();
        assert_eq!(key.len(), 3);
        assert_eq!(key.name(), "orders");
        assert_eq!(key.to_string(), "db.schema.orders");
    }

    #[test]
    fn rejects_invalid_keys() {
        assert!(ContentKey::new(Vec::<String>::new()).is_err());
        assert!(ContentKey::parse("a..b").is_err());
        assert!(ContentKey::new(["a\0b"]).is_err());
        let too_long: Vec<String> = (0..=MAX_ELEMENTS).map(|i| i.to_string()).collect();
        assert!(ContentKey::new(too_long).is_err());
    }

    #[test]
    fn deserializing_validates_elements() {
        let key: ContentKey = serde_json::from_str(r#"["db","orders"]"#).unwrap();
        assert_eq!(key, ContentKey::parse("db.orders").unwrap());
        assert_eq!(serde_json::to_string(&key).unwrap(), r#"["db","orders"]"#);

        assert!(serde_json::from_str::<ContentKey>(r#"["db",""]"#).is_err());
        assert!(serde_json::from_str::<ContentKey>("[]").is_err());
        let too_long: Vec<String> = (0..=MAX_ELEMENTS).map(|i| i.to_string()).collect();
        let json = serde_json::to_string(&too_long).unwrap();
        assert!(serde_json::from_str::<ContentKey>(&json).is_err());
    }

    #[test]
    fn parent_and_prefix() {
        let key = ContentKey::parse("a.b.c").unwrap();
        let parent = key.parent().unwrap();
        assert_eq!(parent, ContentKey::parse("a.b").unwrap());
        assert!(key.starts_with(&parent));
        assert!(!parent.starts_with(&key));
        assert!(ContentKey::parse("a").unwrap().parent().is_none());
    }

    #[test]
    fn namespace_children_sort_after_namespace() {
        let ns = ContentKey::parse("a").unwrap();
        let child = ContentKey::parse("a.z").unwrap();
        let sibling = ContentKey::parse("a0").unwrap();
        assert!(ns < child);
        assert!(child < sibling);
    }

    proptest! {
        #[test]
        fn parse_display_roundtrip(elements in prop::collection::vec("[a-z0-9_]{1,8}", 1..6)) {
            let key = ContentKey::new(elements.clone()).unwrap();
            let reparsed = ContentKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(key.elements(), &elements[..]);
            prop_assert_eq!(reparsed, key);
        }
    }
}
