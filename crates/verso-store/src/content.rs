//! Content types and their codecs.
//!
//! A [`ContentTypeRegistry`] maps the payload discriminator stored in each
//! [`ContentValueObj`] to a named content type and its encode/decode pair.
//! The registry is built once and passed to whatever needs it; there is no
//! process-wide instance.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::object::ContentValueObj;

/// Encodes a JSON value into stored bytes.
pub type EncodeFn = fn(&serde_json::Value) -> Result<Vec<u8>, String>;
/// Decodes stored bytes into a JSON value.
pub type DecodeFn = fn(&[u8]) -> Result<serde_json::Value, String>;

pub const ICEBERG_TABLE: u8 = 1;
pub const DELTA_LAKE_TABLE: u8 = 2;
pub const ICEBERG_VIEW: u8 = 3;
pub const NAMESPACE: u8 = 4;
pub const UDF: u8 = 5;

/// A content value as callers see it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Logical id, stable across updates of the same content.
    pub content_id: String,
    /// Registered content type name, e.g. `ICEBERG_TABLE`.
    pub content_type: String,
    pub value: serde_json::Value,
}

impl Content {
    /// New content with a freshly generated content id.
    pub fn new(content_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            content_id: uuid::Uuid::now_v7().to_string(),
            content_type: content_type.into(),
            value,
        }
    }

    /// The same content with a new value, keeping its content id.
    pub fn with_value(&self, value: serde_json::Value) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

struct ContentType {
    name: String,
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Explicit mapping from payload discriminator to content type.
pub struct ContentTypeRegistry {
    by_payload: BTreeMap<u8, ContentType>,
    by_name: HashMap<String, u8>,
}

impl ContentTypeRegistry {
    /// A registry with no content types.
    pub fn empty() -> Self {
        Self {
            by_payload: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// A registry with the built-in table, view, namespace and function
    /// types, all stored as JSON objects.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let builtins = [
            (ICEBERG_TABLE, "ICEBERG_TABLE"),
            (DELTA_LAKE_TABLE, "DELTA_LAKE_TABLE"),
            (ICEBERG_VIEW, "ICEBERG_VIEW"),
            (NAMESPACE, "NAMESPACE"),
            (UDF, "UDF"),
        ];
        for (payload, name) in builtins {
            registry.by_payload.insert(
                payload,
                ContentType {
                    name: name.to_string(),
                    encode: encode_json_object,
                    decode: decode_json,
                },
            );
            registry.by_name.insert(name.to_string(), payload);
        }
        registry
    }

    /// Register a content type. Payload `0` is reserved.
    pub fn register(
        &mut self,
        payload: u8,
        name: impl Into<String>,
        encode: EncodeFn,
        decode: DecodeFn,
    ) -> StoreResult<()> {
        let name = name.into();
        if payload == 0 {
            return Err(StoreError::DuplicateContentType(
                "payload 0 is reserved".into(),
            ));
        }
        if self.by_payload.contains_key(&payload) {
            return Err(StoreError::DuplicateContentType(format!("payload {payload}")));
        }
        if self.by_name.contains_key(&name) {
            return Err(StoreError::DuplicateContentType(name));
        }
        self.by_name.insert(name.clone(), payload);
        self.by_payload.insert(
            payload,
            ContentType {
                name,
                encode,
                decode,
            },
        );
        Ok(())
    }

    /// Payload discriminator of a content type name.
    pub fn payload_of(&self, name: &str) -> StoreResult<u8> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::UnknownContentType(name.to_string()))
    }

    /// Content type name of a payload discriminator.
    pub fn name_of(&self, payload: u8) -> StoreResult<&str> {
        self.by_payload
            .get(&payload)
            .map(|t| t.name.as_str())
            .ok_or_else(|| StoreError::UnknownContentType(format!("payload {payload}")))
    }

    /// Registered names in payload order.
    pub fn names(&self) -> Vec<&str> {
        self.by_payload.values().map(|t| t.name.as_str()).collect()
    }

    /// Encode content into a value object.
    pub fn to_value_obj(&self, content: &Content) -> StoreResult<ContentValueObj> {
        let payload = self.payload_of(&content.content_type)?;
        let content_type = &self.by_payload[&payload];
        let data = (content_type.encode)(&content.value).map_err(|reason| {
            StoreError::InvalidContent {
                content_type: content.content_type.clone(),
                reason,
            }
        })?;
        ContentValueObj::new(content.content_id.clone(), payload, data)
    }

    /// Decode a value object into content.
    pub fn from_value_obj(&self, obj: &ContentValueObj) -> StoreResult<Content> {
        let content_type = self
            .by_payload
            .get(&obj.payload)
            .ok_or_else(|| StoreError::UnknownContentType(format!("payload {}", obj.payload)))?;
        let value = (content_type.decode)(&obj.data).map_err(|reason| {
            StoreError::InvalidContent {
                content_type: content_type.name.clone(),
                reason,
            }
        })?;
        Ok(Content {
            content_id: obj.content_id.clone(),
            content_type: content_type.name.clone(),
            value,
        })
    }
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for ContentTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}

fn encode_json_object(value: &serde_json::Value) -> Result<Vec<u8>, String> {
    if !value.is_object() {
        return Err("value must be a JSON object".into());
    }
    serde_json::to_vec(value).map_err(|e| e.to_string())
}

fn decode_json(data: &[u8]) -> Result<serde_json::Value, String> {
    serde_json::from_slice(data).map_err(|e| e.to_string())
}
