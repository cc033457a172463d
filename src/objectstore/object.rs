//! Object metadata: the sole source of truth for an object's existence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::headers::NatsHeaders;

/// Default chunk size: 128 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 131_072;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunk_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub name: String,
    pub bucket: String,
    pub nuid: String,
    pub size: u64,
    pub chunks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<NatsHeaders>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ObjectOptions>,
}

impl ObjectMetadata {
    pub fn chunk_size(&self) -> usize {
        self.options
            .as_ref()
            .and_then(|o| o.max_chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE)
    }
}

// `NatsHeaders` doesn't derive `serde` traits (it has its own wire codec);
// object metadata only ever carries caller-supplied headers through as an
// opaque name/value list, so it's encoded that way here too.
impl Serialize for NatsHeaders {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.iter().count()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NatsHeaders {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = HashMap::<String, String>::deserialize(deserializer)?;
        let mut headers = NatsHeaders::new();
        for (k, v) in entries {
            headers.add(k, v);
        }
        Ok(headers)
    }
}
