use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::core::Document;

const SCHEMA: &str = "winkdown";
const VERSION: u32 = 1;

fn default_schema() -> String {
    SCHEMA.to_string()
}

fn default_version() -> u32 {
    VERSION
}

/// Persisted form of a document: the node tree plus a schema marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinkdownValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub document: Document,
}

impl WinkdownValue {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            document,
        }
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(s)?.checked()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<Self>(value)?.checked()
    }

    /// Rejects other schemas and versions newer than this crate writes.
    fn checked(self) -> Result<Self, serde_json::Error> {
        if self.schema != SCHEMA {
            return Err(serde_json::Error::custom(format!(
                "unsupported schema {:?}",
                self.schema
            )));
        }
        if self.version > VERSION {
            return Err(serde_json::Error::custom(format!(
                "unsupported version {}",
                self.version
            )));
        }
        Ok(self)
    }
}
