use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::errors::ReportSourceError;
use crate::query_builder::to_sql::is_valid_identifier;

const MAX_SLUG_LEN: usize = 48;

/// Identifier of one (report class, parameters) materialization
///
/// Always a valid table-name identifier; it is the base table's name and the
/// suffix of every derived table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `<slug>_<16 hex chars>` from the report class and its parameters
    ///
    /// Parameter order never matters: objects are canonicalized with sorted keys
    /// before hashing.
    pub fn derive(report_class: &str, params: &BTreeMap<String, serde_json::Value>) -> Self {
        let mut canonical_params = serde_json::Map::new();
        for (name, value) in params {
            canonical_params.insert(name.clone(), canonical(value));
        }
        let payload = serde_json::Value::Object(canonical_params).to_string();

        let mut hasher = Sha256::new();
        hasher.update(report_class.as_bytes());
        hasher.update(payload.as_bytes());
        let digest = hex::encode(hasher.finalize());

        CacheKey(format!("{}_{}", slug(report_class), &digest[..16]))
    }

    /// Accept a caller-supplied key after validating it
    pub fn parse(raw: &str) -> Result<Self, ReportSourceError> {
        if is_valid_identifier(raw) {
            Ok(CacheKey(raw.to_string()))
        } else {
            Err(ReportSourceError::InvalidKey(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CacheKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

fn slug(report_class: &str) -> String {
    let mut out = String::with_capacity(report_class.len());
    for ch in report_class.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed: String = out.trim_matches('_').chars().take(MAX_SLUG_LEN).collect();
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed
    }
}

fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, &serde_json::Value> = map.iter().collect();
            let mut out = serde_json::Map::new();
            for (name, inner) in sorted {
                out.insert(name.clone(), canonical(inner));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical).collect())
        }
        other => other.clone(),
    }
}
