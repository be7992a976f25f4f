use std::time::Duration;

use thiserror::Error;

use crate::cache_store::StoreError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Report source for `{report}` is unavailable: {message}")]
    SourceUnavailable { report: String, message: String },

    #[error("Cache build step `{step}` failed: {source}\nOffending statement:\n{statement}")]
    BuildStep {
        step: &'static str,
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("Integrity violation during `{step}` on `{table}`: {source}\nOffending statement:\n{statement}")]
    IntegrityViolation {
        step: &'static str,
        table: String,
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("Rebuild of `{key}` did not finish within {timeout:?}")]
    Timeout { key: String, timeout: Duration },

    #[error("`{key}` is not cached and the cache policy forbids rebuilding")]
    NotCached { key: String },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Failed to publish generation for `{key}`: {source}")]
    Publish {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to read `{table}`: {source}")]
    Projection {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CacheError {
    pub fn projection(table: impl Into<String>, source: StoreError) -> Self {
        CacheError::Projection {
            table: table.into(),
            source,
        }
    }

    /// Label of the failed build step, if the failure came from one
    pub fn step(&self) -> Option<&'static str> {
        match self {
            CacheError::BuildStep { step, .. } | CacheError::IntegrityViolation { step, .. } => {
                Some(*step)
            }
            _ => None,
        }
    }
}
