use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::errors::CacheError;
use crate::report_source::CacheKey;

/// Cache control strategy for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Normal cache behavior - reuse if present and not expired
    #[default]
    Default,
    /// Always rebuild - useful for debugging or cache warming
    Force,
    /// Never rebuild - error if not cached, serve expired entries
    Skip,
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(CachePolicy::Default),
            "force" => Ok(CachePolicy::Force),
            "skip" => Ok(CachePolicy::Skip),
            other => Err(format!(
                "unknown cache policy `{}` (expected default, force or skip)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Missing,
    Expired,
    Forced,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Rebuild(RebuildReason),
}

/// Lifecycle metadata of one key, as observed by this request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub base_table_name: String,
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(rename = "expire_time_secs", serialize_with = "serialize_secs")]
    pub expire_time: Duration,
    pub generated_this_request: bool,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.generated_at
            .map(|at| (now - at).to_std().unwrap_or(Duration::ZERO))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessDecider {
    expire_time: Duration,
    cache_enabled: bool,
}

impl FreshnessDecider {
    pub fn new(expire_time: Duration, cache_enabled: bool) -> Self {
        Self {
            expire_time,
            cache_enabled,
        }
    }

    pub fn expire_time(&self) -> Duration {
        self.expire_time
    }

    /// Decide for `key` given what the store reported about its live tables
    ///
    /// A missing timestamp counts as expired.
    pub fn resolve(
        &self,
        key: &CacheKey,
        policy: CachePolicy,
        exists: bool,
        generated_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Freshness, CacheError> {
        match policy {
            CachePolicy::Force => Ok(Freshness::Rebuild(RebuildReason::Forced)),
            CachePolicy::Skip if exists => Ok(Freshness::Fresh),
            CachePolicy::Skip => Err(CacheError::NotCached {
                key: key.to_string(),
            }),
            CachePolicy::Default => {
                if !exists {
                    return Ok(Freshness::Rebuild(RebuildReason::Missing));
                }
                if !self.cache_enabled {
                    return Ok(Freshness::Rebuild(RebuildReason::Disabled));
                }
                let expired = match generated_at {
                    Some(at) => (now - at).to_std().unwrap_or(Duration::ZERO) > self.expire_time,
                    None => true,
                };
                Ok(if expired {
                    Freshness::Rebuild(RebuildReason::Expired)
                } else {
                    Freshness::Fresh
                })
            }
        }
    }
}
