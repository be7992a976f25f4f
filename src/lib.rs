//! graphcache - Cached graph reports over ClickHouse
//!
//! This crate turns a report's edge-list into a persistent, versioned set of
//! derived graph tables and reads them back as a JSON graph document:
//! - Freshness decisions per cache key (expire time, force, skip)
//! - Typed query model rendered to ClickHouse SQL
//! - Staged rebuilds published over the live tables
//! - An in-process store evaluating the same queries for tests and inline reports

pub mod cache_store;
pub mod config;
pub mod graph;
pub mod query_builder;
pub mod report_cache;
pub mod report_source;

pub use cache_store::{CacheStore, ClickHouseStore, MemoryStore};
pub use config::CacheConfig;
pub use graph::{GraphCache, GraphDocument, RenderedGraph};
pub use report_cache::{CacheError, CachePolicy};
