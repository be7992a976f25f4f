//! Graph specialization of the report cache
//!
//! Turns an edge-list base table into node, node type, node group, link type,
//! link and summary tables, and reads them back as a [`GraphDocument`].

pub mod attributes;
pub mod builder;
pub mod columns;
pub mod document;
pub mod introspector;
pub mod projection;

use std::sync::Arc;

use serde::Serialize;

pub use attributes::{AttributeSet, OptionalAttribute};
pub use builder::{BuildStep, GraphTableBuilder};
pub use document::GraphDocument;
pub use projection::GraphProjectionReader;

use crate::cache_store::CacheStore;
use crate::config::CacheConfig;
use crate::report_cache::{CacheEntry, CacheError, CachePolicy, ReportCache};
use crate::report_source::ReportQuerySource;

pub type GraphCache = ReportCache<GraphTableBuilder>;

/// A projected document plus the cache entry it was read from
#[derive(Debug, Clone, Serialize)]
pub struct RenderedGraph {
    pub document: GraphDocument,
    pub entry: CacheEntry,
}

impl ReportCache<GraphTableBuilder> {
    pub fn graph(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        ReportCache::new(store, GraphTableBuilder::new(), config)
    }

    /// Open the key's generation, rebuilding if needed, and project it
    pub async fn render(
        &self,
        source: &dyn ReportQuerySource,
        policy: CachePolicy,
    ) -> Result<RenderedGraph, CacheError> {
        let handle = self.open(source, policy).await?;
        let document = GraphProjectionReader::new(self.store().as_ref())
            .project(&handle)
            .await?;
        log::info!(
            "Projected `{}`: {} nodes, {} links",
            handle.key(),
            document.nodes.len(),
            document.links.len()
        );
        Ok(RenderedGraph {
            document,
            entry: handle.entry.clone(),
        })
    }
}
