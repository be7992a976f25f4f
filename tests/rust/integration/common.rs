use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graphcache::cache_store::{MemoryStore, Value};
use graphcache::config::CacheConfig;
use graphcache::graph::{GraphCache, GraphTableBuilder};
use graphcache::query_builder::{ColumnDef, ColumnType};
use graphcache::report_cache::{FreshnessDecider, ReportCache};
use graphcache::report_source::{
    BaseTableSource, CacheKey, EdgeList, EdgeListReport, ReportQuerySource, ReportSourceError,
    REQUIRED_EDGE_COLUMNS,
};

/// One edge-list row, required columns only
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: &'static str,
    pub target: &'static str,
    pub source_type: &'static str,
    pub target_type: &'static str,
    pub source_group: &'static str,
    pub target_group: &'static str,
    pub source_size: i64,
    pub target_size: i64,
    pub link_type: &'static str,
    pub weight: f64,
}

impl Edge {
    pub fn new(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            source_type: "t1",
            target_type: "t1",
            source_group: "g1",
            target_group: "g1",
            source_size: 0,
            target_size: 0,
            link_type: "L1",
            weight: 1.0,
        }
    }

    pub fn types(mut self, source: &'static str, target: &'static str) -> Self {
        self.source_type = source;
        self.target_type = target;
        self
    }

    pub fn groups(mut self, source: &'static str, target: &'static str) -> Self {
        self.source_group = source;
        self.target_group = target;
        self
    }

    pub fn sizes(mut self, source: i64, target: i64) -> Self {
        self.source_size = source;
        self.target_size = target;
        self
    }

    pub fn link(mut self, link_type: &'static str, weight: f64) -> Self {
        self.link_type = link_type;
        self.weight = weight;
        self
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.source),
            Value::from(format!("{} name", self.source)),
            Value::from(self.source_type),
            Value::from(self.source_group),
            Value::Int(self.source_size),
            Value::from(self.target),
            Value::from(format!("{} name", self.target)),
            Value::from(self.target_type),
            Value::from(self.target_group),
            Value::Int(self.target_size),
            Value::Float(self.weight),
            Value::from(self.link_type),
        ]
    }
}

fn required_columns() -> Vec<ColumnDef> {
    REQUIRED_EDGE_COLUMNS
        .iter()
        .map(|name| {
            let data_type = match *name {
                "source_size" | "target_size" => ColumnType::Int64,
                "weight" => ColumnType::Float64,
                _ => ColumnType::String,
            };
            ColumnDef::new(*name, data_type)
        })
        .collect()
}

pub fn edge_report(name: &str, edges: &[Edge]) -> EdgeListReport {
    edge_report_with(name, edges, vec![], vec![])
}

/// Edge report with extra optional columns appended to every row
pub fn edge_report_with(
    name: &str,
    edges: &[Edge],
    extra_columns: Vec<ColumnDef>,
    extra_values: Vec<Vec<Value>>,
) -> EdgeListReport {
    let mut columns = required_columns();
    columns.extend(extra_columns);
    let rows = edges
        .iter()
        .enumerate()
        .map(|(i, edge)| {
            let mut row = edge.values();
            if let Some(extra) = extra_values.get(i) {
                row.extend(extra.iter().cloned());
            }
            row
        })
        .collect();
    EdgeListReport::new(name, format!("{} description", name), EdgeList { columns, rows })
        .unwrap()
}

/// Edge report whose column names are all uppercase
pub fn uppercase_edge_report(name: &str, edges: &[Edge]) -> EdgeListReport {
    let columns = required_columns()
        .into_iter()
        .map(|c| ColumnDef::new(c.name.to_uppercase(), c.data_type))
        .collect();
    let rows = edges.iter().map(Edge::values).collect();
    EdgeListReport::new(name, format!("{} description", name), EdgeList { columns, rows })
        .unwrap()
}

/// The two-edge report used throughout: A->B and B->C
pub fn example_report() -> EdgeListReport {
    edge_report(
        "example",
        &[
            Edge::new("A", "B").types("t1", "t1").sizes(3, 0).link("L1", 2.0),
            Edge::new("B", "C")
                .types("t1", "t2")
                .groups("g1", "g2")
                .link("L1", 3.0),
        ],
    )
}

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn graph_cache(store: &Arc<MemoryStore>) -> GraphCache {
    GraphCache::graph(store.clone(), &CacheConfig::default())
}

pub fn graph_cache_with_timeout(store: &Arc<MemoryStore>, timeout: Duration) -> GraphCache {
    ReportCache::with_settings(
        store.clone(),
        GraphTableBuilder::new(),
        FreshnessDecider::new(Duration::from_secs(3600), true),
        timeout,
    )
}

/// Wraps a report and counts base table requests, i.e. rebuilds
pub struct CountingSource {
    inner: EdgeListReport,
    rebuilds: AtomicUsize,
}

impl CountingSource {
    pub fn new(inner: EdgeListReport) -> Self {
        Self {
            inner,
            rebuilds: AtomicUsize::new(0),
        }
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }
}

impl ReportQuerySource for CountingSource {
    fn report_name(&self) -> &str {
        self.inner.report_name()
    }

    fn report_description(&self) -> &str {
        self.inner.report_description()
    }

    fn cache_key(&self) -> Result<CacheKey, ReportSourceError> {
        self.inner.cache_key()
    }

    fn base_table(&self) -> Result<BaseTableSource, ReportSourceError> {
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        self.inner.base_table()
    }
}
