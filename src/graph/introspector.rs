use std::collections::HashMap;

use super::attributes::{AttributeSet, OptionalAttribute};
use crate::cache_store::CacheStore;

/// Column prefix of one endpoint in a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
    /// Columns of the derived nodes table
    Node,
}

impl Side {
    pub fn prefix(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
            Side::Node => "node",
        }
    }

    pub fn column(&self, field: &str) -> String {
        format!("{}_{}", self.prefix(), field)
    }
}

/// What the introspector found in one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedSchema {
    pub attributes: AttributeSet,
    /// Lowercase column name to physical column name
    columns: HashMap<String, String>,
}

impl DetectedSchema {
    pub fn from_columns(columns: &[String], sides: &[Side]) -> Self {
        let columns: HashMap<String, String> = columns
            .iter()
            .map(|c| (c.to_lowercase(), c.clone()))
            .collect();
        let attributes = OptionalAttribute::ALL
            .into_iter()
            .filter(|a| {
                sides
                    .iter()
                    .any(|s| columns.contains_key(&s.column(a.name())))
            })
            .collect();
        Self {
            attributes,
            columns,
        }
    }

    /// Physical name of a column, matched case-insensitively
    pub fn physical(&self, column: &str) -> Option<&str> {
        self.columns.get(&column.to_lowercase()).map(String::as_str)
    }
}

pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Inspect `table`; an uninspectable table yields the empty schema
    pub async fn inspect(store: &dyn CacheStore, table: &str, sides: &[Side]) -> DetectedSchema {
        match store.columns(table).await {
            Ok(columns) => {
                let detected = DetectedSchema::from_columns(&columns, sides);
                log::debug!(
                    "Detected optional attributes {:?} in `{}`",
                    detected.attributes,
                    table
                );
                detected
            }
            Err(e) => {
                log::warn!(
                    "Schema detection on `{}` failed, continuing without optional attributes: {}",
                    table,
                    e
                );
                DetectedSchema::default()
            }
        }
    }

    pub async fn detect(store: &dyn CacheStore, table: &str, sides: &[Side]) -> AttributeSet {
        Self::inspect(store, table, sides).await.attributes
    }
}
