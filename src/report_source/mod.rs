//! Report Query Source contract
//!
//! A report knows its name, derives a cache key from its parameters and
//! describes how its edge-list (base table) is produced. Materializing that
//! description into a table is the cache's job.

pub mod definition;
pub mod errors;
pub mod key;
pub mod parameters;

use std::collections::BTreeMap;

pub use definition::ReportDefinition;
pub use errors::{ParameterBindingError, ReportSourceError};
pub use key::CacheKey;
pub use parameters::bind_parameters;

use crate::cache_store::Value;
use crate::query_builder::{ColumnDef, Statement, TableDef};

/// Columns every edge-list row must carry
pub const REQUIRED_EDGE_COLUMNS: [&str; 12] = [
    "source_id",
    "source_name",
    "source_type",
    "source_group",
    "source_size",
    "target_id",
    "target_name",
    "target_type",
    "target_group",
    "target_size",
    "weight",
    "link_type",
];

/// Typed inline edge-list
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeList {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

/// How a report's base table is produced
#[derive(Debug, Clone, PartialEq)]
pub enum BaseTableSource {
    /// Report SQL with parameters already bound
    Sql(String),
    Rows(EdgeList),
}

impl BaseTableSource {
    /// Statements that create `table` holding the edge-list
    pub fn statements(&self, table: &str) -> Vec<Statement> {
        match self {
            BaseTableSource::Sql(sql) => vec![Statement::CreateTableAs {
                table: table.to_string(),
                sql: sql.clone(),
            }],
            BaseTableSource::Rows(edges) => {
                let def = TableDef::new(table, edges.columns.clone());
                let columns = def.column_names();
                vec![
                    Statement::CreateTable(def),
                    Statement::InsertValues {
                        table: table.to_string(),
                        columns,
                        rows: edges.rows.clone(),
                    },
                ]
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ReportQuerySource: Send + Sync {
    fn report_name(&self) -> &str;

    fn report_description(&self) -> &str;

    /// Stable for identical parameters
    fn cache_key(&self) -> Result<CacheKey, ReportSourceError>;

    fn base_table(&self) -> Result<BaseTableSource, ReportSourceError>;
}

/// Report backed by a parameterized ClickHouse `SELECT`
#[derive(Debug, Clone)]
pub struct SqlReport {
    pub name: String,
    pub description: String,
    pub class: String,
    pub sql: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ReportQuerySource for SqlReport {
    fn report_name(&self) -> &str {
        &self.name
    }

    fn report_description(&self) -> &str {
        &self.description
    }

    fn cache_key(&self) -> Result<CacheKey, ReportSourceError> {
        Ok(CacheKey::derive(&self.class, &self.parameters))
    }

    fn base_table(&self) -> Result<BaseTableSource, ReportSourceError> {
        let sql = bind_parameters(&self.sql, &self.parameters).map_err(|source| {
            ReportSourceError::Parameter {
                report: self.name.clone(),
                source,
            }
        })?;
        Ok(BaseTableSource::Sql(sql))
    }
}

/// Report whose edge-list is given inline
#[derive(Debug, Clone)]
pub struct EdgeListReport {
    pub name: String,
    pub description: String,
    pub class: String,
    pub edges: EdgeList,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl EdgeListReport {
    /// Fails when a required edge column is missing
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        edges: EdgeList,
    ) -> Result<Self, ReportSourceError> {
        let name = name.into();
        for required in REQUIRED_EDGE_COLUMNS {
            if !edges.columns.iter().any(|c| c.name.eq_ignore_ascii_case(required)) {
                return Err(ReportSourceError::MissingColumn {
                    report: name,
                    column: required.to_string(),
                });
            }
        }
        Ok(Self {
            class: name.clone(),
            name,
            description: description.into(),
            edges,
            parameters: BTreeMap::new(),
        })
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

impl ReportQuerySource for EdgeListReport {
    fn report_name(&self) -> &str {
        &self.name
    }

    fn report_description(&self) -> &str {
        &self.description
    }

    fn cache_key(&self) -> Result<CacheKey, ReportSourceError> {
        Ok(CacheKey::derive(&self.class, &self.parameters))
    }

    fn base_table(&self) -> Result<BaseTableSource, ReportSourceError> {
        Ok(BaseTableSource::Rows(self.edges.clone()))
    }
}
