//! YAML report definitions
//!
//! ```yaml
//! name: Supplier network
//! description: Suppliers and the plants they ship to
//! class: supplier_network
//! parameters:
//!   region: EU
//! sql: |
//!   SELECT ... FROM shipments WHERE region = $region
//! ```
//!
//! `rows:` may replace `sql:` with an inline list of edge-list objects.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::errors::ReportSourceError;
use super::{EdgeList, EdgeListReport, ReportQuerySource, SqlReport};
use crate::cache_store::Value;
use crate::query_builder::{ColumnDef, ColumnType};

#[derive(Debug, Clone, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Key namespace; defaults to `name`
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub rows: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ReportDefinition {
    pub fn from_yaml_str(content: &str) -> Result<Self, ReportSourceError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ReportSourceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// True when the edge-list is inline and needs no database
    pub fn is_inline(&self) -> bool {
        self.rows.is_some()
    }

    /// Build the report with `overrides` layered over the default parameters
    pub fn into_source(
        self,
        overrides: BTreeMap<String, serde_json::Value>,
    ) -> Result<Box<dyn ReportQuerySource>, ReportSourceError> {
        let mut parameters = self.parameters;
        parameters.extend(overrides);
        let class = self.class.unwrap_or_else(|| self.name.clone());

        match (self.sql, self.rows) {
            (Some(sql), None) => Ok(Box::new(SqlReport {
                name: self.name,
                description: self.description,
                class,
                sql,
                parameters,
            })),
            (None, Some(rows)) => {
                let edges = edge_list_from_json(&rows)?;
                let report = EdgeListReport::new(self.name, self.description, edges)?
                    .with_class(class)
                    .with_parameters(parameters);
                Ok(Box::new(report))
            }
            (Some(_), Some(_)) => Err(ReportSourceError::Definition(format!(
                "report `{}` sets both `sql` and `rows`",
                self.name
            ))),
            (None, None) => Err(ReportSourceError::Definition(format!(
                "report `{}` needs either `sql` or `rows`",
                self.name
            ))),
        }
    }
}

/// Column type for a known edge-list column, if it has a fixed one
fn fixed_type(column: &str) -> Option<ColumnType> {
    match column {
        "source_size" | "target_size" => Some(ColumnType::Int64),
        "weight" | "source_latitude" | "target_latitude" | "source_longitude"
        | "target_longitude" => Some(ColumnType::Float64),
        "source_id" | "source_name" | "source_type" | "source_group" | "target_id"
        | "target_name" | "target_type" | "target_group" | "link_type" => Some(ColumnType::String),
        _ => None,
    }
}

fn infer_type(values: &[Value]) -> ColumnType {
    let mut all_int = true;
    let mut all_number = true;
    let mut any = false;
    for value in values.iter().filter(|v| !v.is_null()) {
        any = true;
        match value {
            Value::Int(_) => {}
            Value::Float(_) => all_int = false,
            _ => {
                all_int = false;
                all_number = false;
            }
        }
    }
    match (any, all_int, all_number) {
        (false, _, _) => ColumnType::String,
        (true, true, _) => ColumnType::Int64,
        (true, false, true) => ColumnType::Float64,
        _ => ColumnType::String,
    }
}

/// Column order follows first appearance across rows
fn edge_list_from_json(
    rows: &[serde_json::Map<String, serde_json::Value>],
) -> Result<EdgeList, ReportSourceError> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for name in row.keys() {
            let lowered = name.to_lowercase();
            if !names.contains(&lowered) {
                names.push(lowered);
            }
        }
    }

    let mut cells: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    for row in rows {
        let lowered: BTreeMap<String, &serde_json::Value> =
            row.iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
        cells.push(
            names
                .iter()
                .map(|n| lowered.get(n).map(|v| Value::from_json(v)).unwrap_or(Value::Null))
                .collect(),
        );
    }

    let mut columns = Vec::with_capacity(names.len());
    for (position, name) in names.iter().enumerate() {
        let values: Vec<Value> = cells.iter().map(|row| row[position].clone()).collect();
        let data_type = fixed_type(name).unwrap_or_else(|| infer_type(&values));
        let nullable = values.iter().any(Value::is_null);
        columns.push(if nullable {
            ColumnDef::nullable(name.clone(), data_type)
        } else {
            ColumnDef::new(name.clone(), data_type)
        });
    }

    Ok(EdgeList {
        columns,
        rows: cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_source::BaseTableSource;
    use std::io::Write;

    const INLINE: &str = r#"
name: Tiny
rows:
  - {source_id: A, source_name: Alpha, source_type: t1, source_group: g1, source_size: 3,
     target_id: B, target_name: Beta, target_type: t1, target_group: g1, target_size: 0,
     weight: 2, link_type: L1, source_img: a.png}
  - {source_id: B, source_name: Beta, source_type: t1, source_group: g1, source_size: 0,
     target_id: C, target_name: Gamma, target_type: t2, target_group: g2, target_size: 1,
     weight: 3.5, link_type: L1}
"#;

    #[test]
    fn test_inline_rows_become_typed_edge_list() {
        let definition = ReportDefinition::from_yaml_str(INLINE).unwrap();
        assert!(definition.is_inline());
        let source = definition.into_source(BTreeMap::new()).unwrap();
        assert_eq!(source.report_name(), "Tiny");

        let edges = match source.base_table().unwrap() {
            BaseTableSource::Rows(edges) => edges,
            other => panic!("expected rows, got {:?}", other),
        };
        let weight = edges.columns.iter().find(|c| c.name == "weight").unwrap();
        assert_eq!(weight.data_type, ColumnType::Float64);
        let img = edges.columns.iter().find(|c| c.name == "source_img").unwrap();
        assert!(img.nullable);
        assert_eq!(edges.rows.len(), 2);
    }

    #[test]
    fn test_sql_definition_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name: Net\nclass: net\nparameters:\n  day: 2024-01-01\nsql: SELECT * FROM e WHERE d = $day"
        )
        .unwrap();

        let definition = ReportDefinition::from_yaml_file(file.path()).unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("day".to_string(), serde_json::json!("2024-02-02"));
        let source = definition.into_source(overrides).unwrap();
        assert_eq!(
            source.base_table().unwrap(),
            BaseTableSource::Sql("SELECT * FROM e WHERE d = '2024-02-02'".to_string())
        );
        assert!(source.cache_key().unwrap().as_str().starts_with("net_"));
    }

    #[test]
    fn test_definition_needs_exactly_one_source() {
        let neither = ReportDefinition::from_yaml_str("name: Empty").unwrap();
        assert!(matches!(
            neither.into_source(BTreeMap::new()),
            Err(ReportSourceError::Definition(_))
        ));
    }

    #[test]
    fn test_inferred_types() {
        assert_eq!(infer_type(&[Value::Int(1), Value::Null]), ColumnType::Int64);
        assert_eq!(infer_type(&[Value::Int(1), Value::Float(0.5)]), ColumnType::Float64);
        assert_eq!(infer_type(&[Value::Null]), ColumnType::String);
    }
}
