//! Node column model
//!
//! One place decides which node columns exist for a generation. The nodes
//! table definition, both per-side projections, their GROUP BY lists and the
//! outer union select are all derived from it.

use super::attributes::{AttributeSet, OptionalAttribute};
use super::introspector::{DetectedSchema, Side};
use crate::cache_store::Value;
use crate::query_builder::{ColumnDef, ColumnType, Expr, Query, Select, TableDef};

/// Node size used when a node's largest size is not positive
pub const DEFAULT_NODE_SIZE: i64 = 50;

/// `(edge field, node column)` for the required node columns, size excluded
const KEY_FIELDS: [(&str, &str); 4] = [
    ("id", "node_id"),
    ("name", "node_name"),
    ("type", "node_type"),
    ("group", "node_group"),
];

#[derive(Debug, Clone)]
pub struct NodeColumns {
    detected: DetectedSchema,
}

impl NodeColumns {
    /// Model for a base table inspected on both sides
    pub fn new(detected: DetectedSchema) -> Self {
        Self { detected }
    }

    pub fn attributes(&self) -> AttributeSet {
        self.detected.attributes
    }

    pub fn attribute_column(attribute: OptionalAttribute) -> String {
        Side::Node.column(attribute.name())
    }

    /// Physical name of a base table column, matched case-insensitively
    pub fn physical(&self, column: &str) -> String {
        self.detected
            .physical(column)
            .map(str::to_string)
            .unwrap_or_else(|| column.to_string())
    }

    pub fn base_column(&self, side: Side, field: &str) -> String {
        self.physical(&side.column(field))
    }

    /// Nodes table columns in insert order
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![
            "id".to_string(),
            "node_id".to_string(),
            "node_name".to_string(),
            "node_size".to_string(),
            "node_type".to_string(),
            "node_group".to_string(),
        ];
        names.extend(self.attributes().iter().map(Self::attribute_column));
        names
    }

    pub fn table_def(&self, name: impl Into<String>) -> TableDef {
        let mut columns = vec![
            ColumnDef::new("id", ColumnType::Int64),
            ColumnDef::nullable("node_id", ColumnType::String),
            ColumnDef::nullable("node_name", ColumnType::String),
            ColumnDef::new("node_size", ColumnType::Int64),
            ColumnDef::new("node_type", ColumnType::String),
            ColumnDef::new("node_group", ColumnType::String),
        ];
        for attribute in self.attributes().iter() {
            let name = Self::attribute_column(attribute);
            columns.push(if attribute.keeps_null() {
                ColumnDef::nullable(name, attribute.column_type())
            } else {
                ColumnDef::new(name, attribute.column_type())
            });
        }
        TableDef::new(name, columns).ordered_by("id")
    }

    /// Distinct nodes of one side of the edge-list
    pub fn side_select(&self, side: Side, base_table: &str) -> Select {
        let size = Expr::col(self.base_column(side, "size"));
        let mut select = Select::from_table(base_table);
        for (field, alias) in KEY_FIELDS {
            select = select.column(Expr::col(self.base_column(side, field)), alias);
            if field == "name" {
                select = select.column(
                    Expr::if_then(
                        Expr::greater(Expr::max(size.clone()), Expr::lit(0_i64)),
                        Expr::max(size.clone()),
                        Expr::lit(DEFAULT_NODE_SIZE),
                    ),
                    "node_size",
                );
            }
        }
        for (field, _) in KEY_FIELDS {
            select = select.group_by(Expr::col(self.base_column(side, field)));
        }

        // attributes are aggregated, never grouped; a missing side yields NULL
        for attribute in self.attributes().iter() {
            let alias = Self::attribute_column(attribute);
            let expr = match self.detected.physical(&side.column(attribute.name())) {
                Some(column) => Expr::max(Expr::col(column)),
                None => Expr::Literal(Value::Null),
            };
            select = select.column(expr, alias);
        }
        select
    }

    /// Union of both sides regrouped by natural key, with dense ids
    pub fn union_select(&self, base_table: &str) -> Select {
        let union = Query::union_distinct(vec![
            self.side_select(Side::Source, base_table).into(),
            self.side_select(Side::Target, base_table).into(),
        ]);

        let mut select = Select::from_subquery(union, "node_union")
            .column(Expr::RowIndex, "id")
            .column(Expr::col("node_id"), "node_id")
            .column(Expr::col("node_name"), "node_name")
            .column(Expr::max(Expr::col("node_size")), "max_node_size")
            .column(Expr::col("node_type"), "node_type")
            .column(Expr::col("node_group"), "node_group");
        for (_, column) in KEY_FIELDS {
            select = select.group_by(Expr::col(column));
        }
        for attribute in self.attributes().iter() {
            let column = Self::attribute_column(attribute);
            let merged = Expr::max(Expr::col(column.clone()));
            let expr = if attribute.keeps_null() {
                merged
            } else {
                Expr::if_null(merged, attribute.default_value())
            };
            select = select.column(expr, format!("merged_{}", column));
        }
        select.order_by(Expr::col("node_id"))
    }
}
