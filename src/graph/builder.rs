use std::time::Instant;

use async_trait::async_trait;

use super::attributes::AttributeSet;
use super::columns::NodeColumns;
use super::introspector::{SchemaIntrospector, Side};
use crate::cache_store::{CacheStore, StoreError, Value};
use crate::query_builder::{
    ColumnDef, ColumnType, Expr, JoinKind, Query, Select, Statement, TableDef,
};
use crate::report_cache::{render, CacheError, DerivedTableBuilder, TableSet};

pub const NODES: &str = "nodes";
pub const NODE_TYPES: &str = "node_types";
pub const NODE_GROUPS: &str = "node_groups";
pub const LINK_TYPES: &str = "link_types";
pub const LINKS: &str = "links";
pub const SUMMARY: &str = "summary";

const GRAPH_TABLES: [&str; 6] = [NODES, NODE_TYPES, NODE_GROUPS, LINK_TYPES, LINKS, SUMMARY];

/// One labeled statement of a graph build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildStep {
    pub label: &'static str,
    pub statement: Statement,
}

impl BuildStep {
    fn new(label: &'static str, statement: Statement) -> Self {
        Self { label, statement }
    }
}

/// Builds nodes, node types, node groups, link types, links and summary
/// tables from an edge-list base table
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphTableBuilder;

impl GraphTableBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Every statement of a build in execution order, except the final
    /// processing-time row which depends on how long the rest took
    pub fn plan(&self, tables: &TableSet, columns: &NodeColumns) -> Vec<BuildStep> {
        let base = tables.base();
        let nodes = tables.derived(NODES);
        let node_types = tables.derived(NODE_TYPES);
        let node_groups = tables.derived(NODE_GROUPS);
        let link_types = tables.derived(LINK_TYPES);
        let links = tables.derived(LINKS);
        let summary = tables.derived(SUMMARY);

        let mut steps = Vec::new();

        // nodes
        steps.push(BuildStep::new(
            "create node table",
            Statement::CreateTable(columns.table_def(nodes.as_str())),
        ));
        steps.push(BuildStep::new(
            "populate node table",
            Statement::InsertSelect {
                table: nodes.clone(),
                columns: columns.column_names(),
                query: columns.union_select(&base).into(),
            },
        ));
        steps.push(BuildStep::new(
            "enforce unique node_id",
            Statement::AssertUnique {
                table: nodes.clone(),
                columns: vec!["node_id".to_string()],
            },
        ));

        // node types and groups
        for (table, name_column, field, create_label, populate_label) in [
            (
                &node_types,
                "node_type",
                "type",
                "create node type table",
                "populate node type table",
            ),
            (
                &node_groups,
                "group_name",
                "group",
                "create node group table",
                "populate node group table",
            ),
        ] {
            steps.push(BuildStep::new(
                create_label,
                Statement::CreateTable(lookup_table(table, name_column, "count_distinct_node")),
            ));
            steps.push(BuildStep::new(
                populate_label,
                Statement::InsertSelect {
                    table: table.clone(),
                    columns: lookup_columns(name_column, "count_distinct_node"),
                    query: membership_select(&base, columns, field, name_column).into(),
                },
            ));
        }

        // link types
        steps.push(BuildStep::new(
            "create link type table",
            Statement::CreateTable(lookup_table(&link_types, "link_type", "count_distinct_link")),
        ));
        steps.push(BuildStep::new(
            "populate link type table",
            Statement::InsertSelect {
                table: link_types.clone(),
                columns: lookup_columns("link_type", "count_distinct_link"),
                query: Select::from_table(base.as_str())
                    .column(Expr::RowIndex, "id")
                    .column(Expr::col(columns.physical("link_type")), "link_type")
                    .column(Expr::count_distinct(edge_endpoints(columns)), "link_count")
                    .group_by(Expr::col(columns.physical("link_type")))
                    .order_by(Expr::col(columns.physical("link_type")))
                    .into(),
            },
        ));

        // links
        let links_def = TableDef::new(
            links.as_str(),
            vec![
                ColumnDef::new("source", ColumnType::Int64),
                ColumnDef::new("target", ColumnType::Int64),
                ColumnDef::new("weight", ColumnType::Float64),
                ColumnDef::new("link_type", ColumnType::Int64),
            ],
        )
        .ordered_by("source")
        .ordered_by("target")
        .ordered_by("link_type");
        steps.push(BuildStep::new(
            "create links table",
            Statement::CreateTable(links_def),
        ));
        steps.push(BuildStep::new(
            "populate links table",
            Statement::InsertSelect {
                table: links.clone(),
                columns: vec![
                    "source".to_string(),
                    "target".to_string(),
                    "weight".to_string(),
                    "link_type".to_string(),
                ],
                query: links_select(&base, columns, &nodes, &link_types).into(),
            },
        ));

        // summary
        let summary_def = TableDef::new(
            summary.as_str(),
            vec![
                ColumnDef::new("position", ColumnType::Int64),
                ColumnDef::new("summary_key", ColumnType::String),
                ColumnDef::new("summary_value", ColumnType::String),
            ],
        )
        .ordered_by("position");
        steps.push(BuildStep::new(
            "create summary table",
            Statement::CreateTable(summary_def),
        ));
        let counts: [(&'static str, &'static str, &String, Vec<Expr>); 4] = [
            ("add group count", "group_count", &node_groups, vec![Expr::col("group_name")]),
            ("add type count", "type_count", &node_types, vec![Expr::col("node_type")]),
            ("add node count", "nodes_count", &nodes, vec![Expr::col("id")]),
            ("add link count", "links_count", &base, edge_endpoints(columns)),
        ];
        for (position, (label, key, table, distinct)) in counts.into_iter().enumerate() {
            steps.push(BuildStep::new(
                label,
                Statement::InsertSelect {
                    table: summary.clone(),
                    columns: summary_columns(),
                    query: Select::from_table(table.as_str())
                        .column(Expr::lit(position as i64), "position")
                        .column(Expr::lit(key), "summary_key")
                        .column(
                            Expr::to_text(Expr::count_distinct(distinct)),
                            "summary_value",
                        )
                        .into(),
                },
            ));
        }

        steps
    }

    fn processing_time_step(tables: &TableSet, seconds: f64) -> BuildStep {
        BuildStep::new(
            "add processing time",
            Statement::InsertValues {
                table: tables.derived(SUMMARY),
                columns: summary_columns(),
                rows: vec![vec![
                    Value::Int(4),
                    Value::from("seconds_to_process"),
                    Value::String(format!("{:.3}", seconds)),
                ]],
            },
        )
    }

    async fn run_step(store: &dyn CacheStore, step: &BuildStep) -> Result<(), CacheError> {
        log::debug!("Graph cache step `{}`", step.label);
        store.execute(&step.statement).await.map_err(|source| {
            let statement = render(&step.statement);
            log::error!(
                "Graph cache step `{}` failed. Statement was:\n{}\nError: {}",
                step.label,
                statement,
                source
            );
            match source {
                StoreError::UniqueViolation { .. } => CacheError::IntegrityViolation {
                    step: step.label,
                    table: step.statement.target_table().to_string(),
                    statement,
                    source,
                },
                _ => CacheError::BuildStep {
                    step: step.label,
                    statement,
                    source,
                },
            }
        })
    }
}

fn lookup_table(table: &str, name_column: &str, count_column: &str) -> TableDef {
    TableDef::new(
        table,
        vec![
            ColumnDef::new("id", ColumnType::Int64),
            ColumnDef::new(name_column, ColumnType::String),
            ColumnDef::new(count_column, ColumnType::Int64),
        ],
    )
    .ordered_by("id")
}

fn lookup_columns(name_column: &str, count_column: &str) -> Vec<String> {
    vec![
        "id".to_string(),
        name_column.to_string(),
        count_column.to_string(),
    ]
}

fn summary_columns() -> Vec<String> {
    vec![
        "position".to_string(),
        "summary_key".to_string(),
        "summary_value".to_string(),
    ]
}

/// `(source_id, target_id)` of the base table
fn edge_endpoints(columns: &NodeColumns) -> Vec<Expr> {
    vec![
        Expr::col(columns.base_column(Side::Source, "id")),
        Expr::col(columns.base_column(Side::Target, "id")),
    ]
}

/// Distinct `(field, node)` pairs over both sides, counted per field value
fn membership_select(
    base: &str,
    columns: &NodeColumns,
    field: &str,
    name_column: &str,
) -> Select {
    let branch = |side: Side| -> Query {
        Select::from_table(base)
            .distinct()
            .column(Expr::col(columns.base_column(side, field)), name_column)
            .column(Expr::col(columns.base_column(side, "id")), "node_id")
            .into()
    };
    let merged = Query::union_distinct(vec![branch(Side::Source), branch(Side::Target)]);

    Select::from_subquery(merged, "merged_membership")
        .column(Expr::RowIndex, "id")
        .column(Expr::col(name_column), name_column)
        .column(Expr::count_distinct(vec![Expr::col("node_id")]), "node_count")
        .group_by(Expr::col(name_column))
        .order_by(Expr::col(name_column))
}

/// Base edges resolved to node and link type ids, one row per
/// `(source, target, link_type)`
fn links_select(base: &str, columns: &NodeColumns, nodes: &str, link_types: &str) -> Select {
    let edge = |field: &str| Expr::qualified("graph", columns.physical(field));
    Select::from_aliased(base, "graph")
        .column(Expr::qualified("source_nodes", "id"), "source_index")
        .column(Expr::qualified("target_nodes", "id"), "target_index")
        .column(Expr::any(edge("weight")), "link_weight")
        .column(Expr::qualified("link_type_lookup", "id"), "link_type_index")
        .join(
            JoinKind::Inner,
            nodes,
            "source_nodes",
            vec![(
                Expr::qualified("source_nodes", "node_id"),
                edge("source_id"),
            )],
        )
        .join(
            JoinKind::Inner,
            nodes,
            "target_nodes",
            vec![(
                Expr::qualified("target_nodes", "node_id"),
                edge("target_id"),
            )],
        )
        .join(
            JoinKind::Inner,
            link_types,
            "link_type_lookup",
            vec![(
                Expr::qualified("link_type_lookup", "link_type"),
                edge("link_type"),
            )],
        )
        .group_by(Expr::qualified("source_nodes", "id"))
        .group_by(Expr::qualified("target_nodes", "id"))
        .group_by(Expr::qualified("link_type_lookup", "id"))
        .order_by(Expr::col("source_index"))
        .order_by(Expr::col("target_index"))
        .order_by(Expr::col("link_type_index"))
}

#[async_trait]
impl DerivedTableBuilder for GraphTableBuilder {
    type Schema = AttributeSet;

    fn table_prefixes(&self) -> &'static [&'static str] {
        &GRAPH_TABLES
    }

    async fn build(
        &self,
        store: &dyn CacheStore,
        tables: &TableSet,
    ) -> Result<AttributeSet, CacheError> {
        let started = Instant::now();
        let detected =
            SchemaIntrospector::inspect(store, &tables.base(), &[Side::Source, Side::Target])
                .await;
        let columns = NodeColumns::new(detected);

        for step in self.plan(tables, &columns) {
            Self::run_step(store, &step).await?;
        }
        let elapsed = started.elapsed().as_secs_f64();
        Self::run_step(store, &Self::processing_time_step(tables, elapsed)).await?;

        log::info!(
            "Built graph tables for `{}` in {:.3}s (attributes {:?})",
            tables.key(),
            elapsed,
            columns.attributes()
        );
        Ok(columns.attributes())
    }

    async fn describe(&self, store: &dyn CacheStore, tables: &TableSet) -> AttributeSet {
        SchemaIntrospector::detect(store, &tables.derived(NODES), &[Side::Node]).await
    }
}
