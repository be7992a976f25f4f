//! Reads a published generation back into a [`GraphDocument`]
//!
//! The reader never writes. It only references optional attribute columns the
//! handle's [`AttributeSet`] says exist in this generation.

use super::attributes::{AttributeSet, OptionalAttribute};
use super::builder::{LINKS, LINK_TYPES, NODES, NODE_GROUPS, NODE_TYPES, SUMMARY};
use super::columns::NodeColumns;
use super::document::{
    short_name, GraphDocument, GroupEntry, LinkEntry, LinkTypeEntry, NodeEntry, NodeImage,
    SummaryItem, TypeEntry,
};
use crate::cache_store::{CacheStore, Row, Value};
use crate::query_builder::{Expr, JoinKind, Query, Select};
use crate::report_cache::{CacheError, CacheHandle};

const SHORT_NAME_CHARS: usize = 50;

pub struct GraphProjectionReader<'a> {
    store: &'a dyn CacheStore,
}

impl<'a> GraphProjectionReader<'a> {
    pub fn new(store: &'a dyn CacheStore) -> Self {
        Self { store }
    }

    pub async fn project(
        &self,
        handle: &CacheHandle<AttributeSet>,
    ) -> Result<GraphDocument, CacheError> {
        let tables = &handle.tables;
        let nodes = tables.derived(NODES);
        let node_types = tables.derived(NODE_TYPES);
        let node_groups = tables.derived(NODE_GROUPS);
        let link_types = tables.derived(LINK_TYPES);
        let links = tables.derived(LINKS);
        let summary = tables.derived(SUMMARY);

        let types = self
            .read(&node_types, lookup_select(&node_types, "node_type", "count_distinct_node"))
            .await?
            .iter()
            .map(|row| TypeEntry {
                id: text(row, "label"),
                label: text(row, "label"),
                is_img: false,
                img_stub: String::new(),
                type_count: int(row, "member_count"),
            })
            .collect();

        let link_types = self
            .read(&link_types, lookup_select(&link_types, "link_type", "count_distinct_link"))
            .await?
            .iter()
            .map(|row| LinkTypeEntry {
                id: text(row, "label"),
                label: text(row, "label"),
                link_type_count: int(row, "member_count"),
            })
            .collect();

        let groups = self
            .read(&node_groups, lookup_select(&node_groups, "group_name", "count_distinct_node"))
            .await?
            .iter()
            .map(|row| GroupEntry {
                id: text(row, "label"),
                name: text(row, "label"),
                group_count: int(row, "member_count"),
            })
            .collect();

        let attributes = handle.schema;
        let node_rows = self
            .read(
                &nodes,
                nodes_select(&nodes, &node_groups, &node_types, attributes),
            )
            .await?;
        let nodes = node_rows
            .iter()
            .map(|row| node_entry(row, attributes))
            .collect();

        let links = self
            .read(&links, links_select(&links))
            .await?
            .iter()
            .map(|row| LinkEntry {
                source: int(row, "source"),
                target: int(row, "target"),
                weight: row.get("weight").and_then(Value::as_f64).unwrap_or(0.0),
                link_type: int(row, "link_type"),
            })
            .collect();

        let summary = self
            .read(&summary, summary_select(&summary))
            .await?
            .iter()
            .map(|row| SummaryItem {
                key: text(row, "summary_key").trim().to_string(),
                value: text(row, "summary_value"),
            })
            .collect();

        Ok(GraphDocument {
            report_name: handle.report_name.clone(),
            report_description: handle.report_description.clone(),
            report_key: handle.key().to_string(),
            summary,
            groups,
            types,
            link_types,
            nodes,
            links,
        })
    }

    async fn read(&self, table: &str, select: Select) -> Result<Vec<Row>, CacheError> {
        let query: Query = select.into();
        self.store
            .fetch(&query)
            .await
            .map_err(|e| CacheError::projection(table, e))
    }
}

fn text(row: &Row, column: &str) -> String {
    row.get(column).map(Value::to_text).unwrap_or_default()
}

fn int(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(Value::as_i64).unwrap_or(0)
}

fn lookup_select(table: &str, name_column: &str, count_column: &str) -> Select {
    Select::from_table(table)
        .column(Expr::col("id"), "lookup_index")
        .column(Expr::col(name_column), "label")
        .column(Expr::col(count_column), "member_count")
        .order_by(Expr::col("lookup_index"))
}

fn nodes_select(
    nodes: &str,
    node_groups: &str,
    node_types: &str,
    attributes: AttributeSet,
) -> Select {
    let mut select = Select::from_aliased(nodes, "nodes")
        .column(Expr::qualified("nodes", "node_name"), "name");
    for attribute in attributes.iter() {
        select = select.column(
            Expr::qualified("nodes", NodeColumns::attribute_column(attribute)),
            attribute.name(),
        );
    }
    select
        .column(Expr::qualified("groups_lookup", "id"), "group_index")
        .column(Expr::qualified("nodes", "node_size"), "size")
        .column(Expr::qualified("types_lookup", "id"), "type_index")
        .column(Expr::qualified("nodes", "node_id"), "natural_id")
        .column(Expr::qualified("nodes", "id"), "my_index")
        .join(
            JoinKind::Left,
            node_groups,
            "groups_lookup",
            vec![(
                Expr::qualified("groups_lookup", "group_name"),
                Expr::qualified("nodes", "node_group"),
            )],
        )
        .join(
            JoinKind::Left,
            node_types,
            "types_lookup",
            vec![(
                Expr::qualified("types_lookup", "node_type"),
                Expr::qualified("nodes", "node_type"),
            )],
        )
        .order_by(Expr::col("my_index"))
}

fn node_entry(row: &Row, attributes: AttributeSet) -> NodeEntry {
    let name = text(row, "name");
    let mut node = NodeEntry {
        short_name: short_name(&name, SHORT_NAME_CHARS),
        name,
        group: int(row, "group_index"),
        size: int(row, "size"),
        node_type: int(row, "type_index"),
        id: text(row, "natural_id"),
        weight_sum: 0,
        degree: 0,
        my_index: int(row, "my_index"),
        latitude: None,
        longitude: None,
        json_url: None,
        img: None,
    };
    let value = |attribute: OptionalAttribute| row.get(attribute.name()).cloned();
    for attribute in attributes.iter() {
        match attribute {
            OptionalAttribute::Latitude => {
                node.latitude = Some(value(attribute).and_then(|v| v.as_f64()).unwrap_or(0.0));
            }
            OptionalAttribute::Longitude => {
                node.longitude = Some(value(attribute).and_then(|v| v.as_f64()).unwrap_or(0.0));
            }
            OptionalAttribute::JsonUrl => {
                node.json_url = Some(value(attribute).map(|v| v.to_text()).unwrap_or_default());
            }
            OptionalAttribute::Img => {
                node.img = Some(match value(attribute) {
                    None | Some(Value::Null) => NodeImage::Missing,
                    Some(v) => NodeImage::Url(v.to_text()),
                });
            }
        }
    }
    node
}

fn links_select(links: &str) -> Select {
    Select::from_table(links)
        .column(Expr::col("source"), "source")
        .column(Expr::col("target"), "target")
        .column(Expr::col("weight"), "weight")
        .column(Expr::col("link_type"), "link_type")
        .order_by(Expr::col("source"))
        .order_by(Expr::col("target"))
        .order_by(Expr::col("link_type"))
}

fn summary_select(summary: &str) -> Select {
    Select::from_table(summary)
        .column(Expr::col("position"), "position")
        .column(Expr::col("summary_key"), "summary_key")
        .column(Expr::col("summary_value"), "summary_value")
        .order_by(Expr::col("position"))
}
