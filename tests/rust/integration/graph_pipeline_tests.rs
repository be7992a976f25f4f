use std::collections::HashSet;

use graphcache::cache_store::Value;
use graphcache::graph::document::NodeImage;
use graphcache::query_builder::{ColumnDef, ColumnType};
use graphcache::report_cache::CachePolicy;
use serde_json::json;

use super::common::{
    edge_report, edge_report_with, example_report, graph_cache, store, uppercase_edge_report, Edge,
};

#[tokio::test]
async fn test_example_scenario() {
    let store = store();
    let cache = graph_cache(&store);
    let rendered = cache
        .render(&example_report(), CachePolicy::Default)
        .await
        .unwrap();
    let doc = rendered.document;

    assert_eq!(doc.report_name, "example");
    assert_eq!(doc.report_description, "example description");
    assert_eq!(doc.report_key, rendered.entry.key.to_string());

    let node_ids: Vec<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["A", "B", "C"]);
    assert_eq!(
        doc.nodes.iter().map(|n| n.my_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    assert_eq!(doc.link_types.len(), 1);
    assert_eq!(doc.link_types[0].label, "L1");
    assert_eq!(doc.link_types[0].link_type_count, 2);

    let types: Vec<(&str, i64)> = doc
        .types
        .iter()
        .map(|t| (t.label.as_str(), t.type_count))
        .collect();
    assert_eq!(types, vec![("t1", 2), ("t2", 1)]);

    let links: Vec<(i64, i64, f64, i64)> = doc
        .links
        .iter()
        .map(|l| (l.source, l.target, l.weight, l.link_type))
        .collect();
    assert_eq!(links, vec![(0, 1, 2.0, 0), (1, 2, 3.0, 0)]);

    assert_eq!(doc.summary_value("nodes_count"), Some("3"));
    assert_eq!(doc.summary_value("links_count"), Some("2"));
    assert_eq!(doc.summary_value("type_count"), Some("2"));
    assert_eq!(doc.summary_value("group_count"), Some("2"));
    let keys: Vec<&str> = doc.summary.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "group_count",
            "type_count",
            "nodes_count",
            "links_count",
            "seconds_to_process"
        ]
    );
}

#[tokio::test]
async fn test_nodes_resolve_lookup_ids() {
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&example_report(), CachePolicy::Default)
        .await
        .unwrap()
        .document;

    let c = doc.nodes.iter().find(|n| n.id == "C").unwrap();
    assert_eq!(c.node_type, 1);
    assert_eq!(c.group, 1);
    assert_eq!(c.name, "C name");
    let a = doc.nodes.iter().find(|n| n.id == "A").unwrap();
    assert_eq!(a.size, 3);
    assert_eq!(a.group, 0);
    // non-positive sizes fall back to the default
    let b = doc.nodes.iter().find(|n| n.id == "B").unwrap();
    assert_eq!(b.size, 50);

    let groups: Vec<(&str, i64)> = doc
        .groups
        .iter()
        .map(|g| (g.name.as_str(), g.group_count))
        .collect();
    assert_eq!(groups, vec![("g1", 2), ("g2", 1)]);
}

#[tokio::test]
async fn test_every_endpoint_becomes_exactly_one_node() {
    let edges = [
        Edge::new("n3", "n1"),
        Edge::new("n1", "n2"),
        Edge::new("n2", "n3"),
        Edge::new("n4", "n1").link("L2", 1.0),
    ];
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&edge_report("ring", &edges), CachePolicy::Default)
        .await
        .unwrap()
        .document;

    let node_ids: Vec<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["n1", "n2", "n3", "n4"]);
    let unique: HashSet<&str> = node_ids.iter().copied().collect();
    assert_eq!(unique.len(), node_ids.len());

    // dense ids on every lookup
    let indexes: Vec<i64> = doc.nodes.iter().map(|n| n.my_index).collect();
    assert_eq!(indexes, (0..4).collect::<Vec<i64>>());
    assert_eq!(
        doc.link_types.iter().map(|l| l.label.as_str()).collect::<Vec<_>>(),
        vec!["L1", "L2"]
    );

    for link in &doc.links {
        assert!(link.source >= 0 && link.source < 4);
        assert!(link.target >= 0 && link.target < 4);
    }
}

#[tokio::test]
async fn test_duplicate_edges_collapse() {
    let edges = [
        Edge::new("A", "B").link("L1", 2.0),
        Edge::new("A", "B").link("L1", 2.0),
        Edge::new("A", "B").link("L2", 4.0),
    ];
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&edge_report("dups", &edges), CachePolicy::Default)
        .await
        .unwrap()
        .document;

    let links: Vec<(i64, i64, i64)> = doc
        .links
        .iter()
        .map(|l| (l.source, l.target, l.link_type))
        .collect();
    assert_eq!(links, vec![(0, 1, 0), (0, 1, 1)]);
    assert_eq!(doc.summary_value("links_count"), Some("1"));
    assert_eq!(doc.link_types[0].link_type_count, 1);
}

#[tokio::test]
async fn test_one_sided_attribute_is_present_on_every_node() {
    let edges = [Edge::new("A", "B"), Edge::new("A", "C")];
    let report = edge_report_with(
        "geo",
        &edges,
        vec![ColumnDef::nullable("source_latitude", ColumnType::Float64)],
        vec![vec![Value::Float(1.5)], vec![Value::Float(1.5)]],
    );
    let store = store();
    let cache = graph_cache(&store);
    let rendered = cache.render(&report, CachePolicy::Default).await.unwrap();

    let latitudes: Vec<Option<f64>> = rendered.document.nodes.iter().map(|n| n.latitude).collect();
    assert_eq!(latitudes, vec![Some(1.5), Some(0.0), Some(0.0)]);
    for node in &rendered.document.nodes {
        let value = serde_json::to_value(node).unwrap();
        assert!(value.get("latitude").is_some());
        assert!(value.get("longitude").is_none());
        assert!(value.get("json_url").is_none());
        assert!(value.get("img").is_none());
    }
}

#[tokio::test]
async fn test_one_sided_attribute_on_a_node_seen_from_both_sides() {
    // B is a target of the first edge and the source of the second
    let edges = [Edge::new("A", "B"), Edge::new("B", "C")];
    let report = edge_report_with(
        "chain_geo",
        &edges,
        vec![ColumnDef::nullable("source_latitude", ColumnType::Float64)],
        vec![vec![Value::Float(1.5)], vec![Value::Float(2.5)]],
    );
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&report, CachePolicy::Default)
        .await
        .unwrap()
        .document;

    let latitudes: Vec<(&str, Option<f64>)> = doc
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.latitude))
        .collect();
    assert_eq!(
        latitudes,
        vec![("A", Some(1.5)), ("B", Some(2.5)), ("C", Some(0.0))]
    );
    assert_eq!(doc.summary_value("nodes_count"), Some("3"));
}

#[tokio::test]
async fn test_uppercase_base_columns_build() {
    let edges = [
        Edge::new("A", "B").types("t1", "t2").link("L1", 2.0),
        Edge::new("B", "C").types("t2", "t1").link("L2", 3.0),
    ];
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&uppercase_edge_report("loud", &edges), CachePolicy::Default)
        .await
        .unwrap()
        .document;

    let node_ids: Vec<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["A", "B", "C"]);
    let types: Vec<(&str, i64)> = doc
        .types
        .iter()
        .map(|t| (t.label.as_str(), t.type_count))
        .collect();
    assert_eq!(types, vec![("t1", 2), ("t2", 1)]);
    let links: Vec<(i64, i64, f64, i64)> = doc
        .links
        .iter()
        .map(|l| (l.source, l.target, l.weight, l.link_type))
        .collect();
    assert_eq!(links, vec![(0, 1, 2.0, 0), (1, 2, 3.0, 1)]);
    assert_eq!(doc.summary_value("links_count"), Some("2"));
}

#[tokio::test]
async fn test_fresh_generation_keeps_optional_attributes() {
    let edges = [Edge::new("A", "B"), Edge::new("C", "B")];
    let report = edge_report_with(
        "pictures_again",
        &edges,
        vec![
            ColumnDef::nullable("source_img", ColumnType::String),
            ColumnDef::nullable("source_latitude", ColumnType::Float64),
        ],
        vec![
            vec![Value::Null, Value::Float(1.0)],
            vec![Value::from("c.png"), Value::Float(2.0)],
        ],
    );
    let store = store();
    let cache = graph_cache(&store);
    let built = cache.render(&report, CachePolicy::Default).await.unwrap();
    let reused = cache.render(&report, CachePolicy::Default).await.unwrap();
    assert!(built.entry.generated_this_request);
    assert!(!reused.entry.generated_this_request);
    assert_eq!(reused.document.nodes, built.document.nodes);

    let doc = reused.document;
    let images: Vec<Option<NodeImage>> = doc.nodes.iter().map(|n| n.img.clone()).collect();
    assert_eq!(
        images,
        vec![
            Some(NodeImage::Missing),
            Some(NodeImage::Missing),
            Some(NodeImage::Url("c.png".to_string())),
        ]
    );
    let latitudes: Vec<Option<f64>> = doc.nodes.iter().map(|n| n.latitude).collect();
    assert_eq!(latitudes, vec![Some(1.0), Some(0.0), Some(2.0)]);
    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["nodes"][1]["img"], json!(false));
    assert!(json["nodes"][0].get("json_url").is_none());
}

#[tokio::test]
async fn test_null_image_serializes_false() {
    let edges = [Edge::new("A", "B"), Edge::new("C", "B")];
    let report = edge_report_with(
        "pictures",
        &edges,
        vec![
            ColumnDef::nullable("source_img", ColumnType::String),
            ColumnDef::nullable("target_img", ColumnType::String),
        ],
        vec![
            vec![Value::Null, Value::from("b.png")],
            vec![Value::from("c.png"), Value::from("b.png")],
        ],
    );
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&report, CachePolicy::Default)
        .await
        .unwrap()
        .document;

    let images: Vec<Option<NodeImage>> = doc.nodes.iter().map(|n| n.img.clone()).collect();
    assert_eq!(
        images,
        vec![
            Some(NodeImage::Missing),
            Some(NodeImage::Url("b.png".to_string())),
            Some(NodeImage::Url("c.png".to_string())),
        ]
    );
    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["nodes"][0]["img"], json!(false));
    assert_eq!(json["types"][0]["is_img"], json!(false));
    assert_eq!(json["types"][0]["img_stub"], json!(""));
}

#[tokio::test]
async fn test_conflicting_node_rows_abort_the_build() {
    // B carries two types, so the regrouped union yields two rows for it
    let report = edge_report(
        "conflict",
        &[
            Edge::new("A", "B").types("t1", "t1"),
            Edge::new("B", "C").types("t2", "t1"),
        ],
    );
    let store = store();
    let cache = graph_cache(&store);
    let err = cache
        .render(&report, CachePolicy::Default)
        .await
        .err()
        .unwrap();

    assert_eq!(err.step(), Some("enforce unique node_id"));
    assert!(store
        .table_names()
        .await
        .iter()
        .all(|t| !t.contains("__staging_")));
}

#[tokio::test]
async fn test_rebuilds_are_idempotent() {
    let store = store();
    let cache = graph_cache(&store);
    let report = example_report();
    let first = cache
        .render(&report, CachePolicy::Force)
        .await
        .unwrap()
        .document;
    let second = cache
        .render(&report, CachePolicy::Force)
        .await
        .unwrap()
        .document;

    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.links, second.links);
    assert_eq!(first.groups, second.groups);
    assert_eq!(first.types, second.types);
    assert_eq!(first.link_types, second.link_types);
    assert_eq!(first.summary[..4], second.summary[..4]);
}

#[tokio::test]
async fn test_document_shape() {
    let store = store();
    let cache = graph_cache(&store);
    let doc = cache
        .render(&example_report(), CachePolicy::Default)
        .await
        .unwrap()
        .document;
    let json = serde_json::to_value(&doc).unwrap();

    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(
        keys,
        vec![
            "report_name",
            "report_description",
            "report_key",
            "summary",
            "groups",
            "types",
            "link_types",
            "nodes",
            "links"
        ]
    );
    assert_eq!(json["summary"][2], json!({"nodes_count": "3"}));
    assert_eq!(
        json["nodes"][0],
        json!({
            "name": "A name",
            "short_name": "A name",
            "group": 0,
            "size": 3,
            "type": 0,
            "id": "A",
            "weight_sum": 0,
            "degree": 0,
            "my_index": 0
        })
    );
    assert_eq!(
        json["links"][0],
        json!({"source": 0, "target": 1, "weight": 2.0, "link_type": 0})
    );
    assert_eq!(json["groups"][0], json!({"id": "g1", "name": "g1", "group_count": 2}));
}
