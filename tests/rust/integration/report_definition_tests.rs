use std::collections::BTreeMap;
use std::io::Write;

use graphcache::report_cache::{CacheError, CachePolicy};
use graphcache::report_source::{BaseTableSource, ReportDefinition, ReportQuerySource};
use serde_json::json;

use super::common::{graph_cache, store};

const INLINE_REPORT: &str = r#"
name: Team graph
description: Who works with whom
class: team_graph
parameters:
  team: core
rows:
  - {source_id: ann, source_name: Ann, source_type: dev, source_group: core, source_size: 5,
     target_id: bo, target_name: Bo, target_type: dev, target_group: core, target_size: 2,
     weight: 1, link_type: reviews, source_json_url: "https://example.org/ann"}
  - {source_id: bo, source_name: Bo, source_type: dev, source_group: core, source_size: 2,
     target_id: cy, target_name: Cy, target_type: ops, target_group: infra, target_size: 1,
     weight: 0.5, link_type: pages}
"#;

const SQL_REPORT: &str = r#"
name: Transfers
sql: SELECT * FROM transfers WHERE region = $region
parameters:
  region: eu
"#;

fn inline_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(INLINE_REPORT.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_inline_report_file_renders() {
    let file = inline_file();
    let definition = ReportDefinition::from_yaml_file(file.path()).unwrap();
    let source = definition.into_source(BTreeMap::new()).unwrap();

    let store = store();
    let cache = graph_cache(&store);
    let rendered = cache
        .render(source.as_ref(), CachePolicy::Default)
        .await
        .unwrap();
    let doc = serde_json::to_value(&rendered.document).unwrap();

    assert_eq!(doc["report_name"], json!("Team graph"));
    assert_eq!(doc["report_description"], json!("Who works with whom"));
    assert!(doc["report_key"]
        .as_str()
        .unwrap()
        .starts_with("team_graph_"));
    assert_eq!(doc["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(doc["nodes"][0]["json_url"], json!("https://example.org/ann"));
    // bo has a NULL url and cy only appears as a target, which has no url column
    assert_eq!(doc["nodes"][1]["json_url"], json!(""));
    assert_eq!(doc["nodes"][2]["json_url"], json!(""));
    assert_eq!(doc["links"][1]["weight"], json!(0.5));
    assert_eq!(
        doc["link_types"],
        json!([
            {"id": "pages", "label": "pages", "link_type_count": 1},
            {"id": "reviews", "label": "reviews", "link_type_count": 1}
        ])
    );
}

#[tokio::test]
async fn test_parameters_select_separate_generations() {
    let store = store();
    let cache = graph_cache(&store);

    let core = ReportDefinition::from_yaml_str(INLINE_REPORT)
        .unwrap()
        .into_source(BTreeMap::new())
        .unwrap();
    let infra = ReportDefinition::from_yaml_str(INLINE_REPORT)
        .unwrap()
        .into_source(BTreeMap::from([("team".to_string(), json!("infra"))]))
        .unwrap();

    let first = cache.render(core.as_ref(), CachePolicy::Default).await.unwrap();
    let second = cache.render(infra.as_ref(), CachePolicy::Default).await.unwrap();
    assert_ne!(first.entry.key, second.entry.key);
    assert!(second.entry.generated_this_request);

    // same parameters, same key
    let again = ReportDefinition::from_yaml_str(INLINE_REPORT)
        .unwrap()
        .into_source(BTreeMap::from([("team".to_string(), json!("core"))]))
        .unwrap();
    let third = cache.render(again.as_ref(), CachePolicy::Default).await.unwrap();
    assert_eq!(third.entry.key, first.entry.key);
    assert!(!third.entry.generated_this_request);
    let urls: Vec<Option<&str>> = third
        .document
        .nodes
        .iter()
        .map(|n| n.json_url.as_deref())
        .collect();
    assert_eq!(urls, vec![Some("https://example.org/ann"), Some(""), Some("")]);
}

#[test]
fn test_sql_report_binds_parameters() {
    let source = ReportDefinition::from_yaml_str(SQL_REPORT)
        .unwrap()
        .into_source(BTreeMap::from([("region".to_string(), json!("us'west"))]))
        .unwrap();
    match source.base_table().unwrap() {
        BaseTableSource::Sql(sql) => {
            assert_eq!(sql, r"SELECT * FROM transfers WHERE region = 'us\'west'");
        }
        other => panic!("expected SQL, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sql_report_needs_a_database() {
    let source = ReportDefinition::from_yaml_str(SQL_REPORT)
        .unwrap()
        .into_source(BTreeMap::new())
        .unwrap();
    let store = store();
    let cache = graph_cache(&store);

    let result = cache.render(source.as_ref(), CachePolicy::Default).await;
    assert!(matches!(result, Err(CacheError::SourceUnavailable { .. })));
    assert!(store.table_names().await.is_empty());
}

#[test]
fn test_inline_report_missing_required_column_is_rejected() {
    let yaml = r#"
name: Broken
rows:
  - {source_id: a, target_id: b}
"#;
    let result = ReportDefinition::from_yaml_str(yaml)
        .unwrap()
        .into_source(BTreeMap::new());
    assert!(result.is_err());
}
