use std::sync::Arc;
use std::time::Duration;

use graphcache::report_cache::{CacheError, CachePolicy};

use super::common::{
    edge_report, example_report, graph_cache, graph_cache_with_timeout, store, CountingSource,
    Edge,
};

fn staging_tables(names: &[String]) -> Vec<&String> {
    names.iter().filter(|t| t.contains("__staging_")).collect()
}

#[tokio::test]
async fn test_fresh_request_reuses_derived_tables() {
    let store = store();
    let cache = graph_cache(&store);
    let source = CountingSource::new(example_report());

    let first = cache.render(&source, CachePolicy::Default).await.unwrap();
    assert!(first.entry.generated_this_request);
    let statements_after_build = store.executed_statements().await.len();

    let second = cache.render(&source, CachePolicy::Default).await.unwrap();
    assert!(!second.entry.generated_this_request);
    assert_eq!(store.executed_statements().await.len(), statements_after_build);
    assert_eq!(source.rebuilds(), 1);
    assert_eq!(first.document, second.document);
}

#[tokio::test]
async fn test_live_tables_carry_key_names() {
    let store = store();
    let cache = graph_cache(&store);
    let rendered = cache
        .render(&example_report(), CachePolicy::Default)
        .await
        .unwrap();
    let key = rendered.entry.key.to_string();
    assert_eq!(rendered.entry.base_table_name, key);

    let mut expected: Vec<String> = [
        "link_types",
        "links",
        "node_groups",
        "node_types",
        "nodes",
        "summary",
    ]
    .iter()
    .map(|prefix| format!("{}_{}", prefix, key))
    .collect();
    expected.push(key.clone());
    expected.sort();
    assert_eq!(store.table_names().await, expected);
}

#[tokio::test]
async fn test_force_rebuilds_even_when_fresh() {
    let store = store();
    let cache = graph_cache(&store);
    let source = CountingSource::new(example_report());

    cache.render(&source, CachePolicy::Default).await.unwrap();
    let forced = cache.render(&source, CachePolicy::Force).await.unwrap();
    assert!(forced.entry.generated_this_request);
    assert_eq!(source.rebuilds(), 2);
}

#[tokio::test]
async fn test_skip_without_cache_is_not_cached() {
    let store = store();
    let cache = graph_cache(&store);
    let source = CountingSource::new(example_report());

    let result = cache.render(&source, CachePolicy::Skip).await;
    assert!(matches!(result, Err(CacheError::NotCached { .. })));
    assert_eq!(source.rebuilds(), 0);
    assert!(store.table_names().await.is_empty());
}

#[tokio::test]
async fn test_expired_entry_is_rebuilt_unless_skipped() {
    let store = store();
    let cache = graph_cache(&store);
    let source = CountingSource::new(example_report());

    let first = cache.render(&source, CachePolicy::Default).await.unwrap();
    store
        .backdate(&first.entry.base_table_name, chrono::Duration::hours(2))
        .await
        .unwrap();

    let skipped = cache.render(&source, CachePolicy::Skip).await.unwrap();
    assert!(!skipped.entry.generated_this_request);
    assert_eq!(source.rebuilds(), 1);

    let rebuilt = cache.render(&source, CachePolicy::Default).await.unwrap();
    assert!(rebuilt.entry.generated_this_request);
    assert_eq!(source.rebuilds(), 2);
}

#[tokio::test]
async fn test_failed_step_keeps_previous_generation() {
    let store = store();
    let cache = graph_cache(&store);
    let source = CountingSource::new(example_report());

    let before = cache.render(&source, CachePolicy::Default).await.unwrap();
    let tables_before = store.table_names().await;

    store.inject_failure("links_").await;
    let err = cache
        .render(&source, CachePolicy::Force)
        .await
        .err()
        .unwrap();
    assert_eq!(err.step(), Some("create links table"));
    match &err {
        CacheError::BuildStep { statement, .. } => {
            assert!(statement.starts_with("CREATE TABLE `links_"));
        }
        other => panic!("expected a build step failure, got {:?}", other),
    }

    store.clear_failures().await;
    let tables_after = store.table_names().await;
    assert!(staging_tables(&tables_after).is_empty());
    assert_eq!(tables_after, tables_before);

    let after = cache.render(&source, CachePolicy::Default).await.unwrap();
    assert!(!after.entry.generated_this_request);
    assert_eq!(after.document, before.document);
}

#[tokio::test]
async fn test_partial_publish_is_never_served() {
    let store = store();
    let cache = graph_cache(&store);
    let source = CountingSource::new(example_report());
    cache.render(&source, CachePolicy::Default).await.unwrap();

    // stops after base, nodes and the lookup tables were swapped in
    store.inject_publish_failure("links_").await;
    let result = cache.render(&source, CachePolicy::Force).await;
    assert!(matches!(result, Err(CacheError::Publish { .. })));
    assert!(store.table_names().await.is_empty());
    store.clear_failures().await;

    let skipped = cache.render(&source, CachePolicy::Skip).await;
    assert!(matches!(skipped, Err(CacheError::NotCached { .. })));

    let rebuilt = cache.render(&source, CachePolicy::Default).await.unwrap();
    assert!(rebuilt.entry.generated_this_request);
    assert_eq!(source.rebuilds(), 3);
    assert_eq!(rebuilt.document.summary_value("nodes_count"), Some("3"));
}

#[tokio::test]
async fn test_integrity_violation_names_the_table() {
    let store = store();
    let cache = graph_cache(&store);
    let report = edge_report(
        "clash",
        &[
            Edge::new("A", "B").types("t1", "t1"),
            Edge::new("B", "C").types("t2", "t1"),
        ],
    );

    let err = cache
        .render(&report, CachePolicy::Default)
        .await
        .err()
        .unwrap();
    let message = err.to_string();
    match err {
        CacheError::IntegrityViolation {
            table, statement, ..
        } => {
            assert!(table.starts_with("nodes_clash_"));
            assert!(table.contains("__staging_"));
            assert!(statement.contains("HAVING count() > 1"));
            assert!(message.contains(&table));
        }
        other => panic!("expected an integrity violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_rebuild_times_out_and_cleans_up() {
    let store = store();
    let cache = graph_cache_with_timeout(&store, Duration::from_millis(50));
    store
        .set_statement_delay(Some(Duration::from_millis(200)))
        .await;

    let result = cache.render(&example_report(), CachePolicy::Default).await;
    assert!(matches!(result, Err(CacheError::Timeout { .. })));
    assert!(store.table_names().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_rebuild_once() {
    let store = store();
    let cache = Arc::new(graph_cache(&store));
    let source = Arc::new(CountingSource::new(example_report()));

    let (first, second) = tokio::join!(
        cache.render(source.as_ref(), CachePolicy::Default),
        cache.render(source.as_ref(), CachePolicy::Default)
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(source.rebuilds(), 1);
    assert!(first.entry.generated_this_request ^ second.entry.generated_this_request);
    assert_eq!(first.document.nodes, second.document.nodes);
}

#[tokio::test]
async fn test_concurrent_tasks_share_one_generation() {
    let store = store();
    let cache = Arc::new(graph_cache(&store));
    let source = Arc::new(CountingSource::new(example_report()));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        let source = source.clone();
        tasks.push(tokio::spawn(async move {
            cache
                .render(source.as_ref(), CachePolicy::Default)
                .await
                .map(|r| r.entry.generated_this_request)
        }));
    }

    let mut rebuilt = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() {
            rebuilt += 1;
        }
    }
    assert_eq!(rebuilt, 1);
    assert_eq!(source.rebuilds(), 1);
}
