use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use graphcache::cache_store::{CacheStore, ClickHouseStore, MemoryStore};
use graphcache::config::{CacheConfig, CliConfig};
use graphcache::graph::GraphCache;
use graphcache::report_cache::CachePolicy;
use graphcache::report_source::ReportDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Clickhouse,
    Memory,
}

/// graphcache - Build and read cached graph reports
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Report definition (YAML)
    #[arg(long)]
    report: PathBuf,

    /// Report parameter override, `name=value`; value is parsed as JSON when possible
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, serde_json::Value)>,

    /// Cache policy: default, force or skip
    #[arg(long, default_value = "default")]
    policy: CachePolicy,

    /// Cache store; defaults to memory for inline reports, clickhouse otherwise
    #[arg(long, value_enum)]
    store: Option<StoreKind>,

    /// Cache configuration (YAML); environment variables are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the graph document
    #[arg(long)]
    pretty: bool,

    #[arg(long)]
    clickhouse_url: Option<String>,

    #[arg(long)]
    clickhouse_user: Option<String>,

    #[arg(long)]
    clickhouse_password: Option<String>,

    /// Database holding cache tables
    #[arg(long)]
    cache_database: Option<String>,

    #[arg(long)]
    expire_time_secs: Option<u64>,

    #[arg(long)]
    rebuild_timeout_secs: Option<u64>,

    /// Rebuild on every request
    #[arg(long)]
    no_cache: bool,
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        CliConfig {
            clickhouse_url: cli.clickhouse_url.clone(),
            clickhouse_user: cli.clickhouse_user.clone(),
            clickhouse_password: cli.clickhouse_password.clone(),
            cache_database: cli.cache_database.clone(),
            expire_time_secs: cli.expire_time_secs,
            rebuild_timeout_secs: cli.rebuild_timeout_secs,
            no_cache: cli.no_cache,
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{}`", raw))?;
    if name.is_empty() {
        return Err(format!("empty parameter name in `{}`", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => CacheConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CacheConfig::from_env().context("loading config from environment")?,
    };
    config.merge(CliConfig::from(&cli))?;

    let definition = ReportDefinition::from_yaml_file(&cli.report)
        .with_context(|| format!("loading report {}", cli.report.display()))?;
    let store_kind = cli.store.unwrap_or(if definition.is_inline() {
        StoreKind::Memory
    } else {
        StoreKind::Clickhouse
    });
    if store_kind == StoreKind::Memory && !definition.is_inline() {
        bail!(
            "report `{}` reads from ClickHouse and cannot use the memory store",
            definition.name
        );
    }

    let overrides: BTreeMap<String, serde_json::Value> = cli.params.into_iter().collect();
    let source = definition.into_source(overrides)?;

    let store: Arc<dyn CacheStore> = match store_kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Clickhouse => {
            let store = ClickHouseStore::from_config(&config);
            store
                .ensure_database()
                .await
                .with_context(|| format!("creating database `{}`", store.database()))?;
            Arc::new(store)
        }
    };

    let cache = GraphCache::graph(store, &config);
    let rendered = cache.render(source.as_ref(), cli.policy).await?;
    log::info!(
        "Cache `{}` generated at {:?} (rebuilt: {})",
        rendered.entry.key,
        rendered.entry.generated_at,
        rendered.entry.generated_this_request
    );

    let output = if cli.pretty {
        serde_json::to_string_pretty(&rendered.document)?
    } else {
        serde_json::to_string(&rendered.document)?
    };
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
