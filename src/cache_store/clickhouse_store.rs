use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Client;
use tokio::io::AsyncBufReadExt;

use super::errors::StoreError;
use super::value::{Row, Value};
use super::CacheStore;
use crate::config::CacheConfig;
use crate::query_builder::to_sql::quote_identifier;
use crate::query_builder::{Query, Statement, ToSql};

/// [`CacheStore`] backed by a ClickHouse database over HTTP
#[derive(Clone)]
pub struct ClickHouseStore {
    /// Client without a default database, for `CREATE DATABASE`
    server: Client,
    client: Client,
    database: String,
}

impl ClickHouseStore {
    pub fn from_config(config: &CacheConfig) -> Self {
        let server = Client::default()
            .with_url(&config.clickhouse_url)
            .with_user(&config.clickhouse_user)
            .with_password(&config.clickhouse_password)
            .with_option("join_use_nulls", "1") // Return NULL for unmatched LEFT JOIN columns
            .with_option("allow_experimental_json_type", "1");
        let client = server.clone().with_database(&config.cache_database);
        Self {
            server,
            client,
            database: config.cache_database.clone(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the cache database if it does not exist yet
    pub async fn ensure_database(&self) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            quote_identifier(&self.database)?
        );
        log::debug!("Executing SQL:\n{}", sql);
        self.server.query(&sql).execute().await.map_err(|e| {
            log::error!("ClickHouse statement failed. SQL was:\n{}\nError: {}", sql, e);
            StoreError::from(e)
        })
    }

    async fn run(&self, sql: &str) -> Result<(), StoreError> {
        log::debug!("Executing SQL:\n{}", sql);
        self.client
            .query(&escape_placeholders(sql))
            .execute()
            .await
            .map_err(|e| {
                log::error!("ClickHouse statement failed. SQL was:\n{}\nError: {}", sql, e);
                StoreError::from(e)
            })
    }

    async fn fetch_json(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        log::debug!("Executing SQL:\n{}", sql);
        let mut lines = self
            .client
            .query(&escape_placeholders(sql))
            .fetch_bytes("JSONEachRow")
            .map_err(|e| {
                log::error!("ClickHouse query failed. SQL was:\n{}\nError: {}", sql, e);
                StoreError::from(e)
            })?
            .lines();

        let mut rows = Vec::new();
        while let Some(line) = lines.next_line().await.map_err(|e| {
            log::error!(
                "ClickHouse response parsing failed. SQL was:\n{}\nError: {}",
                sql,
                e
            );
            StoreError::Decode(e.to_string())
        })? {
            let object: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&line).map_err(|e| StoreError::Decode(e.to_string()))?;
            rows.push(
                object
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from_json(value)))
                    .collect(),
            );
        }
        Ok(rows)
    }

    /// Mark `table` as regenerated now; `metadata_modification_time` follows
    async fn touch(&self, table: &str) -> Result<(), StoreError> {
        let sql = format!(
            "ALTER TABLE {} MODIFY COMMENT 'graphcache generation {}'",
            quote_identifier(table)?,
            Utc::now().timestamp()
        );
        self.run(&sql).await
    }
}

/// The client treats `?` as a bind placeholder; literal question marks in
/// rendered SQL must be doubled
fn escape_placeholders(sql: &str) -> String {
    sql.replace('?', "??")
}

#[async_trait]
impl CacheStore for ClickHouseStore {
    async fn columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        #[derive(Debug, serde::Deserialize, clickhouse::Row)]
        struct ColumnName {
            name: String,
        }

        let rows: Vec<ColumnName> = self
            .client
            .query(
                "SELECT name FROM system.columns WHERE database = ? AND table = ? ORDER BY position",
            )
            .bind(&self.database)
            .bind(table)
            .fetch_all()
            .await?;

        if rows.is_empty() {
            return Err(StoreError::TableNotFound {
                table: table.to_string(),
            });
        }
        let columns: Vec<String> = rows.into_iter().map(|row| row.name).collect();
        log::debug!(
            "Found {} columns for {}.{}: {:?}",
            columns.len(),
            self.database,
            table,
            columns
        );
        Ok(columns)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let count: u64 = self
            .client
            .query("SELECT count() FROM system.tables WHERE database = ? AND name = ?")
            .bind(&self.database)
            .bind(table)
            .fetch_one()
            .await?;
        Ok(count > 0)
    }

    async fn table_generated_at(
        &self,
        table: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let stamps: Vec<u32> = self
            .client
            .query(
                "SELECT toUnixTimestamp(metadata_modification_time) FROM system.tables WHERE database = ? AND name = ?",
            )
            .bind(&self.database)
            .bind(table)
            .fetch_all()
            .await?;
        Ok(stamps
            .first()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(i64::from(*secs), 0)))
    }

    async fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        let sql = statement.to_sql()?;
        match statement {
            Statement::AssertUnique { table, columns } => {
                let rows = self.fetch_json(&sql).await?;
                let duplicates = rows
                    .first()
                    .and_then(|row| row.get("duplicates"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                if duplicates > 0 {
                    return Err(StoreError::UniqueViolation {
                        table: table.clone(),
                        columns: columns.join(", "),
                        key: format!("{} duplicated keys", duplicates),
                    });
                }
                Ok(())
            }
            _ => self.run(&sql).await,
        }
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let sql = query.to_sql()?;
        self.fetch_json(&sql).await
    }

    async fn publish(&self, renames: &[(String, String)]) -> Result<(), StoreError> {
        for (staging, live) in renames {
            if self.table_exists(live).await? {
                // staging now holds the previous generation
                self.execute(&Statement::ExchangeTables {
                    left: staging.clone(),
                    right: live.clone(),
                })
                .await?;
                self.execute(&Statement::DropTable {
                    table: staging.clone(),
                })
                .await?;
            } else {
                self.execute(&Statement::RenameTable {
                    from: staging.clone(),
                    to: live.clone(),
                })
                .await?;
            }
            self.touch(live).await?;
        }
        log::info!(
            "Published {} tables into {}",
            renames.len(),
            self.database
        );
        Ok(())
    }

    async fn drop_tables(&self, tables: &[String]) -> Result<(), StoreError> {
        for table in tables {
            self.execute(&Statement::DropTable {
                table: table.clone(),
            })
            .await?;
        }
        Ok(())
    }
}
