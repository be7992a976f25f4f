//! In-process [`CacheStore`] used by tests and `--store memory`
//!
//! Tables live behind one async mutex, so `publish` is atomic with respect to
//! every other call unless a publish failure is injected, in which case it
//! stops at that table like a ClickHouse publish would. A few knobs let tests
//! inject failures and delays.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::errors::StoreError;
use super::eval::{evaluate, ResultSet, TableScan};
use super::value::{KeyPart, Row, Value};
use super::CacheStore;
use crate::query_builder::{ColumnDef, ColumnType, Query, Statement, TableDef};

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Value>>,
    generated_at: DateTime<Utc>,
}

impl MemTable {
    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemTable>,
    executed: Vec<Statement>,
    fail_prefixes: Vec<String>,
    publish_fail_prefixes: Vec<String>,
    statement_delay: Option<Duration>,
}

impl TableScan for HashMap<String, MemTable> {
    fn scan(&self, table: &str) -> Result<ResultSet, StoreError> {
        let mem = self.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        Ok(ResultSet {
            columns: mem.column_names(),
            rows: mem.rows.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `def` and fill it, as a report's base table would be
    pub async fn load_table(&self, def: TableDef, rows: Vec<Vec<Value>>) -> Result<(), StoreError> {
        let table = def.name.clone();
        let columns = def.column_names();
        self.execute(&Statement::CreateTable(def)).await?;
        self.execute(&Statement::InsertValues {
            table,
            columns,
            rows,
        })
        .await
    }

    /// Make every statement targeting a table whose name starts with `prefix` fail
    pub async fn inject_failure(&self, prefix: impl Into<String>) {
        self.state.lock().await.fail_prefixes.push(prefix.into());
    }

    /// Make `publish` stop with an error at the first live table whose name
    /// starts with `prefix`, keeping the tables already moved
    pub async fn inject_publish_failure(&self, prefix: impl Into<String>) {
        self.state.lock().await.publish_fail_prefixes.push(prefix.into());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.fail_prefixes.clear();
        state.publish_fail_prefixes.clear();
    }

    /// Sleep before each statement
    pub async fn set_statement_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.statement_delay = delay;
    }

    /// Move a table's generation timestamp into the past
    pub async fn backdate(&self, table: &str, by: chrono::Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mem = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;
        mem.generated_at -= by;
        Ok(())
    }

    pub async fn executed_statements(&self) -> Vec<Statement> {
        self.state.lock().await.executed.clone()
    }

    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let state = self.state.lock().await;
        let result = state.tables.scan(table)?;
        Ok(into_rows(result))
    }
}

fn into_rows(result: ResultSet) -> Vec<Row> {
    let columns = result.columns;
    result
        .rows
        .into_iter()
        .map(|row| columns.iter().cloned().zip(row).collect())
        .collect()
}

fn coerce(value: Value, column: &ColumnDef) -> Result<Value, StoreError> {
    if value.is_null() {
        return Ok(if column.nullable {
            Value::Null
        } else {
            column.data_type.default_value()
        });
    }
    let converted = match column.data_type {
        ColumnType::Int64 => value.as_i64().map(Value::Int),
        ColumnType::Float64 => value.as_f64().map(Value::Float),
        ColumnType::String => Some(Value::String(value.to_text())),
    };
    converted.ok_or_else(|| {
        StoreError::evaluation(format!(
            "cannot convert {} to {:?} for column `{}`",
            value, column.data_type, column.name
        ))
    })
}

fn insert_rows(
    tables: &mut HashMap<String, MemTable>,
    table: &str,
    columns: &[String],
    rows: Vec<Vec<Value>>,
) -> Result<(), StoreError> {
    let mem = tables
        .get_mut(table)
        .ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
    let known = mem.column_names();
    for column in columns {
        if !known.contains(column) {
            return Err(StoreError::column_not_found(column, &known));
        }
    }
    let positions: Vec<Option<usize>> = mem
        .columns
        .iter()
        .map(|def| columns.iter().position(|c| c == &def.name))
        .collect();

    let mut converted = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != columns.len() {
            return Err(StoreError::evaluation(format!(
                "insert into `{}` expects {} values, got {}",
                table,
                columns.len(),
                row.len()
            )));
        }
        let mut full = Vec::with_capacity(mem.columns.len());
        for (def, position) in mem.columns.iter().zip(&positions) {
            let value = position.map(|i| row[i].clone()).unwrap_or(Value::Null);
            full.push(coerce(value, def)?);
        }
        converted.push(full);
    }
    mem.rows.extend(converted);
    Ok(())
}

fn assert_unique(
    tables: &HashMap<String, MemTable>,
    table: &str,
    columns: &[String],
) -> Result<(), StoreError> {
    let result = tables.scan(table)?;
    let mut positions = Vec::with_capacity(columns.len());
    for column in columns {
        let position = result
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StoreError::column_not_found(column, &result.columns))?;
        positions.push(position);
    }
    let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
    for row in &result.rows {
        let key: Vec<KeyPart> = positions.iter().map(|&i| row[i].key()).collect();
        if !seen.insert(key) {
            let shown: Vec<String> = positions.iter().map(|&i| row[i].to_string()).collect();
            return Err(StoreError::UniqueViolation {
                table: table.to_string(),
                columns: columns.join(", "),
                key: format!("({})", shown.join(", ")),
            });
        }
    }
    Ok(())
}

fn apply(state: &mut MemoryState, statement: &Statement) -> Result<(), StoreError> {
    let tables = &mut state.tables;
    match statement {
        Statement::CreateTable(def) => {
            if tables.contains_key(&def.name) {
                return Err(StoreError::TableExists {
                    table: def.name.clone(),
                });
            }
            tables.insert(
                def.name.clone(),
                MemTable {
                    columns: def.columns.clone(),
                    rows: Vec::new(),
                    generated_at: Utc::now(),
                },
            );
            Ok(())
        }
        Statement::CreateTableAs { table, .. } => Err(StoreError::Unsupported(format!(
            "raw SQL cannot be materialized into `{}` in memory",
            table
        ))),
        Statement::InsertSelect {
            table,
            columns,
            query,
        } => {
            let result = evaluate(query, &*tables)?;
            if result.columns.len() != columns.len() {
                return Err(StoreError::evaluation(format!(
                    "insert into `{}` lists {} columns but the query returns {}",
                    table,
                    columns.len(),
                    result.columns.len()
                )));
            }
            insert_rows(tables, table, columns, result.rows)
        }
        Statement::InsertValues {
            table,
            columns,
            rows,
        } => insert_rows(tables, table, columns, rows.clone()),
        Statement::DropTable { table } => {
            tables.remove(table);
            Ok(())
        }
        Statement::ExchangeTables { left, right } => {
            let a = tables.remove(left).ok_or_else(|| StoreError::TableNotFound {
                table: left.clone(),
            })?;
            let b = match tables.remove(right) {
                Some(b) => b,
                None => {
                    tables.insert(left.clone(), a);
                    return Err(StoreError::TableNotFound {
                        table: right.clone(),
                    });
                }
            };
            tables.insert(left.clone(), b);
            tables.insert(right.clone(), a);
            Ok(())
        }
        Statement::RenameTable { from, to } => {
            if tables.contains_key(to) {
                return Err(StoreError::TableExists { table: to.clone() });
            }
            let mem = tables.remove(from).ok_or_else(|| StoreError::TableNotFound {
                table: from.clone(),
            })?;
            tables.insert(to.clone(), mem);
            Ok(())
        }
        Statement::AssertUnique { table, columns } => assert_unique(tables, table, columns),
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(MemTable::column_names)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.tables.contains_key(table))
    }

    async fn table_generated_at(
        &self,
        table: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.generated_at))
    }

    async fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        let delay = self.state.lock().await.statement_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.executed.push(statement.clone());
        let target = statement.target_table();
        if state.fail_prefixes.iter().any(|p| target.starts_with(p.as_str())) {
            log::debug!("MemoryStore: injected failure for `{}`", target);
            return Err(StoreError::Injected(target.to_string()));
        }
        apply(&mut state, statement)
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let state = self.state.lock().await;
        let result = evaluate(query, &state.tables)?;
        Ok(into_rows(result))
    }

    async fn publish(&self, renames: &[(String, String)]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for (staging, _) in renames {
            if !state.tables.contains_key(staging) {
                return Err(StoreError::TableNotFound {
                    table: staging.clone(),
                });
            }
        }
        let now = Utc::now();
        for (staging, live) in renames {
            if state
                .publish_fail_prefixes
                .iter()
                .any(|p| live.starts_with(p.as_str()))
            {
                log::debug!("MemoryStore: injected publish failure for `{}`", live);
                return Err(StoreError::Injected(live.clone()));
            }
            if let Some(mut mem) = state.tables.remove(staging) {
                mem.generated_at = now;
                state.tables.insert(live.clone(), mem);
            }
            state.executed.push(Statement::RenameTable {
                from: staging.clone(),
                to: live.clone(),
            });
        }
        Ok(())
    }

    async fn drop_tables(&self, tables: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for table in tables {
            state.tables.remove(table);
        }
        Ok(())
    }
}
