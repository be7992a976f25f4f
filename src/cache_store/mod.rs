//! Cache store contract and implementations
//!
//! The pipeline never talks to a database directly. Everything it needs from the
//! store is on [`CacheStore`]: column introspection, table metadata, executing
//! typed [`Statement`]s, fetching typed [`Query`] results, and publishing a set of
//! staging tables over their live names.
//!
//! - [`ClickHouseStore`] renders statements to SQL and talks HTTP to ClickHouse.
//! - [`MemoryStore`] keeps tables in process and evaluates the same model.

mod clickhouse_store;
mod errors;
mod eval;
mod memory_store;
mod value;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use clickhouse_store::ClickHouseStore;
pub use errors::StoreError;
pub use memory_store::MemoryStore;
pub use value::{KeyPart, Row, Value};

use crate::query_builder::{Query, Statement};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Physical column names of `table`, in table order
    async fn columns(&self, table: &str) -> Result<Vec<String>, StoreError>;

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// When the table was last (re)created, if the store tracks it
    async fn table_generated_at(&self, table: &str)
        -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn execute(&self, statement: &Statement) -> Result<(), StoreError>;

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Move each `(staging, live)` pair so `staging` becomes `live`, replacing
    /// whatever `live` held before. The old live tables are dropped.
    async fn publish(&self, renames: &[(String, String)]) -> Result<(), StoreError>;

    /// Drop tables if they exist
    async fn drop_tables(&self, tables: &[String]) -> Result<(), StoreError>;
}
