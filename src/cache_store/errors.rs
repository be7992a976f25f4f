use thiserror::Error;

use crate::query_builder::QueryBuilderError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Table `{table}` does not exist")]
    TableNotFound { table: String },
    #[error("Table `{table}` already exists")]
    TableExists { table: String },
    #[error("Column `{column}` not found (known columns: {known})")]
    ColumnNotFound { column: String, known: String },
    #[error("Duplicate key {key} in `{table}` on ({columns})")]
    UniqueViolation {
        table: String,
        columns: String,
        key: String,
    },
    #[error("Statement not supported by this store: {0}")]
    Unsupported(String),
    #[error("Query evaluation failed: {0}")]
    Evaluation(String),
    #[error("Could not decode store response: {0}")]
    Decode(String),
    #[error(transparent)]
    Query(#[from] QueryBuilderError),
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),
    #[error("Injected failure on `{0}`")]
    Injected(String),
}

impl StoreError {
    pub fn column_not_found(column: impl Into<String>, known: &[String]) -> Self {
        StoreError::ColumnNotFound {
            column: column.into(),
            known: known.join(", "),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        StoreError::Evaluation(message.into())
    }
}
