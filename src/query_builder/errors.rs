use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryBuilderError {
    #[error("Invalid identifier `{0}` (only letters, digits and underscore are allowed)")]
    InvalidIdentifier(String),
    #[error("SELECT has no projection items (at least one column is required)")]
    EmptyProjection,
    #[error("UNION requires at least one branch")]
    EmptyUnion,
    #[error("INSERT into `{table}` lists {columns} columns but a row carries {values} values")]
    ValueCountMismatch {
        table: String,
        columns: usize,
        values: usize,
    },
    #[error("Uniqueness check on `{0}` needs at least one key column")]
    EmptyUniqueKey(String),
    #[error("Non-finite float literal: {0}")]
    NonFiniteLiteral(f64),
}
