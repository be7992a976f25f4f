//! Typed statement and query model for cache tables
//!
//! Every table the cache writes or reads is described with these types instead of
//! concatenated SQL strings. The same model is rendered to ClickHouse SQL by
//! [`ToSql`] and evaluated directly by the in-memory store, so column lists for
//! CREATE, SELECT and GROUP BY always come from one place.
//!
//! The model only covers what the cache pipeline needs: single-level selects with
//! inner/left equi-joins, grouping, a handful of aggregates and a dense row index.

pub mod errors;
pub mod to_sql;

pub use errors::QueryBuilderError;
pub use to_sql::ToSql;

use crate::cache_store::Value;

/// Physical column type used in cache tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    String,
}

impl ColumnType {
    /// Value a non-nullable column takes when NULL is inserted
    pub fn default_value(&self) -> Value {
        match self {
            ColumnType::Int64 => Value::Int(0),
            ColumnType::Float64 => Value::Float(0.0),
            ColumnType::String => Value::String(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }

    pub fn nullable(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Sorting key; empty means `tuple()`
    pub order_by: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            order_by: Vec::new(),
        }
    }

    pub fn ordered_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// A statement that changes the store
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(TableDef),
    /// Materialize the result of opaque report SQL into a new table
    CreateTableAs { table: String, sql: String },
    InsertSelect {
        table: String,
        columns: Vec<String>,
        query: Query,
    },
    InsertValues {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    DropTable { table: String },
    ExchangeTables { left: String, right: String },
    RenameTable { from: String, to: String },
    /// Fails with a uniqueness violation if any key appears more than once
    AssertUnique { table: String, columns: Vec<String> },
}

impl Statement {
    /// Table the statement writes to (or checks)
    pub fn target_table(&self) -> &str {
        match self {
            Statement::CreateTable(def) => &def.name,
            Statement::CreateTableAs { table, .. }
            | Statement::InsertSelect { table, .. }
            | Statement::InsertValues { table, .. }
            | Statement::DropTable { table }
            | Statement::AssertUnique { table, .. } => table,
            Statement::ExchangeTables { left, .. } => left,
            Statement::RenameTable { from, .. } => from,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<Select>),
    /// `UNION DISTINCT` of all branches; column names come from the first branch
    Union(Vec<Query>),
}

impl Query {
    pub fn union_distinct(branches: Vec<Query>) -> Self {
        Query::Union(branches)
    }
}

impl From<Select> for Query {
    fn from(select: Select) -> Self {
        Query::Select(Box::new(select))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table { name: String, alias: Option<String> },
    Subquery { query: Box<Query>, alias: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    /// Equality conditions as `(joined side, existing side)`
    pub on: Vec<(Expr, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: Source,
    pub joins: Vec<Join>,
    pub group_by: Vec<Expr>,
    /// Evaluated against output aliases; also orders [`Expr::RowIndex`]
    pub order_by: Vec<Expr>,
}

impl Select {
    pub fn from_table(name: impl Into<String>) -> Self {
        Self::from_source(Source::Table {
            name: name.into(),
            alias: None,
        })
    }

    pub fn from_aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::from_source(Source::Table {
            name: name.into(),
            alias: Some(alias.into()),
        })
    }

    pub fn from_subquery(query: Query, alias: impl Into<String>) -> Self {
        Self::from_source(Source::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        })
    }

    fn from_source(from: Source) -> Self {
        Self {
            distinct: false,
            projection: Vec::new(),
            from,
            joins: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn column(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.projection.push(SelectItem {
            expr,
            alias: alias.into(),
        });
        self
    }

    pub fn join(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: Vec<(Expr, Expr)>,
    ) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            alias: alias.into(),
            on,
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, expr: Expr) -> Self {
        self.order_by.push(expr);
        self
    }

    pub fn aliases(&self) -> Vec<String> {
        self.projection.iter().map(|i| i.alias.clone()).collect()
    }

    /// True when the projection needs grouping semantics
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty() || self.projection.iter().any(|i| i.expr.has_aggregate())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Max(Box<Expr>),
    Any(Box<Expr>),
    CountDistinct(Vec<Expr>),
    Greater(Box<Expr>, Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    IfNull(Box<Expr>, Value),
    ToString(Box<Expr>),
    /// Zero-based position of the output row after ordering
    RowIndex,
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef {
            table: None,
            name: name.into(),
        })
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef {
            table: Some(table.into()),
            name: name.into(),
        })
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn max(expr: Expr) -> Self {
        Expr::Max(Box::new(expr))
    }

    pub fn any(expr: Expr) -> Self {
        Expr::Any(Box::new(expr))
    }

    pub fn count_distinct(exprs: Vec<Expr>) -> Self {
        Expr::CountDistinct(exprs)
    }

    pub fn greater(left: Expr, right: Expr) -> Self {
        Expr::Greater(Box::new(left), Box::new(right))
    }

    pub fn if_then(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn if_null(expr: Expr, default: Value) -> Self {
        Expr::IfNull(Box::new(expr), default)
    }

    pub fn to_text(expr: Expr) -> Self {
        Expr::ToString(Box::new(expr))
    }

    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Max(_) | Expr::Any(_) | Expr::CountDistinct(_) => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::RowIndex => false,
            Expr::Greater(l, r) => l.has_aggregate() || r.has_aggregate(),
            Expr::If {
                cond,
                then,
                otherwise,
            } => cond.has_aggregate() || then.has_aggregate() || otherwise.has_aggregate(),
            Expr::IfNull(e, _) | Expr::ToString(e) => e.has_aggregate(),
        }
    }
}
