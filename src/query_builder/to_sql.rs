use lazy_static::lazy_static;
use regex::Regex;

use super::errors::QueryBuilderError;
use super::{
    ColumnDef, ColumnRef, ColumnType, Expr, Join, JoinKind, Query, Select, Source, Statement,
    TableDef,
};
use crate::cache_store::Value;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex");
}

/// Render a model node as ClickHouse SQL
pub trait ToSql {
    fn to_sql(&self) -> Result<String, QueryBuilderError>;
}

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Backtick-quote an identifier after validating it
pub fn quote_identifier(name: &str) -> Result<String, QueryBuilderError> {
    if !is_valid_identifier(name) {
        return Err(QueryBuilderError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{}`", name))
}

/// Escape a string value for use inside a ClickHouse single-quoted literal
///
/// Backslash must be replaced first.
pub(crate) fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .replace('\0', "\\0")
}

fn literal_sql(value: &Value) -> Result<String, QueryBuilderError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) if f.is_finite() => {
            // Keep a decimal point so ClickHouse infers Float64, not an integer
            if f.fract() == 0.0 {
                Ok(format!("{:.1}", f))
            } else {
                Ok(f.to_string())
            }
        }
        Value::Float(f) => Err(QueryBuilderError::NonFiniteLiteral(*f)),
        Value::String(s) => Ok(format!("'{}'", escape_string(s))),
    }
}

impl ToSql for ColumnType {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        Ok(match self {
            ColumnType::Int64 => "Int64",
            ColumnType::Float64 => "Float64",
            ColumnType::String => "String",
        }
        .to_string())
    }
}

impl ToSql for ColumnDef {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        let ty = self.data_type.to_sql()?;
        let ty = if self.nullable {
            format!("Nullable({})", ty)
        } else {
            ty
        };
        Ok(format!("{} {}", quote_identifier(&self.name)?, ty))
    }
}

impl ToSql for TableDef {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        let columns: Result<Vec<String>, _> = self.columns.iter().map(|c| c.to_sql()).collect();
        let order_by = if self.order_by.is_empty() {
            "tuple()".to_string()
        } else {
            let keys: Result<Vec<String>, _> =
                self.order_by.iter().map(|c| quote_identifier(c)).collect();
            format!("({})", keys?.join(", "))
        };
        Ok(format!(
            "CREATE TABLE {} (\n  {}\n) ENGINE = MergeTree ORDER BY {}",
            quote_identifier(&self.name)?,
            columns?.join(",\n  "),
            order_by
        ))
    }
}

fn column_list(columns: &[String]) -> Result<String, QueryBuilderError> {
    let quoted: Result<Vec<String>, _> = columns.iter().map(|c| quote_identifier(c)).collect();
    Ok(quoted?.join(", "))
}

impl ToSql for Statement {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        match self {
            Statement::CreateTable(def) => def.to_sql(),
            Statement::CreateTableAs { table, sql } => Ok(format!(
                "CREATE TABLE {} ENGINE = MergeTree ORDER BY tuple() AS\n{}",
                quote_identifier(table)?,
                sql.trim().trim_end_matches(';')
            )),
            Statement::InsertSelect {
                table,
                columns,
                query,
            } => Ok(format!(
                "INSERT INTO {} ({})\n{}",
                quote_identifier(table)?,
                column_list(columns)?,
                query.to_sql()?
            )),
            Statement::InsertValues {
                table,
                columns,
                rows,
            } => {
                let mut tuples = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(QueryBuilderError::ValueCountMismatch {
                            table: table.clone(),
                            columns: columns.len(),
                            values: row.len(),
                        });
                    }
                    let values: Result<Vec<String>, _> = row.iter().map(literal_sql).collect();
                    tuples.push(format!("({})", values?.join(", ")));
                }
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    quote_identifier(table)?,
                    column_list(columns)?,
                    tuples.join(", ")
                ))
            }
            Statement::DropTable { table } => {
                Ok(format!("DROP TABLE IF EXISTS {}", quote_identifier(table)?))
            }
            Statement::ExchangeTables { left, right } => Ok(format!(
                "EXCHANGE TABLES {} AND {}",
                quote_identifier(left)?,
                quote_identifier(right)?
            )),
            Statement::RenameTable { from, to } => Ok(format!(
                "RENAME TABLE {} TO {}",
                quote_identifier(from)?,
                quote_identifier(to)?
            )),
            Statement::AssertUnique { table, columns } => {
                if columns.is_empty() {
                    return Err(QueryBuilderError::EmptyUniqueKey(table.clone()));
                }
                let keys = column_list(columns)?;
                Ok(format!(
                    "SELECT count() AS duplicates FROM (SELECT {} FROM {} GROUP BY {} HAVING count() > 1)",
                    keys,
                    quote_identifier(table)?,
                    keys
                ))
            }
        }
    }
}

impl ToSql for ColumnRef {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        match &self.table {
            Some(table) => Ok(format!(
                "{}.{}",
                quote_identifier(table)?,
                quote_identifier(&self.name)?
            )),
            None => quote_identifier(&self.name),
        }
    }
}

impl ToSql for Expr {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        expr_sql(self, &[])
    }
}

/// `window_order` is the ORDER BY of the enclosing select, used by `RowIndex`
fn expr_sql(expr: &Expr, window_order: &[Expr]) -> Result<String, QueryBuilderError> {
    match expr {
        Expr::Column(col) => col.to_sql(),
        Expr::Literal(value) => literal_sql(value),
        Expr::Max(inner) => Ok(format!("max({})", expr_sql(inner, window_order)?)),
        Expr::Any(inner) => Ok(format!("any({})", expr_sql(inner, window_order)?)),
        Expr::CountDistinct(items) => {
            let args: Result<Vec<String>, _> =
                items.iter().map(|e| expr_sql(e, window_order)).collect();
            Ok(format!("uniqExact({})", args?.join(", ")))
        }
        Expr::Greater(l, r) => Ok(format!(
            "({} > {})",
            expr_sql(l, window_order)?,
            expr_sql(r, window_order)?
        )),
        Expr::If {
            cond,
            then,
            otherwise,
        } => Ok(format!(
            "if({}, {}, {})",
            expr_sql(cond, window_order)?,
            expr_sql(then, window_order)?,
            expr_sql(otherwise, window_order)?
        )),
        Expr::IfNull(inner, default) => Ok(format!(
            "ifNull({}, {})",
            expr_sql(inner, window_order)?,
            literal_sql(default)?
        )),
        Expr::ToString(inner) => Ok(format!("toString({})", expr_sql(inner, window_order)?)),
        Expr::RowIndex => {
            let over = if window_order.is_empty() {
                String::new()
            } else {
                let keys: Result<Vec<String>, _> =
                    window_order.iter().map(|e| expr_sql(e, &[])).collect();
                format!("ORDER BY {}", keys?.join(", "))
            };
            Ok(format!("toInt64(row_number() OVER ({})) - 1", over))
        }
    }
}

impl ToSql for Join {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        let kind = match self.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        let mut conditions = Vec::with_capacity(self.on.len());
        for (joined, existing) in &self.on {
            conditions.push(format!("{} = {}", joined.to_sql()?, existing.to_sql()?));
        }
        Ok(format!(
            "{} {} AS {} ON {}",
            kind,
            quote_identifier(&self.table)?,
            quote_identifier(&self.alias)?,
            conditions.join(" AND ")
        ))
    }
}

impl ToSql for Source {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        match self {
            Source::Table { name, alias: None } => quote_identifier(name),
            Source::Table {
                name,
                alias: Some(alias),
            } => Ok(format!(
                "{} AS {}",
                quote_identifier(name)?,
                quote_identifier(alias)?
            )),
            Source::Subquery { query, alias } => Ok(format!(
                "(\n{}\n) AS {}",
                query.to_sql()?,
                quote_identifier(alias)?
            )),
        }
    }
}

impl ToSql for Select {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        if self.projection.is_empty() {
            return Err(QueryBuilderError::EmptyProjection);
        }

        let mut items = Vec::with_capacity(self.projection.len());
        for item in &self.projection {
            items.push(format!(
                "{} AS {}",
                expr_sql(&item.expr, &self.order_by)?,
                quote_identifier(&item.alias)?
            ));
        }

        let mut sql = format!(
            "SELECT {}{}\nFROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            items.join(",\n  "),
            self.from.to_sql()?
        );

        for join in &self.joins {
            sql.push('\n');
            sql.push_str(&join.to_sql()?);
        }

        if !self.group_by.is_empty() {
            let keys: Result<Vec<String>, _> = self.group_by.iter().map(|e| e.to_sql()).collect();
            sql.push_str(&format!("\nGROUP BY {}", keys?.join(", ")));
        }

        if !self.order_by.is_empty() {
            let keys: Result<Vec<String>, _> = self.order_by.iter().map(|e| e.to_sql()).collect();
            sql.push_str(&format!("\nORDER BY {}", keys?.join(", ")));
        }

        Ok(sql)
    }
}

impl ToSql for Query {
    fn to_sql(&self) -> Result<String, QueryBuilderError> {
        match self {
            Query::Select(select) => select.to_sql(),
            Query::Union(branches) => {
                if branches.is_empty() {
                    return Err(QueryBuilderError::EmptyUnion);
                }
                let parts: Result<Vec<String>, _> = branches.iter().map(|b| b.to_sql()).collect();
                Ok(parts?.join("\nUNION DISTINCT\n"))
            }
        }
    }
}
