//! Evaluator for the typed query model over in-memory tables
//!
//! Follows ClickHouse semantics where the cache pipeline depends on them:
//! aggregates skip NULL, `uniqExact` ignores tuples containing NULL, NULL join
//! keys never match, `UNION DISTINCT` keeps first occurrences in order, and a
//! grouping select without GROUP BY yields exactly one row.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::errors::StoreError;
use super::value::{KeyPart, Value};
use crate::query_builder::{Expr, Join, JoinKind, Query, Select, Source};

#[derive(Debug, Clone, Default)]
pub(crate) struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub(crate) trait TableScan {
    fn scan(&self, table: &str) -> Result<ResultSet, StoreError>;
}

type Env = HashMap<String, Value>;

pub(crate) fn evaluate(query: &Query, tables: &dyn TableScan) -> Result<ResultSet, StoreError> {
    match query {
        Query::Select(select) => evaluate_select(select, tables),
        Query::Union(branches) => {
            if branches.is_empty() {
                return Err(StoreError::evaluation("UNION without branches"));
            }
            let mut columns: Option<Vec<String>> = None;
            let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
            let mut rows = Vec::new();
            for branch in branches {
                let result = evaluate(branch, tables)?;
                match &columns {
                    None => columns = Some(result.columns.clone()),
                    Some(first) if first.len() != result.columns.len() => {
                        return Err(StoreError::evaluation(format!(
                            "UNION branches differ in width ({} vs {})",
                            first.len(),
                            result.columns.len()
                        )));
                    }
                    Some(_) => {}
                }
                for row in result.rows {
                    let key: Vec<KeyPart> = row.iter().map(Value::key).collect();
                    if seen.insert(key) {
                        rows.push(row);
                    }
                }
            }
            Ok(ResultSet {
                columns: columns.unwrap_or_default(),
                rows,
            })
        }
    }
}

fn bind(env: &mut Env, qualifier: &str, columns: &[String], row: Vec<Value>) {
    for (column, value) in columns.iter().zip(row) {
        env.insert(format!("{}.{}", qualifier, column), value.clone());
        env.entry(column.clone()).or_insert(value);
    }
}

fn source_envs(source: &Source, tables: &dyn TableScan) -> Result<Vec<Env>, StoreError> {
    let (result, qualifier) = match source {
        Source::Table { name, alias } => (
            tables.scan(name)?,
            alias.clone().unwrap_or_else(|| name.clone()),
        ),
        Source::Subquery { query, alias } => (evaluate(query, tables)?, alias.clone()),
    };
    let columns = result.columns;
    Ok(result
        .rows
        .into_iter()
        .map(|row| {
            let mut env = Env::new();
            bind(&mut env, &qualifier, &columns, row);
            env
        })
        .collect())
}

/// Returns `None` when any key part is NULL
fn join_key<'a>(
    exprs: impl Iterator<Item = &'a Expr>,
    env: &Env,
) -> Result<Option<Vec<KeyPart>>, StoreError> {
    let mut key = Vec::new();
    for expr in exprs {
        let value = eval_row(expr, env)?;
        if value.is_null() {
            return Ok(None);
        }
        key.push(value.key());
    }
    Ok(Some(key))
}

fn apply_join(envs: Vec<Env>, join: &Join, tables: &dyn TableScan) -> Result<Vec<Env>, StoreError> {
    let right = tables.scan(&join.table)?;
    let right_columns = right.columns;
    let right_envs: Vec<Env> = right
        .rows
        .into_iter()
        .map(|row| {
            let mut env = Env::new();
            bind(&mut env, &join.alias, &right_columns, row);
            env
        })
        .collect();

    let mut index: HashMap<Vec<KeyPart>, Vec<usize>> = HashMap::new();
    for (position, env) in right_envs.iter().enumerate() {
        if let Some(key) = join_key(join.on.iter().map(|(joined, _)| joined), env)? {
            index.entry(key).or_default().push(position);
        }
    }

    let mut joined = Vec::with_capacity(envs.len());
    for env in envs {
        let key = join_key(join.on.iter().map(|(_, existing)| existing), &env)?;
        match key.as_ref().and_then(|k| index.get(k)) {
            Some(positions) => {
                for &position in positions {
                    let mut merged = env.clone();
                    for (name, value) in &right_envs[position] {
                        merged.entry(name.clone()).or_insert_with(|| value.clone());
                    }
                    joined.push(merged);
                }
            }
            None if join.kind == JoinKind::Left => {
                let mut merged = env;
                for column in &right_columns {
                    merged
                        .entry(format!("{}.{}", join.alias, column))
                        .or_insert(Value::Null);
                    merged.entry(column.clone()).or_insert(Value::Null);
                }
                joined.push(merged);
            }
            None => {}
        }
    }
    Ok(joined)
}

fn lookup(env: &Env, key: &str) -> Result<Value, StoreError> {
    env.get(key).cloned().ok_or_else(|| {
        let mut known: Vec<String> = env.keys().cloned().collect();
        known.sort();
        StoreError::column_not_found(key, &known)
    })
}

fn greater(left: Value, right: Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    Value::Bool(left.sql_cmp(&right) == Ordering::Greater)
}

fn to_text(value: Value) -> Value {
    if value.is_null() {
        Value::Null
    } else {
        Value::String(value.to_text())
    }
}

fn eval_row(expr: &Expr, env: &Env) -> Result<Value, StoreError> {
    match expr {
        Expr::Column(col) => match &col.table {
            Some(table) => lookup(env, &format!("{}.{}", table, col.name)),
            None => lookup(env, &col.name),
        },
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Max(_) | Expr::Any(_) | Expr::CountDistinct(_) => Err(StoreError::evaluation(
            "aggregate function used outside of a grouping select",
        )),
        Expr::Greater(l, r) => Ok(greater(eval_row(l, env)?, eval_row(r, env)?)),
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            if eval_row(cond, env)?.is_truthy() {
                eval_row(then, env)
            } else {
                eval_row(otherwise, env)
            }
        }
        Expr::IfNull(inner, default) => {
            let value = eval_row(inner, env)?;
            Ok(if value.is_null() { default.clone() } else { value })
        }
        Expr::ToString(inner) => Ok(to_text(eval_row(inner, env)?)),
        Expr::RowIndex => Ok(Value::Null),
    }
}

fn eval_group(expr: &Expr, rows: &[Env]) -> Result<Value, StoreError> {
    match expr {
        Expr::Max(inner) => {
            let mut best = Value::Null;
            for env in rows {
                let value = eval_row(inner, env)?;
                if value.is_null() {
                    continue;
                }
                if best.is_null() || value.sql_cmp(&best) == Ordering::Greater {
                    best = value;
                }
            }
            Ok(best)
        }
        Expr::Any(inner) => {
            for env in rows {
                let value = eval_row(inner, env)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        Expr::CountDistinct(items) => {
            let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
            for env in rows {
                if let Some(key) = join_key(items.iter(), env)? {
                    seen.insert(key);
                }
            }
            Ok(Value::Int(seen.len() as i64))
        }
        Expr::Greater(l, r) => Ok(greater(eval_group(l, rows)?, eval_group(r, rows)?)),
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            if eval_group(cond, rows)?.is_truthy() {
                eval_group(then, rows)
            } else {
                eval_group(otherwise, rows)
            }
        }
        Expr::IfNull(inner, default) => {
            let value = eval_group(inner, rows)?;
            Ok(if value.is_null() { default.clone() } else { value })
        }
        Expr::ToString(inner) => Ok(to_text(eval_group(inner, rows)?)),
        Expr::Column(_) | Expr::Literal(_) | Expr::RowIndex => match rows.first() {
            Some(env) => eval_row(expr, env),
            None if matches!(expr, Expr::Literal(_)) => eval_row(expr, &Env::new()),
            None => Ok(Value::Null),
        },
    }
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.sql_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn evaluate_select(select: &Select, tables: &dyn TableScan) -> Result<ResultSet, StoreError> {
    let mut envs = source_envs(&select.from, tables)?;
    for join in &select.joins {
        envs = apply_join(envs, join, tables)?;
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    if select.is_aggregate() {
        let mut order: Vec<Vec<KeyPart>> = Vec::new();
        let mut groups: HashMap<Vec<KeyPart>, Vec<Env>> = HashMap::new();
        if select.group_by.is_empty() {
            order.push(Vec::new());
            groups.insert(Vec::new(), envs);
        } else {
            for env in envs {
                let mut key = Vec::with_capacity(select.group_by.len());
                for expr in &select.group_by {
                    key.push(eval_row(expr, &env)?.key());
                }
                let members = groups.entry(key.clone()).or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                });
                members.push(env);
            }
        }
        for key in &order {
            let members = groups.get(key).map(Vec::as_slice).unwrap_or(&[]);
            let mut row = Vec::with_capacity(select.projection.len());
            for item in &select.projection {
                row.push(eval_group(&item.expr, members)?);
            }
            rows.push(row);
        }
    } else {
        for env in &envs {
            let mut row = Vec::with_capacity(select.projection.len());
            for item in &select.projection {
                row.push(eval_row(&item.expr, env)?);
            }
            rows.push(row);
        }
    }

    if select.distinct {
        let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
        rows.retain(|row| seen.insert(row.iter().map(Value::key).collect()));
    }

    let aliases = select.aliases();
    if !select.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let env: Env = aliases.iter().cloned().zip(row.iter().cloned()).collect();
            let mut keys = Vec::with_capacity(select.order_by.len());
            for expr in &select.order_by {
                keys.push(eval_row(expr, &env)?);
            }
            keyed.push((keys, row));
        }
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0));
        rows = keyed.into_iter().map(|(_, row)| row).collect();
    }

    for (position, item) in select.projection.iter().enumerate() {
        if item.expr == Expr::RowIndex {
            for (index, row) in rows.iter_mut().enumerate() {
                row[position] = Value::Int(index as i64);
            }
        }
    }

    Ok(ResultSet {
        columns: aliases,
        rows,
    })
}
