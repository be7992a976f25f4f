//! Parameter binding for report SQL
//!
//! Replaces `$paramName` placeholders with ClickHouse literals. Placeholders
//! inside single-quoted string literals are left alone.

use serde_json::Value;
use std::collections::BTreeMap;

use super::errors::ParameterBindingError;
use crate::query_builder::to_sql::escape_string;

fn format_parameter(name: &str, value: &Value) -> Result<String, ParameterBindingError> {
    match value {
        Value::String(s) => Ok(format!("'{}'", escape_string(s))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Ok(u.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => Ok(f.to_string()),
                    _ => Err(ParameterBindingError::UnsupportedType {
                        name: name.to_string(),
                        message: format!("non-finite number {}", n),
                    }),
                }
            }
        }
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Array(items) => {
            let rendered: Result<Vec<String>, _> =
                items.iter().map(|v| format_parameter(name, v)).collect();
            Ok(format!("[{}]", rendered?.join(", ")))
        }
        Value::Null => Ok("NULL".to_string()),
        Value::Object(_) => Err(ParameterBindingError::UnsupportedType {
            name: name.to_string(),
            message: "objects cannot be bound; pass a JSON string instead".to_string(),
        }),
    }
}

/// Bind every `$name` placeholder in `sql`
pub fn bind_parameters(
    sql: &str,
    parameters: &BTreeMap<String, Value>,
) -> Result<String, ParameterBindingError> {
    let mut result = String::with_capacity(sql.len() * 2);
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;

    while let Some(ch) = chars.next() {
        if in_literal {
            result.push(ch);
            match ch {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        result.push(escaped);
                    }
                }
                '\'' => in_literal = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '\'' => {
                in_literal = true;
                result.push(ch);
            }
            '$' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    result.push('$');
                    continue;
                }
                let value = parameters
                    .get(&name)
                    .ok_or_else(|| ParameterBindingError::MissingParameter(name.clone()))?;
                result.push_str(&format_parameter(&name, value)?);
            }
            _ => result.push(ch),
        }
    }

    if in_literal {
        return Err(ParameterBindingError::UnterminatedLiteral);
    }
    Ok(result)
}
