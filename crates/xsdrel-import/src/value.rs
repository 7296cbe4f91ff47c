//! The small set of value kinds the importer binds into SQL Server
//! parameters. XML text is always a string on the wire; [`coerce`] converts
//! it to the representation the target column's [`SqlType`] expects, and
//! [`default_for`] backfills a `NOT NULL` column with no bound value
//! (spec.md §4.6 step 6).

use xsdrel_model::model::SqlType;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// NULL-safe equality, matching the `( [c] = @u_c OR ([c] IS NULL AND
    /// @u_c IS NULL) )` predicate spec.md §4.6.7 issues against the
    /// database: two NULLs are equal, a NULL and a non-NULL are not.
    pub fn null_safe_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => a == b,
        }
    }
}

pub fn coerce(text: &str, sql_type: &SqlType) -> Value {
    let trimmed = text.trim();
    match sql_type {
        SqlType::Int | SqlType::BigInt | SqlType::SmallInt | SqlType::TinyInt => {
            trimmed.parse::<i64>().map(Value::Int).unwrap_or_else(|_| Value::Text(trimmed.to_string()))
        }
        SqlType::Decimal { .. } | SqlType::Float | SqlType::Real => {
            trimmed.parse::<f64>().map(Value::Float).unwrap_or_else(|_| Value::Text(trimmed.to_string()))
        }
        SqlType::Bit => match trimmed {
            "1" | "true" | "True" | "TRUE" => Value::Bool(true),
            "0" | "false" | "False" | "FALSE" => Value::Bool(false),
            other => Value::Text(other.to_string()),
        },
        SqlType::NVarChar(_) | SqlType::Date | SqlType::DateTime2 | SqlType::Time => {
            Value::Text(trimmed.to_string())
        }
    }
}

/// Type-appropriate default for a `NOT NULL` column with no bound value
/// (spec.md §4.6 step 6): empty string, `0`, `false`, or an epoch-like date.
pub fn default_for(sql_type: &SqlType) -> Value {
    match sql_type {
        SqlType::NVarChar(_) => Value::Text(String::new()),
        SqlType::Int | SqlType::BigInt | SqlType::SmallInt | SqlType::TinyInt => Value::Int(0),
        SqlType::Decimal { .. } | SqlType::Float | SqlType::Real => Value::Float(0.0),
        SqlType::Bit => Value::Bool(false),
        SqlType::Date | SqlType::DateTime2 | SqlType::Time => Value::Text("1900-01-01".to_string()),
    }
}
