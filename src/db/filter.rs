//! Document filters compiled to SQL over the JSON `doc` column.
//!
//! Field names and values are always bound as parameters; only the shape of the predicate is
//! written into the SQL text.

use serde_json::Value;

/// A predicate over stored documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,
    /// Document id equals
    Id(String),
    /// Document id is one of
    IdIn(Vec<String>),
    /// Top-level field equals a scalar (`Null` matches a missing field too)
    Eq(String, Value),
    /// Field differs from a scalar (a missing field differs from everything but `Null`)
    Ne(String, Value),
    /// Field equals one of the scalars
    In(String, Vec<Value>),
    /// Array field has an element equal to the scalar
    Contains(String, Value),
    /// String field starts with the prefix (case-sensitive)
    StartsWith(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Filter::Id(id.into())
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::IdIn(ids.into_iter().map(Into::into).collect())
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(field.to_string(), value.into())
    }

    pub fn one_of<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn starts_with(field: &str, prefix: impl Into<String>) -> Self {
        Filter::StartsWith(field.to_string(), prefix.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Compile into a SQL predicate and its positional bindings.
    pub fn to_sql(&self) -> (String, Vec<Bind>) {
        let mut sql = String::new();
        let mut binds = Vec::new();
        self.write_sql(&mut sql, &mut binds);
        (sql, binds)
    }

    fn write_sql(&self, sql: &mut String, binds: &mut Vec<Bind>) {
        match self {
            Filter::All => sql.push('1'),
            Filter::Id(id) => {
                sql.push_str("id = ?");
                binds.push(Bind::Text(id.clone()));
            }
            Filter::IdIn(ids) => {
                if ids.is_empty() {
                    sql.push('0');
                    return;
                }
                sql.push_str("id IN (");
                push_placeholders(sql, ids.len());
                sql.push(')');
                binds.extend(ids.iter().cloned().map(Bind::Text));
            }
            Filter::Eq(field, Value::Null) => {
                sql.push_str("json_extract(doc, ?) IS NULL");
                binds.push(path(field));
            }
            Filter::Eq(field, value) => {
                sql.push_str("json_extract(doc, ?) = ?");
                binds.push(path(field));
                binds.push(Bind::from_value(value));
            }
            Filter::Ne(field, Value::Null) => {
                sql.push_str("json_extract(doc, ?) IS NOT NULL");
                binds.push(path(field));
            }
            Filter::Ne(field, value) => {
                sql.push_str("(json_extract(doc, ?) IS NULL OR json_extract(doc, ?) != ?)");
                binds.push(path(field));
                binds.push(path(field));
                binds.push(Bind::from_value(value));
            }
            Filter::In(field, values) => {
                if values.is_empty() {
                    sql.push('0');
                    return;
                }
                sql.push_str("json_extract(doc, ?) IN (");
                push_placeholders(sql, values.len());
                sql.push(')');
                binds.push(path(field));
                binds.extend(values.iter().map(Bind::from_value));
            }
            Filter::Contains(field, value) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM json_each(doc, ?) AS elem WHERE elem.value = ?)",
                );
                binds.push(path(field));
                binds.push(Bind::from_value(value));
            }
            Filter::StartsWith(field, prefix) => {
                sql.push_str("substr(json_extract(doc, ?), 1, length(?)) = ?");
                binds.push(path(field));
                binds.push(Bind::Text(prefix.clone()));
                binds.push(Bind::Text(prefix.clone()));
            }
            Filter::And(parts) => write_joined(parts, " AND ", '1', sql, binds),
            Filter::Or(parts) => write_joined(parts, " OR ", '0', sql, binds),
        }
    }
}

fn write_joined(parts: &[Filter], sep: &str, empty: char, sql: &mut String, binds: &mut Vec<Bind>) {
    if parts.is_empty() {
        sql.push(empty);
        return;
    }
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(sep);
        }
        part.write_sql(sql, binds);
    }
    sql.push(')');
}

fn push_placeholders(sql: &mut String, n: usize) {
    for i in 0..n {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
    }
}

fn path(field: &str) -> Bind {
    Bind::Text(format!("$.\"{}\"", field.replace('"', "")))
}

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    Int(i64),
    Real(f64),
    Null,
}

impl Bind {
    /// Map a JSON scalar to the SQL value `json_extract` yields for it.
    ///
    /// Booleans become 0/1; arrays and objects compare as their JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Bind::Null,
            Value::Bool(b) => Bind::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Bind::Int(i),
                None => Bind::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Bind::Text(s.clone()),
            other => Bind::Text(other.to_string()),
        }
    }
}
