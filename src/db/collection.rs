//! Typed, timestamp-tracked CRUD over one collection of JSON documents.
//!
//! A collection is a table `(id, date_created, date_updated, doc)`. Callers hand the
//! collection a field shape `T`; the id and both timestamps live outside `T` in [`Stored`]
//! and are only ever written here.

use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use super::{Bind, CollectionRegistry, Filter};
use crate::errors::AppError;

/// Keys owned by the store; stripped from anything a caller writes.
const RESERVED_KEYS: [&str; 3] = ["_id", "dateCreated", "dateUpdated"];

/// A document as stored: the caller's fields plus store-owned id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    #[serde(rename = "_id")]
    pub id: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: T,
}

/// Result ordering for [`DocCollection::read_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Insertion order
    #[default]
    Inserted,
    /// Most recently updated first
    NewestFirst,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Inserted => "rowid ASC",
            Order::NewestFirst => "date_updated DESC, rowid DESC",
        }
    }
}

/// Typed collection bound to one table.
pub struct DocCollection<T> {
    pool: SqlitePool,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DocCollection<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for DocCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocCollection")
            .field("name", &self.name)
            .finish()
    }
}

impl<T> DocCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin,
{
    /// Bind `name` to a new store and create its table if needed.
    ///
    /// Fails fast when the registry already holds a store for `name`.
    pub async fn new(
        registry: &CollectionRegistry,
        pool: SqlitePool,
        name: &str,
    ) -> Result<Self, AppError> {
        registry.claim(name)?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS "{name}" (
                id TEXT PRIMARY KEY,
                date_created TEXT NOT NULL,
                date_updated TEXT NOT NULL,
                doc TEXT NOT NULL
            )"#
        ))
        .execute(&pool)
        .await?;

        sqlx::query(&format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{name}_date_updated" ON "{name}"(date_updated)"#
        ))
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    /// Insert one document and return its new id.
    pub async fn create_one(&self, fields: &T) -> Result<String, AppError> {
        let doc = to_document(fields)?;
        let id = new_id();
        let now = timestamp(Utc::now());

        sqlx::query(&format!(
            r#"INSERT INTO "{}" (id, date_created, date_updated, doc) VALUES (?, ?, ?, ?)"#,
            self.name
        ))
        .bind(&id)
        .bind(&now)
        .bind(&now)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Insert one document unless a document matching `conflict` exists.
    ///
    /// The existence check and the insert are one statement, so two concurrent calls cannot
    /// both insert. Returns `None` when a conflicting document exists.
    pub async fn create_one_unless(
        &self,
        fields: &T,
        conflict: &Filter,
    ) -> Result<Option<String>, AppError> {
        let doc = to_document(fields)?;
        let id = new_id();
        let now = timestamp(Utc::now());
        let (predicate, binds) = conflict.to_sql();

        let sql = format!(
            r#"INSERT INTO "{name}" (id, date_created, date_updated, doc)
               SELECT ?, ?, ?, ?
               WHERE NOT EXISTS (SELECT 1 FROM "{name}" WHERE {predicate})"#,
            name = self.name
        );
        let query = sqlx::query(&sql)
            .bind(id.clone())
            .bind(now.clone())
            .bind(now)
            .bind(doc);

        let result = bind_all(query, binds).execute(&self.pool).await?;
        Ok((result.rows_affected() > 0).then_some(id))
    }

    /// Insert several documents in one transaction.
    ///
    /// Returns the assigned id for each input position.
    pub async fn create_many(&self, items: &[T]) -> Result<HashMap<usize, String>, AppError> {
        let docs = items
            .iter()
            .map(to_document)
            .collect::<Result<Vec<_>, _>>()?;
        let now = timestamp(Utc::now());
        let sql = format!(
            r#"INSERT INTO "{}" (id, date_created, date_updated, doc) VALUES (?, ?, ?, ?)"#,
            self.name
        );

        let mut ids = HashMap::with_capacity(docs.len());
        let mut tx = self.pool.begin().await?;
        for (position, doc) in docs.into_iter().enumerate() {
            let id = new_id();
            sqlx::query(&sql)
                .bind(&id)
                .bind(&now)
                .bind(&now)
                .bind(doc)
                .execute(&mut *tx)
                .await?;
            ids.insert(position, id);
        }
        tx.commit().await?;

        Ok(ids)
    }

    /// First document matching `filter` in insertion order, if any.
    pub async fn read_one(&self, filter: &Filter) -> Result<Option<Stored<T>>, AppError> {
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"SELECT id, date_created, date_updated, doc FROM "{}" WHERE {} ORDER BY rowid ASC LIMIT 1"#,
            self.name, predicate
        );

        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// All documents matching `filter`.
    pub async fn read_many(&self, filter: &Filter, order: Order) -> Result<Vec<Stored<T>>, AppError> {
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"SELECT id, date_created, date_updated, doc FROM "{}" WHERE {} ORDER BY {}"#,
            self.name,
            predicate,
            order.as_sql()
        );

        let rows = bind_all(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    /// Replace the fields of the first matching document.
    ///
    /// The id and creation time are kept; the update time is refreshed. Returns whether a
    /// document matched.
    pub async fn replace_one(&self, filter: &Filter, fields: &T) -> Result<bool, AppError> {
        let doc = to_document(fields)?;
        let now = timestamp(Utc::now());
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"UPDATE "{name}" SET doc = ?, date_updated = ?
               WHERE id = (SELECT id FROM "{name}" WHERE {predicate} ORDER BY rowid ASC LIMIT 1)"#,
            name = self.name
        );

        let query = sqlx::query(&sql).bind(doc).bind(now);
        let result = bind_all(query, binds).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Merge `update` into the first matching document.
    ///
    /// Only the supplied keys change; a `null` value removes the key. Returns whether a
    /// document matched.
    pub async fn partial_update_one(
        &self,
        filter: &Filter,
        update: Map<String, Value>,
    ) -> Result<bool, AppError> {
        let patch = serde_json::to_string(&strip_reserved(update))?;
        let now = timestamp(Utc::now());
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"UPDATE "{name}" SET doc = json_patch(doc, ?), date_updated = ?
               WHERE id = (SELECT id FROM "{name}" WHERE {predicate} ORDER BY rowid ASC LIMIT 1)"#,
            name = self.name
        );

        let query = sqlx::query(&sql).bind(patch).bind(now);
        let result = bind_all(query, binds).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Add `values` to the array `field` of every matching document, skipping values already
    /// present. A missing field starts as an empty array. Returns the number of documents
    /// that matched.
    pub async fn add_to_set(
        &self,
        filter: &Filter,
        field: &str,
        values: &[Value],
    ) -> Result<u64, AppError> {
        self.edit_arrays(filter, field, |array| {
            for value in values {
                if !array.contains(value) {
                    array.push(value.clone());
                }
            }
        })
        .await
    }

    /// Remove every occurrence of `values` from the array `field` of every matching document.
    /// Returns the number of documents that matched.
    pub async fn pull_all(
        &self,
        filter: &Filter,
        field: &str,
        values: &[Value],
    ) -> Result<u64, AppError> {
        self.edit_arrays(filter, field, |array| {
            array.retain(|existing| !values.contains(existing));
        })
        .await
    }

    async fn edit_arrays<F>(&self, filter: &Filter, field: &str, edit: F) -> Result<u64, AppError>
    where
        F: Fn(&mut Vec<Value>),
    {
        let (predicate, binds) = filter.to_sql();
        let stamp = format!(
            r#"UPDATE "{}" SET date_updated = ? WHERE {}"#,
            self.name, predicate
        );
        let select = format!(
            r#"SELECT id, doc FROM "{}" WHERE {} ORDER BY rowid ASC"#,
            self.name, predicate
        );
        let update = format!(r#"UPDATE "{}" SET doc = ? WHERE id = ?"#, self.name);
        let now = timestamp(Utc::now());

        // Write before reading. A transaction that reads first pins a WAL snapshot and fails
        // with SQLITE_BUSY_SNAPSHOT if another writer commits before its first write.
        let mut tx = self.pool.begin().await?;
        bind_all(sqlx::query(&stamp).bind(&now), binds.clone())
            .execute(&mut *tx)
            .await?;
        let rows = bind_all(sqlx::query(&select), binds)
            .fetch_all(&mut *tx)
            .await?;

        for row in &rows {
            let id: String = row.try_get("id")?;
            let doc: String = row.try_get("doc")?;
            let mut doc: Map<String, Value> = serde_json::from_str(&doc)?;

            let mut array = match doc.remove(field) {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => {
                    return Err(AppError::Internal(format!(
                        "Field {} of {} {} is not an array",
                        field, self.name, id
                    )))
                }
            };
            edit(&mut array);
            doc.insert(field.to_string(), Value::Array(array));

            sqlx::query(&update)
                .bind(serde_json::to_string(&doc)?)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(rows.len() as u64)
    }

    /// Delete the first matching document. Returns the number deleted (0 or 1).
    pub async fn delete_one(&self, filter: &Filter) -> Result<u64, AppError> {
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"DELETE FROM "{name}"
               WHERE id = (SELECT id FROM "{name}" WHERE {predicate} ORDER BY rowid ASC LIMIT 1)"#,
            name = self.name
        );

        let result = bind_all(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every matching document. Returns the number deleted.
    pub async fn delete_many(&self, filter: &Filter) -> Result<u64, AppError> {
        let (predicate, binds) = filter.to_sql();
        let sql = format!(r#"DELETE FROM "{}" WHERE {}"#, self.name, predicate);

        let result = bind_all(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, AppError> {
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"SELECT COUNT(*) AS n FROM "{}" WHERE {}"#,
            self.name, predicate
        );

        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    /// Delete the first matching document and return it, in one statement.
    pub async fn pop_one(&self, filter: &Filter) -> Result<Option<Stored<T>>, AppError> {
        let (predicate, binds) = filter.to_sql();
        let sql = format!(
            r#"DELETE FROM "{name}"
               WHERE id = (SELECT id FROM "{name}" WHERE {predicate} ORDER BY rowid ASC LIMIT 1)
               RETURNING id, date_created, date_updated, doc"#,
            name = self.name
        );

        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s),
            Bind::Int(i) => query.bind(i),
            Bind::Real(f) => query.bind(f),
            Bind::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width RFC 3339 so that text order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("Bad timestamp {:?}: {}", raw, e)))
}

fn strip_reserved(mut doc: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_KEYS {
        doc.remove(key);
    }
    doc
}

fn to_document<T: Serialize>(fields: &T) -> Result<String, AppError> {
    match serde_json::to_value(fields)? {
        Value::Object(doc) => Ok(serde_json::to_string(&strip_reserved(doc))?),
        other => Err(AppError::Internal(format!(
            "Documents must be JSON objects, got {}",
            other
        ))),
    }
}

fn decode_row<T: DeserializeOwned>(row: &SqliteRow) -> Result<Stored<T>, AppError> {
    let id: String = row.try_get("id")?;
    let date_created: String = row.try_get("date_created")?;
    let date_updated: String = row.try_get("date_updated")?;
    let doc: String = row.try_get("doc")?;

    Ok(Stored {
        id,
        date_created: parse_timestamp(&date_created)?,
        date_updated: parse_timestamp(&date_updated)?,
        fields: serde_json::from_str(&doc)?,
    })
}
