//! Named request parameters gathered from the path, the query string and the JSON body.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::{AppError, ConceptError};
use crate::session_store::Session;

/// Where a parameter was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param<'a> {
    Path(&'a str),
    Query(&'a str),
    Body(&'a Value),
    Missing,
}

impl<'a> Param<'a> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Param::Missing)
    }

    /// The value as text, if it is textual.
    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Param::Path(s) | Param::Query(s) => Some(s),
            Param::Body(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The value as a list of strings. Query and path values are comma separated.
    pub fn as_text_list(&self) -> Option<Vec<String>> {
        match *self {
            Param::Path(s) | Param::Query(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            Param::Body(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Param::Path(s) | Param::Query(s) => s.trim().parse().ok(),
            Param::Body(value) => value.as_i64(),
            Param::Missing => None,
        }
    }

    pub fn as_object(&self) -> Option<&'a Map<String, Value>> {
        match *self {
            Param::Body(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// Everything a route handler gets from its request.
#[derive(Debug, Clone)]
pub struct Params {
    path: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Map<String, Value>,
    pub session: Session,
}

impl Params {
    pub fn new(
        path: HashMap<String, String>,
        query: HashMap<String, String>,
        body: Map<String, Value>,
        session: Session,
    ) -> Self {
        Self {
            path,
            query,
            body,
            session,
        }
    }

    /// Look a name up in the path, then the query string, then the body.
    ///
    /// A body field set to `null` counts as missing.
    pub fn get(&self, name: &str) -> Param<'_> {
        if let Some(value) = self.path.get(name) {
            return Param::Path(value);
        }
        if let Some(value) = self.query.get(name) {
            return Param::Query(value);
        }
        match self.body.get(name) {
            Some(Value::Null) | None => Param::Missing,
            Some(value) => Param::Body(value),
        }
    }

    pub fn path(&self) -> &HashMap<String, String> {
        &self.path
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn text(&self, name: &str) -> Result<String, AppError> {
        self.opt_text(name)?.ok_or_else(|| missing(name))
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<String>, AppError> {
        let param = self.get(name);
        if param.is_missing() {
            return Ok(None);
        }
        param
            .as_text()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(name, "expected text"))
    }

    pub fn text_list(&self, name: &str) -> Result<Vec<String>, AppError> {
        let param = self.get(name);
        if param.is_missing() {
            return Err(missing(name));
        }
        param
            .as_text_list()
            .ok_or_else(|| invalid(name, "expected a list of strings"))
    }

    pub fn opt_text_list(&self, name: &str) -> Result<Option<Vec<String>>, AppError> {
        if self.get(name).is_missing() {
            return Ok(None);
        }
        self.text_list(name).map(Some)
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, AppError> {
        let param = self.get(name);
        if param.is_missing() {
            return Ok(None);
        }
        param
            .as_int()
            .map(Some)
            .ok_or_else(|| invalid(name, "expected an integer"))
    }

    /// Decode an object parameter into `T`.
    pub fn opt_object<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        let param = self.get(name);
        if param.is_missing() {
            return Ok(None);
        }
        let object = param
            .as_object()
            .ok_or_else(|| invalid(name, "expected an object"))?;
        serde_json::from_value(Value::Object(object.clone()))
            .map(Some)
            .map_err(|e| invalid(name, &e.to_string()))
    }
}

fn missing(name: &str) -> AppError {
    ConceptError::bad_values("Missing parameter {0}!").arg(name).into()
}

fn invalid(name: &str, reason: &str) -> AppError {
    AppError::Validation(format!("{}: {}", name, reason))
}
