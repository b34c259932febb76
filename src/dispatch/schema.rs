//! Declarative input checks attached to routes.

use super::params::{Param, Params};
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Text that is not blank
    NonEmptyText,
    TextList,
    Object,
    Integer,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldRule {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    fn check(&self, param: Param<'_>) -> Result<(), String> {
        if param.is_missing() {
            return match self.required {
                true => Err(format!("{}: required", self.name)),
                false => Ok(()),
            };
        }

        let ok = match self.kind {
            FieldKind::Text => param.as_text().is_some(),
            FieldKind::NonEmptyText => param.as_text().is_some_and(|s| !s.trim().is_empty()),
            FieldKind::TextList => param.as_text_list().is_some(),
            FieldKind::Object => param.as_object().is_some(),
            FieldKind::Integer => param.as_int().is_some(),
        };
        match ok {
            true => Ok(()),
            false => Err(format!("{}: expected {:?}", self.name, self.kind)),
        }
    }
}

/// The fields a route accepts.
#[derive(Debug)]
pub struct Schema {
    pub fields: &'static [FieldRule],
}

impl Schema {
    pub const fn new(fields: &'static [FieldRule]) -> Self {
        Self { fields }
    }

    /// Check every rule, reporting all failures at once.
    pub fn validate(&self, params: &Params) -> Result<(), AppError> {
        let failures: Vec<String> = self
            .fields
            .iter()
            .filter_map(|rule| rule.check(params.get(rule.name)).err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(failures.join("; ")))
        }
    }
}
