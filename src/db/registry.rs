//! Ownership of collection names.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::errors::AppError;

/// Tracks which collection names are already bound to a store.
///
/// Each name may be claimed once; clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct CollectionRegistry {
    names: Arc<Mutex<BTreeSet<String>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for a new store.
    ///
    /// Fails if the name was claimed before or is not a plain lowercase identifier (names
    /// are used as table names).
    pub fn claim(&self, name: &str) -> Result<(), AppError> {
        if !is_valid_name(name) {
            return Err(AppError::Internal(format!(
                "Invalid collection name {:?}",
                name
            )));
        }

        let mut names = self
            .names
            .lock()
            .map_err(|_| AppError::Internal("Collection registry lock poisoned".to_string()))?;

        if !names.insert(name.to_string()) {
            return Err(AppError::Internal(format!(
                "Collection {} is already bound to a store",
                name
            )));
        }

        tracing::debug!("Bound collection {}", name);
        Ok(())
    }

    /// Names claimed so far, sorted.
    pub fn names(&self) -> Vec<String> {
        self.names
            .lock()
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_once() {
        let registry = CollectionRegistry::new();
        assert!(registry.claim("users").is_ok());
        assert!(registry.claim("posts").is_ok());
        assert!(registry.claim("users").is_err());
        assert_eq!(registry.names(), vec!["posts", "users"]);
    }

    #[test]
    fn test_clones_share_names() {
        let registry = CollectionRegistry::new();
        let other = registry.clone();
        registry.claim("webapps").unwrap();
        assert!(other.claim("webapps").is_err());
    }

    #[test]
    fn test_rejects_unsafe_names() {
        let registry = CollectionRegistry::new();
        assert!(registry.claim("").is_err());
        assert!(registry.claim("Users").is_err());
        assert!(registry.claim("9lives").is_err());
        assert!(registry.claim("users; DROP TABLE x").is_err());
        assert!(registry.claim("friend_requests").is_ok());
    }
}
