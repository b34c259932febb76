//! User accounts: registration, credential checks, and lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use super::patch;
use crate::auth::{hash_password, verify_password};
use crate::db::{CollectionRegistry, DocCollection, Filter, Order, Stored};
use crate::errors::{AppError, ConceptError};

pub const USER_COLLECTION: &str = "users";

/// Display name used for ids that no longer resolve to a user.
pub const DELETED_USER: &str = "DELETED_USER";

/// User document as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
}

/// A user with the password hash removed; the only shape reads hand out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl From<Stored<UserDoc>> for UserView {
    fn from(stored: Stored<UserDoc>) -> Self {
        Self {
            id: stored.id,
            username: stored.fields.username,
            date_created: stored.date_created,
            date_updated: stored.date_updated,
        }
    }
}

pub struct Authenticating {
    users: DocCollection<UserDoc>,
}

impl Authenticating {
    pub async fn new(registry: &CollectionRegistry, pool: SqlitePool) -> Result<Self, AppError> {
        Ok(Self {
            users: DocCollection::new(registry, pool, USER_COLLECTION).await?,
        })
    }

    /// Register a user. Usernames are unique and case-sensitive.
    pub async fn create(&self, username: &str, password: &str) -> Result<UserView, AppError> {
        if username.is_empty() || password.is_empty() {
            return Err(ConceptError::bad_values("Username and password must be non-empty!").into());
        }

        let doc = UserDoc {
            username: username.to_string(),
            password_hash: hash_password(password).await?,
        };
        let id = self
            .users
            .create_one_unless(&doc, &Filter::eq("username", username))
            .await?
            .ok_or_else(|| {
                ConceptError::not_allowed("User with username {0} already exists!").arg(username)
            })?;

        tracing::info!("Registered user {}", id);
        self.get_user_by_id(&id).await
    }

    /// Check credentials and return the user's id.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, AppError> {
        let incorrect = || ConceptError::not_allowed("Username or password is incorrect.");

        let user = self
            .users
            .read_one(&Filter::eq("username", username))
            .await?
            .ok_or_else(incorrect)?;

        if !verify_password(password, &user.fields.password_hash).await? {
            return Err(incorrect().into());
        }
        Ok(user.id)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<UserView, AppError> {
        self.users
            .read_one(&Filter::id(id))
            .await?
            .map(UserView::from)
            .ok_or_else(|| ConceptError::not_found("User not found!").into())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<UserView, AppError> {
        self.users
            .read_one(&Filter::eq("username", username))
            .await?
            .map(UserView::from)
            .ok_or_else(|| ConceptError::not_found("User {0} not found!").arg(username).into())
    }

    /// Users whose name starts with `prefix`, or every user.
    pub async fn get_users(&self, prefix: Option<&str>) -> Result<Vec<UserView>, AppError> {
        let filter = match prefix {
            Some(prefix) => Filter::starts_with("username", prefix),
            None => Filter::All,
        };
        let users = self.users.read_many(&filter, Order::Inserted).await?;
        Ok(users.into_iter().map(UserView::from).collect())
    }

    /// Resolve ids to usernames in input order.
    ///
    /// Unknown ids come back as [`DELETED_USER`] instead of failing.
    pub async fn ids_to_usernames(&self, ids: &[String]) -> Result<Vec<String>, AppError> {
        let users = self
            .users
            .read_many(&Filter::ids(ids.iter().cloned()), Order::Inserted)
            .await?;

        Ok(ids
            .iter()
            .map(|id| {
                users
                    .iter()
                    .find(|user| &user.id == id)
                    .map(|user| user.fields.username.clone())
                    .unwrap_or_else(|| DELETED_USER.to_string())
            })
            .collect())
    }

    pub async fn update_username(&self, id: &str, username: &str) -> Result<(), AppError> {
        if username.is_empty() {
            return Err(ConceptError::bad_values("Username must be non-empty!").into());
        }
        self.assert_user_exists(id).await?;

        if let Some(existing) = self
            .users
            .read_one(&Filter::eq("username", username))
            .await?
        {
            if existing.id != id {
                return Err(ConceptError::not_allowed("User with username {0} already exists!")
                    .arg(username)
                    .into());
            }
        }

        let update = patch([("username", Some(Value::from(username)))]);
        self.users.partial_update_one(&Filter::id(id), update).await?;
        Ok(())
    }

    pub async fn update_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .users
            .read_one(&Filter::id(id))
            .await?
            .ok_or_else(|| ConceptError::not_found("User not found!"))?;

        if !verify_password(current_password, &user.fields.password_hash).await? {
            return Err(ConceptError::not_allowed("The given current password is wrong!").into());
        }
        if new_password.is_empty() {
            return Err(ConceptError::bad_values("Password must be non-empty!").into());
        }

        let hash = hash_password(new_password).await?;
        let update = patch([("passwordHash", Some(Value::from(hash)))]);
        self.users.partial_update_one(&Filter::id(id), update).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.users.delete_one(&Filter::id(id)).await?;
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    pub async fn assert_user_exists(&self, id: &str) -> Result<(), AppError> {
        if self.users.count(&Filter::id(id)).await? == 0 {
            return Err(ConceptError::not_found("User not found!").into());
        }
        Ok(())
    }
}
