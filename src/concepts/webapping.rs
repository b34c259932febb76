//! Webapp bookmarks owned by users.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use super::patch;
use crate::db::{CollectionRegistry, DocCollection, Filter, Order, Stored};
use crate::errors::{AppError, ConceptError};

pub const WEBAPP_COLLECTION: &str = "webapps";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebappDoc {
    /// Owning user id
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

pub type Webapp = Stored<WebappDoc>;

/// Fields a webapp update may change; `None` leaves the field alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebappUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl WebappUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.url.is_none()
    }
}

pub struct Webapping {
    webapps: DocCollection<WebappDoc>,
}

impl Webapping {
    pub async fn new(registry: &CollectionRegistry, pool: SqlitePool) -> Result<Self, AppError> {
        Ok(Self {
            webapps: DocCollection::new(registry, pool, WEBAPP_COLLECTION).await?,
        })
    }

    pub async fn create(
        &self,
        owner: &str,
        name: &str,
        description: &str,
        url: &str,
    ) -> Result<Webapp, AppError> {
        assert_non_empty(name, url)?;

        let doc = WebappDoc {
            owner: owner.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            url: url.to_string(),
        };
        let id = self.webapps.create_one(&doc).await?;
        self.get_by_id(&id).await
    }

    /// Webapps of one owner, or all webapps, newest first.
    pub async fn get_webapps(&self, owner: Option<&str>) -> Result<Vec<Webapp>, AppError> {
        let filter = match owner {
            Some(owner) => Filter::eq("owner", owner),
            None => Filter::All,
        };
        self.webapps.read_many(&filter, Order::NewestFirst).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Webapp, AppError> {
        self.webapps
            .read_one(&Filter::id(id))
            .await?
            .ok_or_else(|| ConceptError::not_found("Webapp {0} does not exist!").arg(id).into())
    }

    /// Webapps with the given ids, in `ids` order; unknown ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Webapp>, AppError> {
        let mut found = self
            .webapps
            .read_many(&Filter::ids(ids.iter().cloned()), Order::Inserted)
            .await?;
        found.sort_by_key(|webapp| ids.iter().position(|id| id == &webapp.id));
        Ok(found)
    }

    /// Apply an update. Succeeds silently when `id` matches nothing; callers assert
    /// ownership first.
    pub async fn update(&self, id: &str, update: &WebappUpdate) -> Result<(), AppError> {
        let blank = |field: &Option<String>| field.as_deref().is_some_and(|s| s.trim().is_empty());
        if blank(&update.name) || blank(&update.url) {
            return Err(ConceptError::bad_values("Webapp name and url must be non-empty!").into());
        }

        let fields = patch([
            ("name", update.name.clone().map(Value::from)),
            ("description", update.description.clone().map(Value::from)),
            ("url", update.url.clone().map(Value::from)),
        ]);
        if fields.is_empty() {
            return Ok(());
        }
        self.webapps.partial_update_one(&Filter::id(id), fields).await?;
        Ok(())
    }

    /// Delete by id; deleting a missing webapp is not an error.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.webapps.delete_one(&Filter::id(id)).await?;
        Ok(())
    }

    pub async fn assert_owner_is_user(&self, id: &str, user: &str) -> Result<(), AppError> {
        let webapp = self.get_by_id(id).await?;
        if webapp.fields.owner != user {
            return Err(ConceptError::wrong_user("{0} is not the owner of webapp {1}!")
                .user_arg(user)
                .arg(id)
                .into());
        }
        Ok(())
    }
}

fn assert_non_empty(name: &str, url: &str) -> Result<(), ConceptError> {
    if name.trim().is_empty() || url.trim().is_empty() {
        return Err(ConceptError::bad_values("Webapp name and url must be non-empty!"));
    }
    Ok(())
}
