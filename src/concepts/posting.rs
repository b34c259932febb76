//! Status posts, written by users or logged on their behalf.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use super::patch;
use crate::db::{CollectionRegistry, DocCollection, Filter, Order, Stored};
use crate::errors::{AppError, ConceptError};

pub const POST_COLLECTION: &str = "posts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Friends,
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDoc {
    pub author: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PostOptions>,
}

pub type Post = Stored<PostDoc>;

pub struct Posting {
    posts: DocCollection<PostDoc>,
}

impl Posting {
    pub async fn new(registry: &CollectionRegistry, pool: SqlitePool) -> Result<Self, AppError> {
        Ok(Self {
            posts: DocCollection::new(registry, pool, POST_COLLECTION).await?,
        })
    }

    pub async fn create(
        &self,
        author: &str,
        content: &str,
        options: Option<PostOptions>,
    ) -> Result<Post, AppError> {
        assert_content(content)?;

        let doc = PostDoc {
            author: author.to_string(),
            content: content.to_string(),
            options,
        };
        let id = self.posts.create_one(&doc).await?;
        self.get_by_id(&id).await
    }

    /// Every post, newest first.
    pub async fn get_posts(&self) -> Result<Vec<Post>, AppError> {
        self.posts.read_many(&Filter::All, Order::NewestFirst).await
    }

    pub async fn get_by_author(&self, author: &str) -> Result<Vec<Post>, AppError> {
        self.posts
            .read_many(&Filter::eq("author", author), Order::NewestFirst)
            .await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Post, AppError> {
        self.posts
            .read_one(&Filter::id(id))
            .await?
            .ok_or_else(|| ConceptError::not_found("Post {0} does not exist!").arg(id).into())
    }

    pub async fn update(
        &self,
        id: &str,
        content: Option<&str>,
        options: Option<PostOptions>,
    ) -> Result<(), AppError> {
        if let Some(content) = content {
            assert_content(content)?;
        }

        let options = options.map(serde_json::to_value).transpose()?;
        let fields = patch([("content", content.map(Value::from)), ("options", options)]);
        if fields.is_empty() {
            return Ok(());
        }
        self.posts.partial_update_one(&Filter::id(id), fields).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.posts.delete_one(&Filter::id(id)).await?;
        Ok(())
    }

    pub async fn assert_author_is_user(&self, id: &str, user: &str) -> Result<(), AppError> {
        let post = self.get_by_id(id).await?;
        if post.fields.author != user {
            return Err(ConceptError::wrong_user("{0} is not the author of post {1}!")
                .user_arg(user)
                .arg(id)
                .into());
        }
        Ok(())
    }
}

fn assert_content(content: &str) -> Result<(), ConceptError> {
    if content.trim().is_empty() {
        return Err(ConceptError::bad_values("Post content must be non-empty!"));
    }
    Ok(())
}
