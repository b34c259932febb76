//! Post API endpoints.

use serde_json::{json, Value};

use super::{current_user, user_id_param, with_username, with_usernames};
use crate::concepts::PostOptions;
use crate::dispatch::{FieldKind, FieldRule, Params, Schema};
use crate::errors::AppError;
use crate::AppState;

pub static CREATE: Schema = Schema::new(&[
    FieldRule::required("content", FieldKind::NonEmptyText),
    FieldRule::optional("options", FieldKind::Object),
]);

pub static UPDATE: Schema = Schema::new(&[
    FieldRule::optional("content", FieldKind::Text),
    FieldRule::optional("options", FieldKind::Object),
]);

/// GET /api/posts - All posts, or one author's with `?author=`, newest first.
pub async fn get_posts(state: AppState, params: Params) -> Result<Value, AppError> {
    let posts = match user_id_param(&state, &params, "author").await? {
        Some(author) => state.app.posting.get_by_author(&author).await?,
        None => state.app.posting.get_posts().await?,
    };
    Ok(Value::from(with_usernames(&state, posts, &["author"]).await?))
}

/// POST /api/posts
pub async fn create_post(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let content = params.text("content")?;
    let options: Option<PostOptions> = params.opt_object("options")?;

    let post = state.app.posting.create(&user, &content, options).await?;
    Ok(json!({
        "msg": "Post successfully created!",
        "post": with_username(&state, post, &["author"]).await?,
    }))
}

/// PATCH /api/posts/{id} - Author only.
pub async fn update_post(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let id = params.text("id")?;
    state.app.posting.assert_author_is_user(&id, &user).await?;

    let content = params.opt_text("content")?;
    let options: Option<PostOptions> = params.opt_object("options")?;
    state
        .app
        .posting
        .update(&id, content.as_deref(), options)
        .await?;
    Ok(json!({ "msg": "Post successfully updated!" }))
}

/// DELETE /api/posts/{id} - Author only.
pub async fn delete_post(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let id = params.text("id")?;
    state.app.posting.assert_author_is_user(&id, &user).await?;
    state.app.posting.delete(&id).await?;
    Ok(json!({ "msg": "Post deleted successfully!" }))
}
