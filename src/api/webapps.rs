//! Webapp, tag and graph API endpoints.
//!
//! Creating, changing or deleting a webapp also writes an activity post for its owner, and
//! every tag change recomputes the webapp's similarity edges.

use serde_json::{json, Value};

use super::{current_user, to_json, user_id_param, with_username, with_usernames};
use crate::concepts::{Tagging, WebappUpdate};
use crate::dispatch::{FieldKind, FieldRule, Params, Schema};
use crate::errors::{AppError, ConceptError};
use crate::AppState;

const DEFAULT_TOP_TAGS: usize = 10;

pub static CREATE: Schema = Schema::new(&[
    FieldRule::required("name", FieldKind::NonEmptyText),
    FieldRule::required("url", FieldKind::NonEmptyText),
    FieldRule::optional("description", FieldKind::Text),
    FieldRule::optional("tags", FieldKind::TextList),
]);

pub static UPDATE: Schema = Schema::new(&[
    FieldRule::optional("name", FieldKind::Text),
    FieldRule::optional("description", FieldKind::Text),
    FieldRule::optional("url", FieldKind::Text),
]);

pub static TAGS: Schema = Schema::new(&[FieldRule::required("tags", FieldKind::TextList)]);

pub static TOP_TAGS: Schema = Schema::new(&[
    FieldRule::optional("owner", FieldKind::Text),
    FieldRule::optional("limit", FieldKind::Integer),
]);

/// GET /api/webapps - All webapps, or one owner's with `?owner=`.
pub async fn get_webapps(state: AppState, params: Params) -> Result<Value, AppError> {
    let owner = user_id_param(&state, &params, "owner").await?;
    let webapps = state.app.webapping.get_webapps(owner.as_deref()).await?;
    Ok(Value::from(with_usernames(&state, webapps, &["owner"]).await?))
}

/// GET /api/webapps/{id}
pub async fn get_webapp(state: AppState, params: Params) -> Result<Value, AppError> {
    let webapp = state.app.webapping.get_by_id(&params.text("id")?).await?;
    with_username(&state, webapp, &["owner"]).await
}

/// POST /api/webapps - Create a webapp with its graph node and optional initial tags.
pub async fn create_webapp(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let name = params.text("name")?;
    let url = params.text("url")?;
    let description = params.opt_text("description")?.unwrap_or_default();
    let tags = params
        .opt_text_list("tags")?
        .map(|tags| Tagging::normalize(&tags))
        .transpose()?
        .unwrap_or_default();

    let app = &state.app;
    let webapp = app.webapping.create(&user, &name, &description, &url).await?;
    app.graphing.add_node(&user, &webapp.id).await?;
    if !tags.is_empty() {
        app.tagging.add_tags(&webapp.id, &tags).await?;
        app.refresh_edges(&user, &webapp.id).await?;
    }
    app.posting
        .create(&user, &format!("Added webapp {}", name), None)
        .await?;

    tracing::info!("Created webapp {} ({})", webapp.id, name);
    Ok(json!({
        "msg": "Webapp created successfully!",
        "webapp": with_username(&state, webapp, &["owner"]).await?,
    }))
}

/// PATCH /api/webapps/{id} - Owner only.
pub async fn update_webapp(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let id = params.text("id")?;
    let app = &state.app;
    app.webapping.assert_owner_is_user(&id, &user).await?;

    let update = WebappUpdate {
        name: params.opt_text("name")?,
        description: params.opt_text("description")?,
        url: params.opt_text("url")?,
    };
    if update.is_empty() {
        return Ok(json!({ "msg": "Nothing to update." }));
    }
    app.webapping.update(&id, &update).await?;

    let webapp = app.webapping.get_by_id(&id).await?;
    app.posting
        .create(&user, &format!("Updated webapp {}", webapp.fields.name), None)
        .await?;
    Ok(json!({ "msg": "Webapp updated successfully!" }))
}

/// DELETE /api/webapps/{id} - Owner only. Also drops the webapp's tags and graph node.
pub async fn delete_webapp(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let id = params.text("id")?;
    let app = &state.app;
    app.webapping.assert_owner_is_user(&id, &user).await?;

    let webapp = app.webapping.get_by_id(&id).await?;
    app.webapping.delete(&id).await?;
    app.tagging.delete_item(&id).await?;
    app.graphing.delete_node(&id).await?;
    app.posting
        .create(&user, &format!("Deleted webapp {}", webapp.fields.name), None)
        .await?;

    tracing::info!("Deleted webapp {}", id);
    Ok(json!({ "msg": "Webapp deleted successfully!" }))
}

/// GET /api/webapps/{id}/tags
pub async fn get_tags(state: AppState, params: Params) -> Result<Value, AppError> {
    let id = params.text("id")?;
    state.app.webapping.get_by_id(&id).await?;
    to_json(state.app.tagging.get_tags(&id).await?)
}

/// POST /api/webapps/{id}/tags - Owner only.
pub async fn add_tags(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let id = params.text("id")?;
    let tags = params.text_list("tags")?;
    let app = &state.app;
    app.webapping.assert_owner_is_user(&id, &user).await?;

    let tags = app.tagging.add_tags(&id, &tags).await?;
    app.refresh_edges(&user, &id).await?;
    Ok(json!({ "msg": "Tags added successfully!", "tags": tags }))
}

/// DELETE /api/webapps/{id}/tags - Owner only.
pub async fn delete_tags(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let id = params.text("id")?;
    let tags = params.text_list("tags")?;
    let app = &state.app;
    app.webapping.assert_owner_is_user(&id, &user).await?;

    let tags = app.tagging.delete_tags(&id, &tags).await?;
    app.refresh_edges(&user, &id).await?;
    Ok(json!({ "msg": "Tags deleted successfully!", "tags": tags }))
}

/// GET /api/webapps/{id}/similar - Webapps sharing a tag with this one.
pub async fn get_similar(state: AppState, params: Params) -> Result<Value, AppError> {
    let id = params.text("id")?;
    let app = &state.app;
    app.webapping.get_by_id(&id).await?;

    let neighbors = app.graphing.get_neighbors(&id).await?;
    let webapps = app.webapping.get_many(&neighbors).await?;
    Ok(Value::from(with_usernames(&state, webapps, &["owner"]).await?))
}

/// GET /api/tags/top - Most used tags, across all webapps or one `?owner=`'s.
pub async fn get_top_tags(state: AppState, params: Params) -> Result<Value, AppError> {
    let owner = user_id_param(&state, &params, "owner").await?;
    let limit = match params.opt_int("limit")? {
        Some(limit) => usize::try_from(limit)
            .map_err(|_| ConceptError::bad_values("Limit must be non-negative!"))?,
        None => DEFAULT_TOP_TAGS,
    };

    let items: Vec<String> = state
        .app
        .webapping
        .get_webapps(owner.as_deref())
        .await?
        .into_iter()
        .map(|webapp| webapp.id)
        .collect();
    to_json(state.app.tagging.top_tags_for_items(&items, limit).await?)
}

/// GET /api/tags/{tag}/webapps
pub async fn get_tagged_webapps(state: AppState, params: Params) -> Result<Value, AppError> {
    let tag = params.text("tag")?;
    let items = state.app.tagging.get_items_with_tag(&tag).await?;
    let webapps = state.app.webapping.get_many(&items).await?;
    Ok(Value::from(with_usernames(&state, webapps, &["owner"]).await?))
}

/// GET /api/graph - The similarity graph of `?owner=`, or of the logged-in user.
pub async fn get_graph(state: AppState, params: Params) -> Result<Value, AppError> {
    let owner = match user_id_param(&state, &params, "owner").await? {
        Some(owner) => owner,
        None => current_user(&state, &params).await?,
    };
    to_json(state.app.graphing.get_graph(&owner).await?)
}
