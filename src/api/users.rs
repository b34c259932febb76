//! User and session API endpoints.

use serde_json::{json, Value};

use super::{current_user, to_json};
use crate::dispatch::{FieldKind, FieldRule, Params, Schema};
use crate::errors::AppError;
use crate::AppState;

pub static CREDENTIALS: Schema = Schema::new(&[
    FieldRule::required("username", FieldKind::Text),
    FieldRule::required("password", FieldKind::Text),
]);

pub static RENAME: Schema = Schema::new(&[FieldRule::required("username", FieldKind::Text)]);

pub static PASSWORD: Schema = Schema::new(&[
    FieldRule::required("currentPassword", FieldKind::Text),
    FieldRule::required("newPassword", FieldKind::Text),
]);

/// GET /api/session - The logged-in user.
pub async fn get_session_user(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    to_json(state.app.authenticating.get_user_by_id(&user).await?)
}

/// POST /api/login - Check credentials and start a session.
pub async fn login(state: AppState, params: Params) -> Result<Value, AppError> {
    let username = params.text("username")?;
    let password = params.text("password")?;

    let mut session = params.session.lock().await;
    state.app.sessioning.is_logged_out(&session)?;
    let id = state
        .app
        .authenticating
        .authenticate(&username, &password)
        .await?;
    state.app.sessioning.start(&mut session, &id)?;

    tracing::info!("User {} logged in", username);
    Ok(json!({ "msg": "Logged in!", "_id": id }))
}

/// POST /api/logout - End the session.
pub async fn logout(state: AppState, params: Params) -> Result<Value, AppError> {
    let mut session = params.session.lock().await;
    state.app.sessioning.end(&mut session)?;
    Ok(json!({ "msg": "Logged out!" }))
}

/// GET /api/users - All users, or those whose name starts with `?username=`.
pub async fn get_users(state: AppState, params: Params) -> Result<Value, AppError> {
    let prefix = params.opt_text("username")?;
    to_json(state.app.authenticating.get_users(prefix.as_deref()).await?)
}

/// GET /api/users/{username}
pub async fn get_user(state: AppState, params: Params) -> Result<Value, AppError> {
    let username = params.text("username")?;
    to_json(state.app.authenticating.get_user_by_username(&username).await?)
}

/// POST /api/users - Register. Only allowed while logged out.
pub async fn create_user(state: AppState, params: Params) -> Result<Value, AppError> {
    let username = params.text("username")?;
    let password = params.text("password")?;

    {
        let session = params.session.lock().await;
        state.app.sessioning.is_logged_out(&session)?;
    }
    let user = state.app.authenticating.create(&username, &password).await?;

    Ok(json!({ "msg": "User created successfully!", "user": user }))
}

/// PATCH /api/users - Rename the logged-in user.
pub async fn update_username(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let username = params.text("username")?;
    state
        .app
        .authenticating
        .update_username(&user, &username)
        .await?;
    Ok(json!({ "msg": "Username updated successfully!" }))
}

/// PATCH /api/password - Change the logged-in user's password.
pub async fn update_password(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let current = params.text("currentPassword")?;
    let new = params.text("newPassword")?;
    state
        .app
        .authenticating
        .update_password(&user, &current, &new)
        .await?;
    Ok(json!({ "msg": "Password updated successfully!" }))
}

/// DELETE /api/users - Delete the logged-in user and end their sessions.
pub async fn delete_user(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = {
        let mut session = params.session.lock().await;
        let user = state.app.sessioning.get_user(&session)?;
        state.app.sessioning.end(&mut session)?;
        user
    };

    state.app.authenticating.delete(&user).await?;
    state.sessions.end_all_for(&user).await;
    Ok(json!({ "msg": "You deleted your account" }))
}
