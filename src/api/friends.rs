//! Friend and friend-request API endpoints. Other users are addressed by username.

use serde_json::{json, Value};

use super::{current_user, with_usernames};
use crate::dispatch::Params;
use crate::errors::AppError;
use crate::AppState;

async fn user_id(state: &AppState, params: &Params, name: &str) -> Result<String, AppError> {
    let username = params.text(name)?;
    Ok(state
        .app
        .authenticating
        .get_user_by_username(&username)
        .await?
        .id)
}

/// GET /api/friends - Usernames of the logged-in user's friends.
pub async fn get_friends(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let friends = state.app.friending.get_friends(&user).await?;
    let usernames = state.app.authenticating.ids_to_usernames(&friends).await?;
    Ok(Value::from(usernames))
}

/// DELETE /api/friends/{friend}
pub async fn remove_friend(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let friend = user_id(&state, &params, "friend").await?;
    state.app.friending.remove_friend(&user, &friend).await?;
    Ok(json!({ "msg": "Unfriended!" }))
}

/// GET /api/friend/requests - Pending requests to and from the logged-in user.
pub async fn get_requests(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let requests = state.app.friending.get_requests(&user).await?;
    Ok(Value::from(
        with_usernames(&state, requests, &["from", "to"]).await?,
    ))
}

/// POST /api/friend/requests/{to}
pub async fn send_request(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let to = user_id(&state, &params, "to").await?;
    state.app.friending.send_request(&user, &to).await?;
    Ok(json!({ "msg": "Sent request!" }))
}

/// DELETE /api/friend/requests/{to} - Withdraw a request.
pub async fn remove_request(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let to = user_id(&state, &params, "to").await?;
    state.app.friending.remove_request(&user, &to).await?;
    Ok(json!({ "msg": "Removed request!" }))
}

/// PUT /api/friend/accept/{from}
pub async fn accept_request(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let from = user_id(&state, &params, "from").await?;
    state.app.friending.accept_request(&from, &user).await?;
    Ok(json!({ "msg": "Accepted request!" }))
}

/// PUT /api/friend/reject/{from}
pub async fn reject_request(state: AppState, params: Params) -> Result<Value, AppError> {
    let user = current_user(&state, &params).await?;
    let from = user_id(&state, &params, "from").await?;
    state.app.friending.reject_request(&from, &user).await?;
    Ok(json!({ "msg": "Rejected request!" }))
}
