//! REST API module.
//!
//! The route table and the handlers that orchestrate concept calls for each route.

mod friends;
mod posts;
mod users;
mod webapps;

use axum::routing::MethodFilter;
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::{handler, Params, Route};
use crate::errors::AppError;
use crate::AppState;

/// Every API route.
pub fn routes() -> Vec<Route> {
    use MethodFilter as M;

    vec![
        // Session
        Route::new(M::GET, "/api/session", handler!(users::get_session_user)),
        Route::new(M::POST, "/api/login", handler!(users::login))
            .with_schema(&users::CREDENTIALS),
        Route::new(M::POST, "/api/logout", handler!(users::logout)),
        // Users
        Route::new(M::GET, "/api/users", handler!(users::get_users)),
        Route::new(M::GET, "/api/users/{username}", handler!(users::get_user)),
        Route::new(M::POST, "/api/users", handler!(users::create_user))
            .with_schema(&users::CREDENTIALS),
        Route::new(M::PATCH, "/api/users", handler!(users::update_username))
            .with_schema(&users::RENAME),
        Route::new(M::PATCH, "/api/password", handler!(users::update_password))
            .with_schema(&users::PASSWORD),
        Route::new(M::DELETE, "/api/users", handler!(users::delete_user)),
        // Posts
        Route::new(M::GET, "/api/posts", handler!(posts::get_posts)),
        Route::new(M::POST, "/api/posts", handler!(posts::create_post))
            .with_schema(&posts::CREATE),
        Route::new(M::PATCH, "/api/posts/{id}", handler!(posts::update_post))
            .with_schema(&posts::UPDATE),
        Route::new(M::DELETE, "/api/posts/{id}", handler!(posts::delete_post)),
        // Friends
        Route::new(M::GET, "/api/friends", handler!(friends::get_friends)),
        Route::new(M::DELETE, "/api/friends/{friend}", handler!(friends::remove_friend)),
        Route::new(M::GET, "/api/friend/requests", handler!(friends::get_requests)),
        Route::new(M::POST, "/api/friend/requests/{to}", handler!(friends::send_request)),
        Route::new(M::DELETE, "/api/friend/requests/{to}", handler!(friends::remove_request)),
        Route::new(M::PUT, "/api/friend/accept/{from}", handler!(friends::accept_request)),
        Route::new(M::PUT, "/api/friend/reject/{from}", handler!(friends::reject_request)),
        // Webapps
        Route::new(M::GET, "/api/webapps", handler!(webapps::get_webapps)),
        Route::new(M::GET, "/api/webapps/{id}", handler!(webapps::get_webapp)),
        Route::new(M::POST, "/api/webapps", handler!(webapps::create_webapp))
            .with_schema(&webapps::CREATE),
        Route::new(M::PATCH, "/api/webapps/{id}", handler!(webapps::update_webapp))
            .with_schema(&webapps::UPDATE),
        Route::new(M::DELETE, "/api/webapps/{id}", handler!(webapps::delete_webapp)),
        Route::new(M::GET, "/api/webapps/{id}/similar", handler!(webapps::get_similar)),
        // Tags
        Route::new(M::GET, "/api/webapps/{id}/tags", handler!(webapps::get_tags)),
        Route::new(M::POST, "/api/webapps/{id}/tags", handler!(webapps::add_tags))
            .with_schema(&webapps::TAGS),
        Route::new(M::DELETE, "/api/webapps/{id}/tags", handler!(webapps::delete_tags))
            .with_schema(&webapps::TAGS),
        Route::new(M::GET, "/api/tags/top", handler!(webapps::get_top_tags))
            .with_schema(&webapps::TOP_TAGS),
        Route::new(M::GET, "/api/tags/{tag}/webapps", handler!(webapps::get_tagged_webapps)),
        // Graph
        Route::new(M::GET, "/api/graph", handler!(webapps::get_graph)),
    ]
}

/// The logged-in user's id.
async fn current_user(state: &AppState, params: &Params) -> Result<String, AppError> {
    let session = params.session.lock().await;
    Ok(state.app.sessioning.get_user(&session)?)
}

/// Resolve an optional `username` parameter to a user id.
async fn user_id_param(
    state: &AppState,
    params: &Params,
    name: &str,
) -> Result<Option<String>, AppError> {
    match params.opt_text(name)? {
        Some(username) => {
            let user = state.app.authenticating.get_user_by_username(&username).await?;
            Ok(Some(user.id))
        }
        None => Ok(None),
    }
}

/// Serialize records for a response, replacing the user ids under `fields` with usernames.
async fn with_usernames<T: Serialize>(
    state: &AppState,
    records: Vec<T>,
    fields: &[&str],
) -> Result<Vec<Value>, AppError> {
    let mut values = records
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()?;

    let ids: Vec<String> = values
        .iter()
        .flat_map(|value| {
            fields
                .iter()
                .filter_map(move |field| value.get(*field)?.as_str().map(str::to_string))
        })
        .collect();
    let mut usernames = state
        .app
        .authenticating
        .ids_to_usernames(&ids)
        .await?
        .into_iter();

    for value in &mut values {
        for field in fields {
            if let Some(slot) = value.get_mut(*field).filter(|slot| slot.is_string()) {
                if let Some(username) = usernames.next() {
                    *slot = Value::String(username);
                }
            }
        }
    }
    Ok(values)
}

/// Like [`with_usernames`] for a single record.
async fn with_username<T: Serialize>(
    state: &AppState,
    record: T,
    fields: &[&str],
) -> Result<Value, AppError> {
    Ok(with_usernames(state, vec![record], fields)
        .await?
        .pop()
        .unwrap_or(Value::Null))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(value)?)
}
