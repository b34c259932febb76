//! Request dispatcher.
//!
//! Routes are plain data: a method, a path, an optional input schema and a handler. The
//! dispatcher turns each request into [`Params`], validates them, runs the handler and
//! shapes the outcome: a `200` with the handler's JSON, or the error's status with
//! `{ "msg": ... }` after user ids in the message have been swapped for usernames.

mod params;
mod schema;

pub use params::*;
pub use schema::*;

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{on, MethodFilter},
    Json, Router,
};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::session_store::Session;
use crate::AppState;

pub type HandlerFuture = BoxFuture<'static, Result<Value, AppError>>;
pub type Handler = fn(AppState, Params) -> HandlerFuture;

/// Wrap an `async fn(AppState, Params) -> Result<Value, AppError>` as a [`Handler`].
macro_rules! handler {
    ($f:path) => {
        |state: $crate::AppState, params: $crate::dispatch::Params| -> $crate::dispatch::HandlerFuture {
            Box::pin($f(state, params))
        }
    };
}
pub(crate) use handler;

#[derive(Clone, Copy)]
pub struct Route {
    pub method: MethodFilter,
    pub path: &'static str,
    pub schema: Option<&'static Schema>,
    pub handler: Handler,
}

impl Route {
    pub fn new(method: MethodFilter, path: &'static str, handler: Handler) -> Self {
        Self {
            method,
            path,
            schema: None,
            handler,
        }
    }

    pub fn with_schema(mut self, schema: &'static Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

/// Register every route on one router.
pub fn build_router(routes: &[Route]) -> Router<AppState> {
    routes.iter().fold(Router::new(), |router, &route| {
        router.route(
            route.path,
            on(
                route.method,
                move |State(state): State<AppState>,
                      path: Result<Path<HashMap<String, String>>, PathRejection>,
                      query: Result<Query<HashMap<String, String>>, QueryRejection>,
                      headers: HeaderMap,
                      body: Bytes| async move {
                    // Routes without segments have no path params to extract.
                    let path = path.map(|Path(p)| p).unwrap_or_default();
                    let query = query.map(|Query(q)| q).map_err(|e| e.body_text());
                    dispatch(route, state, path, query, headers, body).await
                },
            ),
        )
    })
}

async fn dispatch(
    route: Route,
    state: AppState,
    path: HashMap<String, String>,
    query: Result<HashMap<String, String>, String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let loaded = state.sessions.load(&headers).await;

    let result = run(route, &state, path, query, &body, loaded.session.clone()).await;
    let set_cookie = state.sessions.save(&loaded).await;

    let mut response = match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => {
            if let AppError::Validation(detail) = &err {
                tracing::debug!("Rejected input for {}: {}", route.path, detail);
            }
            state.app.humanize(err).await.into_response()
        }
    };

    if let Some(cookie) = set_cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

async fn run(
    route: Route,
    state: &AppState,
    path: HashMap<String, String>,
    query: Result<HashMap<String, String>, String>,
    body: &[u8],
    session: Session,
) -> Result<Value, AppError> {
    let query = query.map_err(|e| AppError::Validation(format!("query: {}", e)))?;
    let params = Params::new(path, query, parse_body(body)?, session);

    if let Some(schema) = route.schema {
        schema.validate(&params)?;
    }
    (route.handler)(state.clone(), params).await
}

/// An empty body is an empty object; anything else must be a JSON object.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::Validation("body: expected a JSON object".to_string())),
        Err(e) => Err(AppError::Validation(format!("body: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::app::App;
    use crate::config::Config;
    use crate::db::testing::temp_pool;
    use crate::errors::{ConceptError, INVALID_INPUT_MESSAGE};
    use crate::session_store::SessionStore;

    static NAMED: Schema = Schema::new(&[FieldRule::required("name", FieldKind::NonEmptyText)]);

    async fn echo(_state: AppState, params: Params) -> Result<Value, AppError> {
        Ok(json!({
            "id": params.text("id")?,
            "name": params.opt_text("name")?,
        }))
    }

    async fn whoami(state: AppState, params: Params) -> Result<Value, AppError> {
        let session = params.session.lock().await;
        Ok(json!({ "user": state.app.sessioning.get_user(&session)? }))
    }

    async fn login(state: AppState, params: Params) -> Result<Value, AppError> {
        let user = params.text("user")?;
        let mut session = params.session.lock().await;
        state.app.sessioning.start(&mut session, &user)?;
        Ok(json!({ "msg": "Logged in!" }))
    }

    async fn not_owner(state: AppState, _params: Params) -> Result<Value, AppError> {
        let owner = state.app.authenticating.get_user_by_username("owner").await?;
        Err(ConceptError::wrong_user("{0} is not the owner of webapp {1}!")
            .user_arg(owner.id)
            .arg("w1")
            .into())
    }

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let (pool, dir) = temp_pool().await;
        let config = Config::default();
        let app = App::new(pool, &config).await.unwrap();
        let state = AppState {
            app: Arc::new(app),
            sessions: Arc::new(SessionStore::new("sid")),
        };
        (state, dir)
    }

    fn test_router(state: AppState) -> Router {
        let routes = [
            Route::new(MethodFilter::POST, "/echo/{id}", handler!(echo)).with_schema(&NAMED),
            Route::new(MethodFilter::GET, "/echo/{id}", handler!(echo)),
            Route::new(MethodFilter::GET, "/whoami", handler!(whoami)),
            Route::new(MethodFilter::POST, "/login", handler!(login)),
            Route::new(MethodFilter::DELETE, "/owned", handler!(not_owner)),
        ];
        build_router(&routes).with_state(state)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_path_wins_over_query_and_body() {
        let (state, _dir) = test_state().await;
        let router = test_router(state);

        let (status, _, body) = send(
            &router,
            post("/echo/from-path?id=from-query", json!({ "id": "from-body", "name": "n" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": "from-path", "name": "n" }));

        let (status, _, body) = send(&router, get("/echo/p?name=from-query")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "from-query");
    }

    #[tokio::test]
    async fn test_schema_failure_is_invalid_input() {
        let (state, _dir) = test_state().await;
        let router = test_router(state);

        let (status, _, body) = send(&router, post("/echo/x", json!({ "name": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "msg": INVALID_INPUT_MESSAGE }));

        let request = Request::builder()
            .method("POST")
            .uri("/echo/x")
            .body(Body::from("[1, 2]"))
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], INVALID_INPUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_concept_errors_use_taxonomy_status_and_usernames() {
        let (state, _dir) = test_state().await;
        state.app.authenticating.create("owner", "pw").await.unwrap();
        let router = test_router(state);

        let request = Request::builder()
            .method("DELETE")
            .uri("/owned")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["msg"], "owner is not the owner of webapp w1!");

        let (status, _, body) = send(&router, get("/whoami")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["msg"], "Must be logged in!");
    }

    #[tokio::test]
    async fn test_session_cookie_issued_on_login() {
        let (state, _dir) = test_state().await;
        let router = test_router(state);

        let (status, headers, _) = send(&router, post("/login", json!({ "user": "u1" }))).await;
        assert_eq!(status, StatusCode::OK);
        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        let pair = cookie.split(';').next().unwrap().to_string();

        let request = Request::builder()
            .uri("/whoami")
            .header(header::COOKIE, &pair)
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"], "u1");
        assert!(headers.get(header::SET_COOKIE).is_none());

        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::COOKIE, &pair)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "user": "u2" }).to_string()))
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["msg"], "Must be logged out!");
    }
}
