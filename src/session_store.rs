//! Process-local session storage keyed by a cookie.
//!
//! Only logged-in sessions are kept. A request without a known session id starts from an
//! empty [`SessionState`] under a fresh id, which is stored (and handed to the client) only
//! once someone logs in.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};
use tokio::sync::{Mutex, RwLock};

use crate::concepts::SessionState;

/// The session one request works on.
pub type Session = Arc<Mutex<SessionState>>;

/// A session loaded for one request.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub id: String,
    /// The id was not known to the store
    pub is_new: bool,
    pub session: Session,
}

#[derive(Debug)]
pub struct SessionStore {
    cookie_name: String,
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Load the session named by the request's cookie.
    pub async fn load(&self, headers: &HeaderMap) -> LoadedSession {
        if let Some(id) = self.session_id(headers) {
            if let Some(state) = self.sessions.read().await.get(&id) {
                return LoadedSession {
                    id,
                    is_new: false,
                    session: Arc::new(Mutex::new(state.clone())),
                };
            }
        }

        LoadedSession {
            id: uuid::Uuid::new_v4().to_string(),
            is_new: true,
            session: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Persist a session after its request, returning the `Set-Cookie` value to send, if any.
    ///
    /// Requests on the same cookie run concurrently, each on its own copy of the state, and
    /// the last one saved wins. A known session is only written back while it is still
    /// stored, so a request that was in flight during a logout or [`Self::end_all_for`]
    /// does not bring it back. A login that finishes after [`Self::end_all_for`] still
    /// stores its new session.
    pub async fn save(&self, loaded: &LoadedSession) -> Option<HeaderValue> {
        let state = loaded.session.lock().await.clone();
        let mut sessions = self.sessions.write().await;

        if state.user.is_some() {
            if loaded.is_new {
                sessions.insert(loaded.id.clone(), state);
                return self.cookie(&loaded.id, None);
            }
            if let Some(stored) = sessions.get_mut(&loaded.id) {
                *stored = state;
            }
        } else if sessions.remove(&loaded.id).is_some() {
            return self.cookie("", Some(0));
        }
        None
    }

    /// Drop every stored session whose user is `user`.
    pub async fn end_all_for(&self, user: &str) {
        self.sessions
            .write()
            .await
            .retain(|_, state| state.user.as_deref() != Some(user));
    }

    fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string())
    }

    fn cookie(&self, value: &str, max_age: Option<u32>) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, value
        );
        if let Some(max_age) = max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age));
        }
        HeaderValue::from_str(&cookie).ok()
    }
}
