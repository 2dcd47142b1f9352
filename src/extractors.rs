use std::convert::Infallible;
use std::sync::Arc;

use askama::Template;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::auth::{SessionStore, SessionUser};
use crate::blog::Flash;
use crate::db::models::UserId;
use crate::error::AppError;
use crate::routes::layout::{Html, PageContext};
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

impl From<SessionUser> for CurrentUser {
    fn from(user: SessionUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Extractor that requires authentication.
/// Rejects with a redirect to the login page if no valid session is found.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::LoginRequired)?;

        let sessions = state.sessions.lock().await;
        sessions
            .user(token)
            .map(CurrentUser::from)
            .ok_or(AppError::LoginRequired)
    }
}

/// Handle on the browser's session: identity plus queued flash messages.
///
/// Changes that need a new cookie (login, a flash on a cookieless visitor,
/// logout) are remembered and written out by [`Session::redirect`] or
/// [`Session::render`].
pub struct Session {
    store: Arc<Mutex<SessionStore>>,
    cookie_name: String,
    token: Option<String>,
    cookie: CookieChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CookieChange {
    None,
    Issued,
    Cleared,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookie_name = state.config.auth.cookie_name.clone();
        let presented = get_cookie_value(parts, &cookie_name).map(str::to_string);

        // A token from before a restart (or an expired one) is simply dropped
        let token = match presented {
            Some(token) => {
                let valid = state.sessions.lock().await.is_valid(&token);
                valid.then_some(token)
            }
            None => None,
        };

        Ok(Session {
            store: state.sessions.clone(),
            cookie_name,
            token,
            cookie: CookieChange::None,
        })
    }
}

impl Session {
    pub async fn user(&self) -> Option<SessionUser> {
        let token = self.token.as_deref()?;
        self.store.lock().await.user(token)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.user().await.is_some()
    }

    pub async fn current_user_id(&self) -> Option<UserId> {
        self.user().await.map(|user| user.id)
    }

    /// Authenticate this browser. Always issues a fresh token.
    pub async fn login(&mut self, user: SessionUser) {
        let mut store = self.store.lock().await;
        if let Some(old) = self.token.take() {
            store.remove(&old);
        }
        tracing::info!("User {} logged in", user.username);
        self.token = Some(store.create(Some(user)));
        self.cookie = CookieChange::Issued;
    }

    /// Forget the session entirely.
    pub async fn logout(&mut self) {
        if let Some(old) = self.token.take() {
            self.store.lock().await.remove(&old);
        }
        self.cookie = CookieChange::Cleared;
    }

    /// Queue a message for the next rendered page, starting an anonymous
    /// session if the browser has none.
    pub async fn flash(&mut self, flash: Flash) {
        let mut store = self.store.lock().await;
        if let Some(token) = self.token.as_deref() {
            if store.push_flash(token, flash.clone()) {
                return;
            }
        }
        let token = store.create(None);
        store.push_flash(&token, flash);
        self.token = Some(token);
        self.cookie = CookieChange::Issued;
    }

    /// Layout data for a rendered page. Drains queued flashes.
    pub async fn page(&self) -> PageContext {
        let Some(token) = self.token.as_deref() else {
            return PageContext::anonymous();
        };
        let mut store = self.store.lock().await;
        let user = store.user(token);
        let flashes = store.take_flashes(token);
        PageContext::new(user.map(|u| u.username), flashes)
    }

    /// 303 See Other to `to`, carrying any cookie change.
    pub fn redirect(self, to: &str) -> Response {
        let mut response = (StatusCode::SEE_OTHER, [(header::LOCATION, to.to_string())])
            .into_response();
        self.apply_cookie(&mut response);
        response
    }

    /// Render a template, carrying any cookie change.
    pub fn render<T: Template>(self, template: T) -> Response {
        let mut response = Html(template).into_response();
        self.apply_cookie(&mut response);
        response
    }

    fn apply_cookie(&self, response: &mut Response) {
        let cookie = match (self.cookie, self.token.as_deref()) {
            (CookieChange::Issued, Some(token)) => session_cookie(&self.cookie_name, token),
            (CookieChange::Issued, None) | (CookieChange::Cleared, _) => {
                clear_session_cookie(&self.cookie_name)
            }
            (CookieChange::None, _) => return,
        };
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Invalid session cookie header: {}", e),
        }
    }
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str) -> String {
    format!("{}={}; HttpOnly; SameSite=Lax; Path=/", name, token)
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

fn get_cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}
