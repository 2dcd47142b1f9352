use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDateTime, Utc};

use crate::blog::Flash;
use crate::db::models::{AuthoredPost, PostSummary};

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

// --- Layout context ---

pub struct FlashView {
    pub level: String,
    pub message: String,
}

impl From<Flash> for FlashView {
    fn from(flash: Flash) -> Self {
        Self {
            level: flash.level.to_string(),
            message: flash.message,
        }
    }
}

/// Data every page's layout needs: who is logged in and pending flashes.
pub struct PageContext {
    pub logged_in: bool,
    pub username: String,
    pub flashes: Vec<FlashView>,
}

impl PageContext {
    pub fn anonymous() -> Self {
        Self::new(None, Vec::new())
    }

    pub fn new(username: Option<String>, flashes: Vec<Flash>) -> Self {
        Self {
            logged_in: username.is_some(),
            username: username.unwrap_or_default(),
            flashes: flashes.into_iter().map(FlashView::from).collect(),
        }
    }

    /// Show a message on this render only.
    pub fn with_flash(mut self, flash: Flash) -> Self {
        self.flashes.push(flash.into());
        self
    }
}

// --- View structs ---

#[derive(Default)]
pub struct PostCard {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Empty when the post has no image
    pub image_url: String,
    pub username: String,
    pub created_at: String,
    pub like_count: i64,
}

impl From<PostSummary> for PostCard {
    fn from(post: PostSummary) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            image_url: public_url(post.image.as_deref()),
            username: post.username,
            created_at: parse_and_format_time(&post.created_at),
            like_count: post.like_count,
        }
    }
}

pub struct AuthoredPostRow {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub like_count: i64,
}

impl From<AuthoredPost> for AuthoredPostRow {
    fn from(post: AuthoredPost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            created_at: parse_and_format_time(&post.created_at),
            like_count: post.like_count,
        }
    }
}

/// Turn a stored relative path (`uploads/x.png`) into a site URL.
pub fn public_url(stored: Option<&str>) -> String {
    match stored {
        Some(path) if !path.is_empty() => format!("/{}", path.trim_start_matches('/')),
        _ => String::new(),
    }
}

// --- Time formatting ---

pub fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let diff = Utc::now().naive_utc().signed_duration_since(*dt);

    match diff.num_seconds() {
        s if s < 60 => "just now".to_string(),
        s if s < 3600 => format!("{}m ago", diff.num_minutes()),
        s if s < 86_400 => format!("{}h ago", diff.num_hours()),
        _ if diff.num_days() < 7 => format!("{}d ago", diff.num_days()),
        _ => dt.format("%b %-d, %Y").to_string(),
    }
}
