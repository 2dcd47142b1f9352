use askama::Template;
use axum::extract::State;
use axum::response::Response;

use crate::error::AppResult;
use crate::extractors::Session;
use crate::routes::layout::{PageContext, PostCard};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/index.html")]
pub struct IndexTemplate {
    pub page: PageContext,
    pub posts: Vec<PostCard>,
}

/// GET /: every post, newest first, with like counts
pub async fn index(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    let posts = state
        .repo
        .list_posts()
        .await?
        .into_iter()
        .map(PostCard::from)
        .collect();

    let page = session.page().await;
    Ok(session.render(IndexTemplate { page, posts }))
}
