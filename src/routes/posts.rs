use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::blog::Flash;
use crate::db::models::{NewPost, PostId};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, Session};
use crate::routes::forms::MultipartForm;
use crate::routes::layout::{parse_and_format_time, PageContext, PostCard};
use crate::state::AppState;

// --- View structs ---

pub struct CommentView {
    pub username: String,
    pub content: String,
    pub created_at: String,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/create_post.html")]
pub struct CreatePostTemplate {
    pub page: PageContext,
}

#[derive(Template)]
#[template(path = "pages/view_post.html")]
pub struct ViewPostTemplate {
    pub page: PageContext,
    pub post_id: PostId,
    /// False when no post has this id; the page then renders without it
    pub found: bool,
    pub post: PostCard,
    pub comments: Vec<CommentView>,
    pub user_liked: bool,
}

// --- Forms ---

#[derive(Deserialize)]
pub struct CommentForm {
    pub content: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create_post", get(create_post_page).post(create_post))
        .route("/view_post/{post_id}", get(view_post))
        .route("/add_comment/{post_id}", post(add_comment))
        .route("/like/{post_id}", post(toggle_like))
}

// --- Handlers ---

async fn create_post_page(_user: CurrentUser, session: Session) -> Response {
    let page = session.page().await;
    session.render(CreatePostTemplate { page })
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    mut session: Session,
    multipart: Multipart,
) -> AppResult<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let title = form.require("title")?;
    let content = form.require("content")?;

    let image = match form.take_file("image") {
        Some(file) => state.uploads.save_image(&file.filename, &file.bytes).await?,
        None => None,
    };

    let new_post = NewPost {
        title,
        content,
        image,
        user_id: user.id,
    };
    let post_id = match state.repo.create_post(&new_post).await {
        Ok(id) => id,
        Err(e) => {
            if let Some(stored) = &new_post.image {
                state.uploads.discard(stored).await;
            }
            return Err(e.into());
        }
    };
    tracing::info!("User {} created post {}", user.username, post_id);

    session.flash(Flash::success("Post created successfully!")).await;
    Ok(session.redirect("/"))
}

async fn view_post(
    State(state): State<AppState>,
    session: Session,
    Path(post_id): Path<PostId>,
) -> AppResult<Response> {
    let post = state.repo.find_post(post_id).await?;

    let comments = state
        .repo
        .list_comments(post_id)
        .await?
        .into_iter()
        .map(|c| CommentView {
            username: c.username,
            content: c.content,
            created_at: parse_and_format_time(&c.created_at),
        })
        .collect();

    let user_liked = match session.current_user_id().await {
        Some(user_id) => state.repo.has_liked(user_id, post_id).await?,
        None => false,
    };

    let page = session.page().await;
    Ok(session.render(ViewPostTemplate {
        page,
        post_id,
        found: post.is_some(),
        post: post.map(PostCard::from).unwrap_or_default(),
        comments,
        user_liked,
    }))
}

async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    mut session: Session,
    Path(post_id): Path<PostId>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    state
        .repo
        .add_comment(post_id, user.id, &form.content)
        .await?;

    session.flash(Flash::success("Comment added successfully!")).await;
    Ok(session.redirect(&format!("/view_post/{}", post_id)))
}

async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    mut session: Session,
    Path(post_id): Path<PostId>,
) -> AppResult<Response> {
    let outcome = state.repo.toggle_like(user.id, post_id).await?;
    tracing::debug!("User {} toggled like on post {}: {:?}", user.id, post_id, outcome);

    session.flash(outcome.flash()).await;
    Ok(session.redirect(&format!("/view_post/{}", post_id)))
}
