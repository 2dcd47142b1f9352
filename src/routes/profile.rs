use askama::Template;
use axum::extract::{Multipart, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::blog::Flash;
use crate::db::models::ProfileUpdate;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Session};
use crate::routes::forms::MultipartForm;
use crate::routes::layout::{parse_and_format_time, public_url, AuthoredPostRow, PageContext, PostCard};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub page: PageContext,
    pub user_id: i64,
    pub username: String,
    pub bio: String,
    pub picture_url: String,
    pub member_since: String,
    pub posts: Vec<AuthoredPostRow>,
}

#[derive(Template)]
#[template(path = "pages/edit_profile.html")]
pub struct EditProfileTemplate {
    pub page: PageContext,
    pub bio: String,
    pub picture_url: String,
}

#[derive(Template)]
#[template(path = "pages/liked_posts.html")]
pub struct LikedPostsTemplate {
    pub page: PageContext,
    pub posts: Vec<PostCard>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/profile/edit", get(edit_profile_page).post(edit_profile))
        .route("/liked_posts", get(liked_posts))
}

async fn profile(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
) -> AppResult<Response> {
    let account = state
        .repo
        .find_user(user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let posts = state
        .repo
        .posts_by_user(user.id)
        .await?
        .into_iter()
        .map(AuthoredPostRow::from)
        .collect();

    let page = session.page().await;
    Ok(session.render(ProfileTemplate {
        page,
        user_id: account.id,
        username: account.username,
        bio: account.bio.unwrap_or_default(),
        picture_url: public_url(account.profile_picture.as_deref()),
        member_since: parse_and_format_time(&account.created_at),
        posts,
    }))
}

async fn edit_profile_page(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
) -> AppResult<Response> {
    let account = state
        .repo
        .find_user(user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let page = session.page().await;
    Ok(session.render(EditProfileTemplate {
        page,
        bio: account.bio.unwrap_or_default(),
        picture_url: public_url(account.profile_picture.as_deref()),
    }))
}

async fn edit_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    mut session: Session,
    multipart: Multipart,
) -> AppResult<Response> {
    let mut form = MultipartForm::read(multipart).await?;

    let bio = form
        .text("bio")
        .map(|bio| bio.trim().to_string())
        .filter(|bio| !bio.is_empty());

    let profile_picture = match form.take_file("profile_picture") {
        Some(file) => {
            let saved = state.uploads.save_image(&file.filename, &file.bytes).await?;
            if saved.is_none() {
                session
                    .flash(Flash::danger(
                        "Profile pictures must be png, jpg, jpeg or gif files.",
                    ))
                    .await;
            }
            saved
        }
        None => None,
    };

    let update = ProfileUpdate {
        bio,
        profile_picture,
    };
    if let Err(e) = state.repo.update_profile(user.id, &update).await {
        if let Some(stored) = &update.profile_picture {
            state.uploads.discard(stored).await;
        }
        return Err(e.into());
    }
    tracing::info!("User {} updated their profile", user.username);

    session.flash(Flash::success("Profile updated.")).await;
    Ok(session.redirect("/profile"))
}

async fn liked_posts(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
) -> AppResult<Response> {
    let posts = state
        .repo
        .liked_posts(user.id)
        .await?
        .into_iter()
        .map(PostCard::from)
        .collect();

    let page = session.page().await;
    Ok(session.render(LikedPostsTemplate { page, posts }))
}
