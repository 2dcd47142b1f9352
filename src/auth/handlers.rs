use askama::Template;
use axum::extract::State;
use axum::response::Response;
use axum::Form;
use serde::Deserialize;

use crate::auth::password;
use crate::auth::SessionUser;
use crate::blog::{Flash, RepositoryError};
use crate::error::AppResult;
use crate::extractors::Session;
use crate::routes::layout::PageContext;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
    pub username: String,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub username: String,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

// -- Registration --

/// GET /register
pub async fn register_page(session: Session) -> Response {
    let page = session.page().await;
    session.render(RegisterTemplate {
        page,
        username: String::new(),
    })
}

/// POST /register: create an account, then send the user to log in
pub async fn register(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let username = form.username.trim().to_string();

    if username.is_empty() || form.password.trim().is_empty() {
        let page = session
            .page()
            .await
            .with_flash(Flash::danger("Username and password are required."));
        return Ok(session.render(RegisterTemplate { page, username }));
    }

    let password_hash = password::hash_password(&form.password, state.config.auth.bcrypt_cost)?;

    match state.repo.create_user(&username, &password_hash).await {
        Ok(user_id) => {
            tracing::info!("Registered user {} ({})", username, user_id);
            session
                .flash(Flash::success("Registration successful! Please log in."))
                .await;
            Ok(session.redirect("/login"))
        }
        Err(RepositoryError::Conflict(_)) => {
            tracing::info!("Registration rejected, username {} taken", username);
            let page = session
                .page()
                .await
                .with_flash(Flash::danger("Username already exists."));
            Ok(session.render(RegisterTemplate { page, username }))
        }
        Err(e) => Err(e.into()),
    }
}

// -- Login / logout --

/// GET /login
pub async fn login_page(session: Session) -> Response {
    let page = session.page().await;
    session.render(LoginTemplate {
        page,
        username: String::new(),
    })
}

/// POST /login: verify credentials and start an authenticated session.
/// Unknown usernames and wrong passwords get the same answer.
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let username = form.username.trim().to_string();
    let user = state.repo.find_user_by_username(&username).await?;

    match user {
        Some(user) if password::verify_password(&form.password, &user.password_hash) => {
            session
                .login(SessionUser {
                    id: user.id,
                    username: user.username,
                })
                .await;
            session.flash(Flash::success("Login successful!")).await;
            Ok(session.redirect("/"))
        }
        _ => {
            tracing::info!("Failed login attempt for {}", username);
            let page = session
                .page()
                .await
                .with_flash(Flash::danger("Invalid username or password."));
            Ok(session.render(LoginTemplate { page, username }))
        }
    }
}

/// GET /logout: drop the session and go home
pub async fn logout(mut session: Session) -> Response {
    if let Some(user) = session.user().await {
        tracing::info!("User {} logged out", user.username);
    }
    session.logout().await;
    session.flash(Flash::info("You have logged out.")).await;
    session.redirect("/")
}
