pub mod assets;
pub mod auth;
pub mod forms;
pub mod home;
pub mod layout;
pub mod posts;
pub mod profile;
pub mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The whole site.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .route("/", get(home::index))
        .route("/assets/{*path}", get(assets::serve))
        .route("/uploads/{name}", get(uploads::serve))
        .merge(auth::router())
        .merge(posts::router())
        .merge(profile::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::auth::session::MAX_ANONYMOUS_SESSIONS;
    use crate::auth::SessionUser;
    use crate::config::Config;
    use crate::db;

    fn test_state(data_dir: &std::path::Path) -> AppState {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let mut config = Config::default();
        config.resolve_paths(data_dir);
        AppState::new(pool, config)
    }

    fn test_app() -> Router {
        let tmp = std::env::temp_dir().join("village-blog-route-tests");
        app(test_state(&tmp))
    }

    async fn get_status(uri: &str) -> (StatusCode, Option<String>) {
        let response = test_app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        (response.status(), location)
    }

    #[tokio::test]
    async fn public_pages_render() {
        for uri in ["/", "/login", "/register", "/view_post/1"] {
            let (status, _) = get_status(uri).await;
            assert_eq!(status, StatusCode::OK, "GET {}", uri);
        }
    }

    #[tokio::test]
    async fn protected_pages_redirect_to_login() {
        for uri in ["/create_post", "/profile", "/profile/edit", "/liked_posts"] {
            let (status, location) = get_status(uri).await;
            assert_eq!(status, StatusCode::SEE_OTHER, "GET {}", uri);
            assert_eq!(location.as_deref(), Some("/login"));
        }
    }

    #[tokio::test]
    async fn protected_actions_redirect_to_login() {
        for uri in ["/like/1", "/add_comment/1"] {
            let response = test_app()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(Body::from("content=hi"))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "POST {}", uri);
            assert_eq!(response.headers()[header::LOCATION], "/login");
        }
    }

    #[tokio::test]
    async fn unknown_upload_is_404() {
        let (status, _) = get_status("/uploads/missing.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_post_id_is_rejected() {
        let (status, _) = get_status("/view_post/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cookieless_logouts_keep_session_table_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());
        let router = app(state.clone());

        for _ in 0..1000 {
            let response = router
                .clone()
                .oneshot(Request::builder().uri("/logout").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
        }

        assert!(state.sessions.lock().await.len() <= MAX_ANONYMOUS_SESSIONS);
    }

    #[tokio::test]
    async fn failed_post_insert_leaves_no_upload_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path());

        // A session for a user row that does not exist makes the insert fail
        let token = state.sessions.lock().await.create(Some(SessionUser {
            id: 999,
            username: "ghost".into(),
        }));

        let boundary = "blogformboundary";
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Hello\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"content\"\r\n\r\n\
             World\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"orphan.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{b}--\r\n",
            b = boundary
        );

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create_post")
                    .header(header::COOKIE, format!("village_session={}", token))
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!state.config.uploads_path().join("orphan.png").exists());
    }
}
