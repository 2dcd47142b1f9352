// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use thiserror::Error;

use crate::blog::domain::LikeState;
use crate::db::models::{
    AuthoredPost, Comment, NewPost, PostId, PostSummary, ProfileUpdate, User, UserId,
};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// All persistence operations the blog handlers need.
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Insert a user. Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str)
        -> Result<UserId, RepositoryError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError>;

    /// All posts, newest first, with like counts.
    async fn list_posts(&self) -> Result<Vec<PostSummary>, RepositoryError>;

    async fn find_post(&self, id: PostId) -> Result<Option<PostSummary>, RepositoryError>;

    async fn create_post(&self, post: &NewPost) -> Result<PostId, RepositoryError>;

    /// Comments on a post, oldest first.
    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>, RepositoryError>;

    async fn add_comment(
        &self,
        post_id: PostId,
        user_id: UserId,
        content: &str,
    ) -> Result<i64, RepositoryError>;

    async fn has_liked(&self, user_id: UserId, post_id: PostId) -> Result<bool, RepositoryError>;

    /// Atomically flip the like state for (user, post).
    async fn toggle_like(
        &self,
        user_id: UserId,
        post_id: PostId,
    ) -> Result<LikeState, RepositoryError>;

    /// Posts written by a user, newest first.
    async fn posts_by_user(&self, user_id: UserId) -> Result<Vec<AuthoredPost>, RepositoryError>;

    /// Posts a user has liked, most recently liked first.
    async fn liked_posts(&self, user_id: UserId) -> Result<Vec<PostSummary>, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteBlogRepository {
    pool: DbPool,
}

impl SqliteBlogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const POST_SUMMARY_COLUMNS: &str = "p.id, p.title, p.content, p.image, u.username, p.created_at,
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count";

fn post_summary_from_row(row: &Row<'_>) -> rusqlite::Result<PostSummary> {
    Ok(PostSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        image: row.get(3)?,
        username: row.get(4)?,
        created_at: row.get(5)?,
        like_count: row.get(6)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        bio: row.get(3)?,
        profile_picture: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn post_exists(conn: &rusqlite::Connection, post_id: PostId) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )
}

#[async_trait]
impl BlogRepository for SqliteBlogRepository {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<UserId, RepositoryError> {
        let conn = self.pool.get()?;

        match conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            params![username, password_hash],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => Err(RepositoryError::Conflict(format!(
                "username '{}' is taken",
                username
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, username, password, bio, profile_picture, created_at
                 FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, username, password, bio, profile_picture, created_at
                 FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users
             SET bio = ?1, profile_picture = COALESCE(?2, profile_picture)
             WHERE id = ?3",
            params![update.bio, update.profile_picture, id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn list_posts(&self) -> Result<Vec<PostSummary>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_SUMMARY_COLUMNS}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             ORDER BY p.created_at DESC, p.id DESC"
        ))?;

        let posts = stmt
            .query_map([], post_summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn find_post(&self, id: PostId) -> Result<Option<PostSummary>, RepositoryError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!(
                    "SELECT {POST_SUMMARY_COLUMNS}
                     FROM posts p
                     JOIN users u ON u.id = p.user_id
                     WHERE p.id = ?1"
                ),
                params![id],
                post_summary_from_row,
            )
            .optional()?;
        Ok(post)
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostId, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (title, content, image, user_id) VALUES (?1, ?2, ?3, ?4)",
            params![post.title, post.content, post.image, post.user_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.content, u.username, c.created_at
             FROM comments c
             JOIN users u ON u.id = c.user_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at ASC, c.id ASC",
        )?;

        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    username: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn add_comment(
        &self,
        post_id: PostId,
        user_id: UserId,
        content: &str,
    ) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;

        if !post_exists(&conn, post_id)? {
            return Err(RepositoryError::NotFound(format!("post {}", post_id)));
        }

        conn.execute(
            "INSERT INTO comments (content, user_id, post_id) VALUES (?1, ?2, ?3)",
            params![content, user_id, post_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn has_liked(&self, user_id: UserId, post_id: PostId) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let liked = conn.query_row(
            "SELECT COUNT(*) > 0 FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| row.get(0),
        )?;
        Ok(liked)
    }

    async fn toggle_like(
        &self,
        user_id: UserId,
        post_id: PostId,
    ) -> Result<LikeState, RepositoryError> {
        let mut conn = self.pool.get()?;
        // IMMEDIATE takes the write lock up front, so two toggles for the
        // same pair cannot interleave between the delete and the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !post_exists(&tx, post_id)? {
            return Err(RepositoryError::NotFound(format!("post {}", post_id)));
        }

        let removed = tx.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
        )?;

        let state = if removed > 0 {
            LikeState::Unliked
        } else {
            tx.execute(
                "INSERT OR IGNORE INTO likes (user_id, post_id) VALUES (?1, ?2)",
                params![user_id, post_id],
            )?;
            LikeState::Liked
        };

        tx.commit()?;
        Ok(state)
    }

    async fn posts_by_user(&self, user_id: UserId) -> Result<Vec<AuthoredPost>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.created_at,
                    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count
             FROM posts p
             WHERE p.user_id = ?1
             ORDER BY p.created_at DESC, p.id DESC",
        )?;

        let posts = stmt
            .query_map(params![user_id], |row| {
                Ok(AuthoredPost {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    like_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn liked_posts(&self, user_id: UserId) -> Result<Vec<PostSummary>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_SUMMARY_COLUMNS}
             FROM likes mine
             JOIN posts p ON p.id = mine.post_id
             JOIN users u ON u.id = p.user_id
             WHERE mine.user_id = ?1
             ORDER BY mine.created_at DESC, mine.id DESC"
        ))?;

        let posts = stmt
            .query_map(params![user_id], post_summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn repo() -> (DbPool, SqliteBlogRepository) {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        (pool.clone(), SqliteBlogRepository::new(pool))
    }

    fn like_rows(pool: &DbPool, post_id: PostId) -> i64 {
        pool.get()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
                params![post_id],
                |row| row.get(0),
            )
            .unwrap()
    }

    async fn post_by(repo: &SqliteBlogRepository, user_id: UserId, title: &str) -> PostId {
        repo.create_post(&NewPost {
            title: title.to_string(),
            content: format!("{} body", title),
            image: None,
            user_id,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let (pool, repo) = repo();
        let first = repo.create_user("alice", "hash-1").await.unwrap();

        let err = repo.create_user("alice", "hash-2").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE username = 'alice'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        drop(conn);

        let alice = repo.find_user(first).await.unwrap().unwrap();
        assert_eq!(alice.password_hash, "hash-1");
    }

    #[tokio::test]
    async fn find_user_by_username_misses_cleanly() {
        let (_pool, repo) = repo();
        assert!(repo.find_user_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_posts_newest_first_with_like_counts() {
        let (_pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();
        let bob = repo.create_user("bob", "h").await.unwrap();

        let first = post_by(&repo, alice, "First").await;
        let second = post_by(&repo, bob, "Second").await;
        repo.toggle_like(alice, first).await.unwrap();
        repo.toggle_like(bob, first).await.unwrap();

        let posts = repo.list_posts().await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, second);
        assert_eq!(posts[0].username, "bob");
        assert_eq!(posts[0].like_count, 0);
        assert_eq!(posts[1].id, first);
        assert_eq!(posts[1].like_count, 2);
    }

    #[tokio::test]
    async fn toggle_like_twice_restores_state() {
        let (pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();
        let post = post_by(&repo, alice, "Hello").await;

        assert_eq!(repo.toggle_like(alice, post).await.unwrap(), LikeState::Liked);
        assert!(repo.has_liked(alice, post).await.unwrap());
        assert_eq!(like_rows(&pool, post), 1);

        assert_eq!(
            repo.toggle_like(alice, post).await.unwrap(),
            LikeState::Unliked
        );
        assert!(!repo.has_liked(alice, post).await.unwrap());
        assert_eq!(like_rows(&pool, post), 0);
    }

    #[tokio::test]
    async fn toggle_like_on_missing_post_is_not_found() {
        let (_pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();
        let err = repo.toggle_like(alice, 999).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn comments_are_oldest_first() {
        let (pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();
        let post = post_by(&repo, alice, "Hello").await;

        // Backdate one comment so ordering is decided by created_at, not id
        repo.add_comment(post, alice, "later").await.unwrap();
        let early = repo.add_comment(post, alice, "earlier").await.unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "UPDATE comments SET created_at = datetime('now', '-1 hour') WHERE id = ?1",
                params![early],
            )
            .unwrap();
        }
        repo.add_comment(post, alice, "latest").await.unwrap();

        let comments = repo.list_comments(post).await.unwrap();
        let contents: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["earlier", "later", "latest"]);
        assert!(comments
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let (_pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();
        let err = repo.add_comment(404, alice, "hi").await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn profile_posts_and_liked_posts() {
        let (pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();
        let bob = repo.create_user("bob", "h").await.unwrap();
        let a1 = post_by(&repo, alice, "A1").await;
        let b1 = post_by(&repo, bob, "B1").await;
        let b2 = post_by(&repo, bob, "B2").await;

        repo.toggle_like(alice, b2).await.unwrap();
        let older_like = {
            repo.toggle_like(alice, b1).await.unwrap();
            let conn = pool.get().unwrap();
            conn.execute(
                "UPDATE likes SET created_at = datetime('now', '-1 day')
                 WHERE user_id = ?1 AND post_id = ?2",
                params![alice, b2],
            )
            .unwrap();
            b2
        };

        let authored = repo.posts_by_user(bob).await.unwrap();
        assert_eq!(
            authored.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![b2, b1]
        );
        assert_eq!(authored[0].like_count, 1);

        let liked = repo.liked_posts(alice).await.unwrap();
        assert_eq!(
            liked.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![b1, older_like]
        );
        assert!(liked.iter().all(|p| p.username == "bob"));

        assert!(repo.liked_posts(bob).await.unwrap().is_empty());
        assert_eq!(repo.posts_by_user(alice).await.unwrap()[0].id, a1);
    }

    #[tokio::test]
    async fn update_profile_keeps_picture_when_none_given() {
        let (_pool, repo) = repo();
        let alice = repo.create_user("alice", "h").await.unwrap();

        repo.update_profile(
            alice,
            &ProfileUpdate {
                bio: Some("Gardener".into()),
                profile_picture: Some("uploads/alice.png".into()),
            },
        )
        .await
        .unwrap();
        repo.update_profile(
            alice,
            &ProfileUpdate {
                bio: Some("Beekeeper".into()),
                profile_picture: None,
            },
        )
        .await
        .unwrap();

        let user = repo.find_user(alice).await.unwrap().unwrap();
        assert_eq!(user.bio.as_deref(), Some("Beekeeper"));
        assert_eq!(user.profile_picture.as_deref(), Some("uploads/alice.png"));
    }

    #[tokio::test]
    async fn find_post_missing_is_none() {
        let (_pool, repo) = repo();
        assert!(repo.find_post(7).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_never_double_count() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("likes.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let repo = std::sync::Arc::new(SqliteBlogRepository::new(pool.clone()));

        let alice = repo.create_user("alice", "h").await.unwrap();
        let post = post_by(&repo, alice, "Hello").await;

        const TOGGLES: usize = 40;
        let handles: Vec<_> = (0..TOGGLES)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.toggle_like(alice, post).await })
            })
            .collect();

        let mut liked = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(LikeState::Liked) => liked += 1,
                Ok(LikeState::Unliked) => {}
                Err(e) => panic!("toggle failed: {}", e),
            }
        }

        assert_eq!(liked, TOGGLES / 2);
        assert_eq!(like_rows(&pool, post), (TOGGLES % 2) as i64);
    }
}
