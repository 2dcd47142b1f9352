pub type UserId = i64;
pub type PostId = i64;

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: String,
}

/// A post joined with its author and like count, as shown on listings.
#[derive(Debug, Clone)]
pub struct PostSummary {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub username: String,
    pub created_at: String,
    pub like_count: i64,
}

/// One of the session user's own posts on the profile page.
#[derive(Debug, Clone)]
pub struct AuthoredPost {
    pub id: PostId,
    pub title: String,
    pub created_at: String,
    pub like_count: i64,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    /// `None` keeps the current picture.
    pub profile_picture: Option<String>,
}
