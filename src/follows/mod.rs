use serde::Serialize;

pub mod handler;

/// Database model for a follow edge (follower -> followed).
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Follow {
    pub follower_id: i64,
    pub followed_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A user as listed in followers/followed pages.
#[derive(Debug, Serialize)]
pub struct FollowUserResponse {
    pub id: i64,
    pub username: String,
    pub about_me: Option<String>,
    pub followed_at: chrono::DateTime<chrono::Utc>,
}

/// Response for follow/unfollow actions.
#[derive(Debug, Serialize)]
pub struct FollowActionResponse {
    pub following: bool,
    pub followers_count: i64,
}
