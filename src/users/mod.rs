use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod handler;

/// The first-created account is the designated admin.
pub const ADMIN_USER_ID: i64 = 1;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username must be between 3 and 50 characters"
    ))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(max = 140, message = "About me must be at most 140 characters"))]
    pub about_me: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
}

/// User profile with follow stats.
#[derive(Debug, Serialize)]
pub struct UserProfileResponse {
    pub id: i64,
    pub username: String,
    pub about_me: Option<String>,
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
    pub followers_count: i64,
    pub followed_count: i64,
    pub post_count: i64,
    /// Whether the requesting user follows this user.
    pub is_following: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
