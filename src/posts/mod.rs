use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub mod handler;

/// Shortest body substring the post search will match on.
pub const MIN_SEARCH_LEN: usize = 3;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub body: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePost {
    #[validate(length(min = 1, max = 140, message = "Post body must be 1 to 140 characters"))]
    pub body: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePost {
    #[validate(length(min = 1, max = 140, message = "Post body must be 1 to 140 characters"))]
    pub body: String,
}

/// Query parameters for the all-posts listing.
#[derive(Debug, Deserialize)]
pub struct PostFilter {
    pub page: Option<i64>,
    pub q: Option<String>,
}

/// Row shape shared by every post listing query (post joined with author).
#[derive(FromRow)]
pub struct PostRow {
    pub id: i64,
    pub body: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub author_id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub body: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub author: AuthorResponse,
}

#[derive(Debug, Serialize)]
pub struct AuthorResponse {
    pub id: i64,
    pub username: String,
}

impl From<PostRow> for PostResponse {
    fn from(p: PostRow) -> Self {
        PostResponse {
            id: p.id,
            body: p.body,
            created_at: p.created_at,
            author: AuthorResponse {
                id: p.author_id,
                username: p.username,
            },
        }
    }
}
