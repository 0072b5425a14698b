use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{FromRow, PgPool};

use crate::{
    auth::token::AuthUser,
    config::settings::Settings,
    error::AppError,
    follows::{FollowActionResponse, FollowUserResponse},
    pagination::{self, Page, PageQuery},
    posts::{PostResponse, PostRow},
    response::ApiResponse,
};

async fn ensure_user_exists(pool: &PgPool, user_id: i64) -> Result<(), AppError> {
    sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .ok_or(AppError::NotFound("User not found".to_string()))?;
    Ok(())
}

/// Inserts the follow edge if absent. Following twice is a no-op; the unique
/// pair constraint closes the concurrent-insert race. Self-follows are
/// rejected here and backstopped by the schema CHECK.
pub async fn follow(pool: &PgPool, follower_id: i64, followed_id: i64) -> Result<(), AppError> {
    if follower_id == followed_id {
        return Err(AppError::UnprocessableEntity(
            "You cannot follow yourself".to_string(),
        ));
    }

    ensure_user_exists(pool, followed_id).await?;

    sqlx::query(
        r#"
        INSERT INTO follows (follower_id, followed_id)
        VALUES ($1, $2)
        ON CONFLICT (follower_id, followed_id) DO NOTHING
        "#,
    )
    .bind(follower_id)
    .bind(followed_id)
    .execute(pool)
    .await
    .map_err(|_| AppError::InternalServerError)?;

    Ok(())
}

/// Removes the follow edge; a no-op when it does not exist.
pub async fn unfollow(pool: &PgPool, follower_id: i64, followed_id: i64) -> Result<(), AppError> {
    ensure_user_exists(pool, followed_id).await?;

    sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2")
        .bind(follower_id)
        .bind(followed_id)
        .execute(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    Ok(())
}

pub async fn is_following(
    pool: &PgPool,
    follower_id: i64,
    followed_id: i64,
) -> Result<bool, AppError> {
    let row = sqlx::query("SELECT 1 FROM follows WHERE follower_id = $1 AND followed_id = $2")
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;
    Ok(row.is_some())
}

pub async fn follower_count(pool: &PgPool, user_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE followed_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|_| AppError::InternalServerError)
}

pub async fn followed_count(pool: &PgPool, user_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|_| AppError::InternalServerError)
}

/// The home timeline: posts authored by the user or by anyone they follow,
/// newest first. Timestamp ties break by id descending (higher id means
/// created later); this tie-break is a documented assumption of the feed.
pub async fn home_feed(
    pool: &PgPool,
    user_id: i64,
    page: i64,
    per_page: i64,
) -> Result<Page<PostResponse>, AppError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM posts p
        WHERE p.author_id = $1
           OR p.author_id IN (SELECT followed_id FROM follows WHERE follower_id = $1)
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|_| AppError::InternalServerError)?;

    let (limit, offset) = pagination::slice_bounds(page, per_page);

    let rows = sqlx::query_as::<_, PostRow>(
        r#"
        SELECT p.id, p.body, p.created_at, p.author_id, u.username
        FROM posts p
        JOIN users u ON u.id = p.author_id
        WHERE p.author_id = $1
           OR p.author_id IN (SELECT followed_id FROM follows WHERE follower_id = $1)
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Home feed query failed: {:?}", e);
        AppError::InternalServerError
    })?;

    Ok(Page::new(
        rows.into_iter().map(PostResponse::from).collect(),
        page,
        per_page,
        total,
    ))
}

/// Helper struct for fetching a user together with the edge timestamp.
#[derive(FromRow)]
struct UserFollowRow {
    id: i64,
    username: String,
    about_me: Option<String>,
    followed_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserFollowRow> for FollowUserResponse {
    fn from(u: UserFollowRow) -> Self {
        FollowUserResponse {
            id: u.id,
            username: u.username,
            about_me: u.about_me,
            followed_at: u.followed_at,
        }
    }
}

/// Follow a user
/// POST /api/users/:id/follow
pub async fn follow_user(
    State(pool): State<PgPool>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    follow(&pool, user.id, user_id).await?;

    Ok(ApiResponse::success(FollowActionResponse {
        following: true,
        followers_count: follower_count(&pool, user_id).await?,
    }))
}

/// Unfollow a user
/// DELETE /api/users/:id/follow
pub async fn unfollow_user(
    State(pool): State<PgPool>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    unfollow(&pool, user.id, user_id).await?;

    Ok(ApiResponse::success(FollowActionResponse {
        following: false,
        followers_count: follower_count(&pool, user_id).await?,
    }))
}

/// Get a user's followers, newest edge first
/// GET /api/users/:id/followers
pub async fn get_followers(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    _auth: AuthUser,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, user_id).await?;

    let total = follower_count(&pool, user_id).await?;
    let page = query.page();
    let (limit, offset) = pagination::slice_bounds(page, settings.users_per_page);

    let followers = sqlx::query_as::<_, UserFollowRow>(
        r#"
        SELECT u.id, u.username, u.about_me, f.created_at AS followed_at
        FROM follows f
        JOIN users u ON f.follower_id = u.id
        WHERE f.followed_id = $1
        ORDER BY f.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|_| AppError::InternalServerError)?;

    let users: Vec<FollowUserResponse> = followers
        .into_iter()
        .map(FollowUserResponse::from)
        .collect();

    Ok(ApiResponse::success(Page::new(
        users,
        page,
        settings.users_per_page,
        total,
    )))
}

/// Get the users someone follows, newest edge first
/// GET /api/users/:id/followed
pub async fn get_followed(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    _auth: AuthUser,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, user_id).await?;

    let total = followed_count(&pool, user_id).await?;
    let page = query.page();
    let (limit, offset) = pagination::slice_bounds(page, settings.users_per_page);

    let followed = sqlx::query_as::<_, UserFollowRow>(
        r#"
        SELECT u.id, u.username, u.about_me, f.created_at AS followed_at
        FROM follows f
        JOIN users u ON f.followed_id = u.id
        WHERE f.follower_id = $1
        ORDER BY f.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|_| AppError::InternalServerError)?;

    let users: Vec<FollowUserResponse> =
        followed.into_iter().map(FollowUserResponse::from).collect();

    Ok(ApiResponse::success(Page::new(
        users,
        page,
        settings.users_per_page,
        total,
    )))
}

/// The authenticated user's home timeline
/// GET /api/feed
pub async fn get_home_feed(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let feed = home_feed(&pool, user.id, query.page(), settings.posts_per_page).await?;
    Ok(ApiResponse::success(feed))
}
