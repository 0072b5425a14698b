use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    auth::token::AuthUser,
    config::settings::Settings,
    error::{AppError, Json},
    pagination::{self, Page},
    posts::{CreatePost, PostFilter, PostResponse, PostRow, UpdatePost, MIN_SEARCH_LEN},
    response::ApiResponse,
};

/// Normalizes the optional body search filter into an ILIKE pattern: trims,
/// enforces the minimum length in characters (not bytes), and escapes LIKE
/// metacharacters so they match literally.
fn search_pattern(q: Option<&str>) -> Result<Option<String>, AppError> {
    match q.map(str::trim) {
        None => Ok(None),
        Some(q) if q.chars().count() < MIN_SEARCH_LEN => Err(AppError::UnprocessableEntity(
            format!("Search term must be at least {} characters", MIN_SEARCH_LEN),
        )),
        Some(q) => {
            let escaped = q
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            Ok(Some(format!("%{}%", escaped)))
        }
    }
}

/// Persists a post with `created_at = now`. Empty bodies are rejected.
pub async fn new_post(pool: &PgPool, author_id: i64, body: &str) -> Result<PostResponse, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::UnprocessableEntity(
            "Post body cannot be empty".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, PostRow>(
        r#"
        WITH inserted AS (
            INSERT INTO posts (author_id, body) VALUES ($1, $2)
            RETURNING id, body, created_at, author_id
        )
        SELECT i.id, i.body, i.created_at, i.author_id, u.username
        FROM inserted i JOIN users u ON u.id = i.author_id
        "#,
    )
    .bind(author_id)
    .bind(body)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create post: {:?}", e);
        AppError::InternalServerError
    })?;

    Ok(PostResponse::from(row))
}

/// Replaces the body of a post and refreshes its timestamp. Only the author
/// may edit; anyone else gets `Forbidden` with no further detail.
pub async fn edit_post(
    pool: &PgPool,
    post_id: i64,
    editor_id: i64,
    body: &str,
) -> Result<PostResponse, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::UnprocessableEntity(
            "Post body cannot be empty".to_string(),
        ));
    }

    let author_id: i64 = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    if author_id != editor_id {
        return Err(AppError::Forbidden);
    }

    let row = sqlx::query_as::<_, PostRow>(
        r#"
        WITH updated AS (
            UPDATE posts SET body = $1, created_at = NOW() WHERE id = $2
            RETURNING id, body, created_at, author_id
        )
        SELECT p.id, p.body, p.created_at, p.author_id, u.username
        FROM updated p JOIN users u ON u.id = p.author_id
        "#,
    )
    .bind(body)
    .bind(post_id)
    .fetch_one(pool)
    .await
    .map_err(|_| AppError::InternalServerError)?;

    Ok(PostResponse::from(row))
}

/// A user's own posts, newest first.
pub async fn posts_by(
    pool: &PgPool,
    author_id: i64,
    page: i64,
    per_page: i64,
) -> Result<Page<PostResponse>, AppError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    let (limit, offset) = pagination::slice_bounds(page, per_page);

    let rows = sqlx::query_as::<_, PostRow>(
        r#"
        SELECT p.id, p.body, p.created_at, p.author_id, u.username
        FROM posts p JOIN users u ON u.id = p.author_id
        WHERE p.author_id = $1
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(author_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|_| AppError::InternalServerError)?;

    Ok(Page::new(
        rows.into_iter().map(PostResponse::from).collect(),
        page,
        per_page,
        total,
    ))
}

/// A single post, scoped to its author: a post id that exists but belongs to
/// a different user is not found under that user's collection.
pub async fn post_of_user(
    pool: &PgPool,
    author_id: i64,
    post_id: i64,
) -> Result<PostResponse, AppError> {
    let row = sqlx::query_as::<_, PostRow>(
        r#"
        SELECT p.id, p.body, p.created_at, p.author_id, u.username
        FROM posts p JOIN users u ON u.id = p.author_id
        WHERE p.id = $1 AND p.author_id = $2
        "#,
    )
    .bind(post_id)
    .bind(author_id)
    .fetch_optional(pool)
    .await
    .map_err(|_| AppError::InternalServerError)?
    .ok_or(AppError::NotFound("Post not found".to_string()))?;

    Ok(PostResponse::from(row))
}

/// Create a post
/// POST /api/posts
pub async fn create_post(
    State(pool): State<PgPool>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreatePost>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let post = new_post(&pool, user.id, &payload.body).await?;

    Ok(ApiResponse::success(post).created())
}

/// Edit a post (author only)
/// PUT /api/posts/:id
pub async fn update_post(
    State(pool): State<PgPool>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePost>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let post = edit_post(&pool, id, user.id, &payload.body).await?;

    Ok(ApiResponse::success(post))
}

/// All posts, newest first, optionally filtered on body substring
/// GET /api/posts?page=&q=
pub async fn get_posts(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    _auth: AuthUser,
    Query(filter): Query<PostFilter>,
) -> Result<impl IntoResponse, AppError> {
    let search = search_pattern(filter.q.as_deref())?;

    let page = filter.page.unwrap_or(1).max(1);
    let per_page = settings.posts_per_page;
    let (limit, offset) = pagination::slice_bounds(page, per_page);

    let (total, rows) = match &search {
        Some(pattern) => {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE body ILIKE $1")
                .bind(pattern)
                .fetch_one(&pool)
                .await
                .map_err(|_| AppError::InternalServerError)?;
            let rows = sqlx::query_as::<_, PostRow>(
                r#"
                SELECT p.id, p.body, p.created_at, p.author_id, u.username
                FROM posts p JOIN users u ON u.id = p.author_id
                WHERE p.body ILIKE $1
                ORDER BY p.created_at DESC, p.id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(|_| AppError::InternalServerError)?;
            (total, rows)
        }
        None => {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
                .fetch_one(&pool)
                .await
                .map_err(|_| AppError::InternalServerError)?;
            let rows = sqlx::query_as::<_, PostRow>(
                r#"
                SELECT p.id, p.body, p.created_at, p.author_id, u.username
                FROM posts p JOIN users u ON u.id = p.author_id
                ORDER BY p.created_at DESC, p.id DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(|_| AppError::InternalServerError)?;
            (total, rows)
        }
    };

    Ok(ApiResponse::success(Page::new(
        rows.into_iter().map(PostResponse::from).collect(),
        page,
        per_page,
        total,
    )))
}
