use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    auth::{token::AuthUser, utils, User, UserResponse},
    config::settings::Settings,
    error::{AppError, Json},
    follows,
    pagination::{self, Page, PageQuery},
    posts,
    response::{ApiResponse, EmptyData},
    users::{UpdateUser, UserProfileResponse, ADMIN_USER_ID},
};

/// List all users, oldest account first
/// GET /api/users
pub async fn list_users(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    _auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    let page = query.page();
    let (limit, offset) = pagination::slice_bounds(page, settings.users_per_page);

    let users =
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id ASC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(|_| AppError::InternalServerError)?;

    Ok(ApiResponse::success(Page::new(
        users.into_iter().map(UserResponse::from).collect(),
        page,
        settings.users_per_page,
        total,
    )))
}

/// Get a user profile with follow stats
/// GET /api/users/:id
pub async fn get_user(
    State(pool): State<PgPool>,
    auth: Option<AuthUser>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let followers_count = follows::handler::follower_count(&pool, user_id).await?;
    let followed_count = follows::handler::followed_count(&pool, user_id).await?;

    let post_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    let is_following = match &auth {
        Some(AuthUser(current)) if current.id != user_id => {
            follows::handler::is_following(&pool, current.id, user_id).await?
        }
        _ => false,
    };

    Ok(ApiResponse::success(UserProfileResponse {
        id: user.id,
        username: user.username,
        about_me: user.about_me,
        last_seen: user.last_seen,
        followers_count,
        followed_count,
        post_count,
        is_following,
        created_at: user.created_at,
    }))
}

/// Edit a profile. Users may only edit themselves; the admin profile is not
/// editable through this endpoint at all.
/// PUT /api/users/:id
pub async fn update_user(
    State(pool): State<PgPool>,
    AuthUser(current): AuthUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUser>,
) -> Result<impl IntoResponse, AppError> {
    if current.id != user_id {
        return Err(AppError::Forbidden);
    }
    if user_id == ADMIN_USER_ID {
        return Err(AppError::UnprocessableEntity(
            "The admin profile may not be edited".to_string(),
        ));
    }

    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    if let Some(username) = &payload.username {
        if username != &current.username
            && sqlx::query("SELECT 1 FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&pool)
                .await
                .map_err(|_| AppError::InternalServerError)?
                .is_some()
        {
            return Err(AppError::Conflict(
                "Please use a different username".to_string(),
            ));
        }
    }

    if let Some(email) = &payload.email {
        if email != &current.email
            && sqlx::query("SELECT 1 FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&pool)
                .await
                .map_err(|_| AppError::InternalServerError)?
                .is_some()
        {
            return Err(AppError::Conflict(
                "Please use a different email address".to_string(),
            ));
        }
    }

    let password_hash = match &payload.password {
        Some(password) => {
            Some(utils::hash_password(password).map_err(|_| AppError::InternalServerError)?)
        }
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            username = COALESCE($1, username),
            email = COALESCE($2, email),
            about_me = COALESCE($3, about_me),
            password_hash = COALESCE($4, password_hash)
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&payload.about_me)
    .bind(&password_hash)
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e: sqlx::Error| {
        if e.to_string().contains("duplicate key value") {
            AppError::Conflict("Username or email already exists".to_string())
        } else {
            tracing::error!("Database error: {:?}", e);
            AppError::InternalServerError
        }
    })?;

    Ok(ApiResponse::success(UserResponse::from(user)))
}

/// Delete a user. Admin only; the user's posts and follow edges go with it.
/// DELETE /api/users/:id
pub async fn delete_user(
    State(pool): State<PgPool>,
    AuthUser(current): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if current.id != ADMIN_USER_ID {
        return Err(AppError::Forbidden);
    }
    if user_id == ADMIN_USER_ID {
        return Err(AppError::UnprocessableEntity(
            "The admin account cannot be deleted".to_string(),
        ));
    }

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(ApiResponse::<EmptyData>::ok("User deleted".to_string()))
}

/// A user's posts, newest first
/// GET /api/users/:id/posts
pub async fn get_user_posts(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    _auth: AuthUser,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let page = posts::handler::posts_by(&pool, user_id, query.page(), settings.posts_per_page)
        .await?;

    Ok(ApiResponse::success(page))
}

/// One of a user's posts by id
/// GET /api/users/:id/posts/:post_id
pub async fn get_user_post(
    State(pool): State<PgPool>,
    _auth: AuthUser,
    Path((user_id, post_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let post = posts::handler::post_of_user(&pool, user_id, post_id).await?;

    Ok(ApiResponse::success(post))
}
