use axum::{extract::State, response::IntoResponse};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    auth::{
        token::{self, AuthUser, BasicUser},
        utils, AuthResponse, ForgotPasswordRequest, LoginUser, RegisterUser, ResetPasswordRequest,
        TokenResponse, User, UserResponse,
    },
    config::settings::Settings,
    email::EmailService,
    error::{AppError, Json},
    response::{ApiResponse, EmptyData},
};

/// Creates a user row from a registration payload. Duplicate usernames and
/// emails are pre-checked for a friendly message and backstopped by the
/// unique constraints for the concurrent case.
pub async fn register_user(pool: &PgPool, payload: &RegisterUser) -> Result<User, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    if sqlx::query("SELECT 1 FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Please use a different username".to_string(),
        ));
    }

    if sqlx::query("SELECT 1 FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Please use a different email address".to_string(),
        ));
    }

    let password_hash =
        utils::hash_password(&payload.password).map_err(|_| AppError::InternalServerError)?;

    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e: sqlx::Error| {
        if e.to_string().contains("duplicate key value") {
            AppError::Conflict("Username or email already exists".to_string())
        } else {
            tracing::error!("Database error: {:?}", e);
            AppError::InternalServerError
        }
    })
}

pub async fn signup(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterUser>,
) -> Result<impl IntoResponse, AppError> {
    let user = register_user(&pool, &payload).await?;

    let token = token::issue_token(&pool, &user).await?;

    Ok(ApiResponse::success(AuthResponse {
        token,
        user: UserResponse::from(user),
    })
    .created())
}

pub async fn login(
    State(pool): State<PgPool>,
    Json(payload): Json<LoginUser>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Database error: {:?}", e);
            AppError::InternalServerError
        })?
        .ok_or(AppError::Unauthorized)?;

    utils::verify_password(&user.password_hash, &payload.password)
        .map_err(|_| AppError::Unauthorized)?;

    let token = token::issue_token(&pool, &user).await?;

    Ok(ApiResponse::success(AuthResponse {
        token,
        user: UserResponse::from(user),
    }))
}

pub async fn get_me(AuthUser(user): AuthUser) -> Result<impl IntoResponse, AppError> {
    Ok(ApiResponse::success(UserResponse::from(user)))
}

/// Exchange HTTP Basic credentials for a bearer token.
/// POST /api/tokens
pub async fn get_token(
    State(pool): State<PgPool>,
    BasicUser(user): BasicUser,
) -> Result<impl IntoResponse, AppError> {
    let token = token::issue_token(&pool, &user).await?;
    Ok(ApiResponse::success(TokenResponse { token }))
}

/// Invalidate the presented bearer token.
/// DELETE /api/tokens
pub async fn revoke_token(
    State(pool): State<PgPool>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    token::revoke_token(&pool, user.id).await?;
    Ok(ApiResponse::<EmptyData>::ok("Token revoked".to_string()))
}

/// Start the password-reset flow. Always answers 200 so the endpoint does
/// not reveal which emails have accounts.
pub async fn forgot_password(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    State(email): State<Option<EmailService>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    if let Some(user) = user {
        let reset_token = token::make_reset_token(user.id, &settings.secret_key)
            .map_err(|_| AppError::InternalServerError)?;

        match &email {
            Some(service) => {
                if let Err(e) = service
                    .send_password_reset_email(&user.email, &user.username, &reset_token)
                    .await
                {
                    tracing::error!("Failed to send reset email: {:?}", e);
                }
            }
            None => tracing::warn!("SMTP not configured, skipping reset email"),
        }
    }

    Ok(ApiResponse::<EmptyData>::ok(
        "If the email is registered, a reset link has been sent".to_string(),
    ))
}

pub async fn reset_password(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let user_id = token::verify_reset_token(&payload.token, &settings.secret_key)
        .ok_or(AppError::Unauthorized)?;

    let password_hash =
        utils::hash_password(&payload.new_password).map_err(|_| AppError::InternalServerError)?;

    let updated = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;

    // A signed token for a since-deleted user is still just "unauthenticated".
    if updated.rows_affected() == 0 {
        return Err(AppError::Unauthorized);
    }

    Ok(ApiResponse::<EmptyData>::ok("Password reset".to_string()))
}
