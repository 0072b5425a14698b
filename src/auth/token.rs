use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{
        authorization::{Basic, Bearer},
        Authorization,
    },
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{
    auth::{utils, User},
    error::AppError,
};

/// Bearer tokens live for an hour; within the last minute of that window a
/// login mints a fresh one instead of handing back an almost-dead token.
const TOKEN_TTL_SECS: i64 = 3600;
const TOKEN_REUSE_MARGIN_SECS: i64 = 60;

const RESET_TOKEN_TTL_MINS: i64 = 10;

/// Returns the user's current bearer token, reusing the stored one while it
/// still has more than a minute left and minting a new one otherwise.
pub async fn issue_token(pool: &PgPool, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    if let (Some(token), Some(expiration)) = (&user.token, user.token_expiration) {
        if expiration > now + Duration::seconds(TOKEN_REUSE_MARGIN_SECS) {
            return Ok(token.clone());
        }
    }

    let token = utils::generate_token();
    sqlx::query("UPDATE users SET token = $1, token_expiration = $2 WHERE id = $3")
        .bind(&token)
        .bind(now + Duration::seconds(TOKEN_TTL_SECS))
        .bind(user.id)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store token: {:?}", e);
            AppError::InternalServerError
        })?;

    Ok(token)
}

/// Resolves a bearer token to its owner, refreshing `last_seen` on the way.
/// Expired or unknown tokens resolve to `None`; expired rows are left in
/// place, expiry is just a comparison at check time.
pub async fn check_token(pool: &PgPool, token: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET last_seen = NOW()
        WHERE token = $1 AND token_expiration > NOW()
        RETURNING *
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Token lookup failed: {:?}", e);
        AppError::InternalServerError
    })
}

/// Pushes the token expiry into the past so the next `check_token` misses.
pub async fn revoke_token(pool: &PgPool, user_id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET token_expiration = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|_| AppError::InternalServerError)?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    sub: i64,
    exp: i64,
    iat: i64,
}

/// Self-verifying password-reset token: the user id and expiry are signed
/// into the token itself, nothing is stored server-side.
pub fn make_reset_token(user_id: i64, secret: &str) -> anyhow::Result<String> {
    sign_reset_token(user_id, secret, Duration::minutes(RESET_TOKEN_TTL_MINS))
}

fn sign_reset_token(user_id: i64, secret: &str, ttl: Duration) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = ResetClaims {
        sub: user_id,
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

/// Validates signature and expiry; any failure (malformed, tampered,
/// expired) yields `None` so callers cannot tell the cases apart.
pub fn verify_reset_token(token: &str, secret: &str) -> Option<i64> {
    decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.sub)
}

/// The authenticated user, resolved from the `Authorization: Bearer` header.
/// Handlers take this as an explicit parameter; there is no ambient
/// current-user state.
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    PgPool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let pool = PgPool::from_ref(state);
        let user = check_token(&pool, bearer.token())
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser(user))
    }
}

/// A user resolved from HTTP Basic credentials; only the token-issuance
/// endpoint authenticates this way.
pub struct BasicUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for BasicUser
where
    S: Send + Sync,
    PgPool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(basic)) = parts
            .extract::<TypedHeader<Authorization<Basic>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let pool = PgPool::from_ref(state);
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(basic.username())
            .fetch_optional(&pool)
            .await
            .map_err(|_| AppError::InternalServerError)?
            .ok_or(AppError::Unauthorized)?;

        utils::verify_password(&user.password_hash, basic.password())
            .map_err(|_| AppError::Unauthorized)?;

        Ok(BasicUser(user))
    }
}
