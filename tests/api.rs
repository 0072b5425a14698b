//! Database-backed tests for the core operations. They need a running
//! Postgres reachable through DATABASE_URL and are `#[ignore]`d so the
//! default test run passes without one:
//!
//!     DATABASE_URL=postgres://... cargo test -- --ignored

use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::{Path, State};
use murmur_backend::{
    auth::{self, handler::register_user, token, RegisterUser, User},
    auth::token::AuthUser,
    error::{AppError, Json},
    follows::handler as graph,
    posts::handler as content,
    users::{handler::update_user, UpdateUser, ADMIN_USER_ID},
};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!().run(&pool).await.expect("run migrations");
    pool
}

fn unique(prefix: &str) -> String {
    static N: AtomicU32 = AtomicU32::new(0);
    format!(
        "{}{}x{}",
        prefix,
        Utc::now().timestamp_millis(),
        N.fetch_add(1, Ordering::Relaxed)
    )
}

/// Like `create_user`, but never hands back the id-1 admin account, which
/// has its own editing rules.
async fn create_regular_user(pool: &PgPool, prefix: &str) -> User {
    let user = create_user(pool, prefix).await;
    if user.id == ADMIN_USER_ID {
        create_user(pool, prefix).await
    } else {
        user
    }
}

async fn create_user(pool: &PgPool, prefix: &str) -> User {
    let name = unique(prefix);
    let payload = RegisterUser {
        username: name.clone(),
        email: format!("{}@example.com", name),
        password: "password123".to_string(),
    };
    register_user(pool, &payload).await.expect("register user")
}

async fn fetch_user(pool: &PgPool, id: i64) -> User {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("fetch user")
}

async fn insert_post_at(pool: &PgPool, author_id: i64, body: &str, offset_secs: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO posts (author_id, body, created_at) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(author_id)
    .bind(body)
    .bind(Utc::now() + Duration::seconds(offset_secs))
    .fetch_one(pool)
    .await
    .expect("insert post")
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn follow_unfollow_updates_counts() {
    let pool = test_pool().await;
    let u1 = create_user(&pool, "john").await;
    let u2 = create_user(&pool, "susan").await;

    assert!(!graph::is_following(&pool, u1.id, u2.id).await.unwrap());

    graph::follow(&pool, u1.id, u2.id).await.unwrap();
    assert!(graph::is_following(&pool, u1.id, u2.id).await.unwrap());
    assert_eq!(graph::followed_count(&pool, u1.id).await.unwrap(), 1);
    assert_eq!(graph::follower_count(&pool, u2.id).await.unwrap(), 1);
    // The edge is directed.
    assert!(!graph::is_following(&pool, u2.id, u1.id).await.unwrap());

    graph::unfollow(&pool, u1.id, u2.id).await.unwrap();
    assert!(!graph::is_following(&pool, u1.id, u2.id).await.unwrap());
    assert_eq!(graph::followed_count(&pool, u1.id).await.unwrap(), 0);
    assert_eq!(graph::follower_count(&pool, u2.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn follow_is_idempotent() {
    let pool = test_pool().await;
    let u1 = create_user(&pool, "j").await;
    let u2 = create_user(&pool, "s").await;

    graph::follow(&pool, u1.id, u2.id).await.unwrap();
    graph::follow(&pool, u1.id, u2.id).await.unwrap();

    assert_eq!(graph::follower_count(&pool, u2.id).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn self_follow_is_rejected() {
    let pool = test_pool().await;
    let u = create_user(&pool, "solo").await;

    let result = graph::follow(&pool, u.id, u.id).await;
    assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
    assert_eq!(graph::followed_count(&pool, u.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn unfollow_missing_edge_is_a_noop() {
    let pool = test_pool().await;
    let u1 = create_user(&pool, "a").await;
    let u2 = create_user(&pool, "b").await;

    graph::unfollow(&pool, u1.id, u2.id).await.unwrap();
    assert_eq!(graph::follower_count(&pool, u2.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn home_feed_is_own_plus_followed_newest_first() {
    let pool = test_pool().await;
    let john = create_user(&pool, "john").await;
    let susan = create_user(&pool, "susan").await;
    let mary = create_user(&pool, "mary").await;
    let david = create_user(&pool, "david").await;

    let p1 = insert_post_at(&pool, john.id, "post from john", 1).await;
    let p2 = insert_post_at(&pool, susan.id, "post from susan", 4).await;
    let p3 = insert_post_at(&pool, mary.id, "post from mary", 3).await;
    let p4 = insert_post_at(&pool, david.id, "post from david", 2).await;

    graph::follow(&pool, john.id, susan.id).await.unwrap();
    graph::follow(&pool, john.id, david.id).await.unwrap();
    graph::follow(&pool, susan.id, mary.id).await.unwrap();
    graph::follow(&pool, mary.id, david.id).await.unwrap();

    let feed_ids = |feed: murmur_backend::pagination::Page<murmur_backend::posts::PostResponse>| {
        feed.items.into_iter().map(|p| p.id).collect::<Vec<_>>()
    };

    let f1 = graph::home_feed(&pool, john.id, 1, 10).await.unwrap();
    assert_eq!(feed_ids(f1), vec![p2, p4, p1]);

    let f2 = graph::home_feed(&pool, susan.id, 1, 10).await.unwrap();
    assert_eq!(feed_ids(f2), vec![p2, p3]);

    let f3 = graph::home_feed(&pool, mary.id, 1, 10).await.unwrap();
    assert_eq!(feed_ids(f3), vec![p3, p4]);

    let f4 = graph::home_feed(&pool, david.id, 1, 10).await.unwrap();
    assert_eq!(feed_ids(f4), vec![p4]);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn home_feed_breaks_timestamp_ties_by_id() {
    let pool = test_pool().await;
    let u = create_user(&pool, "tie").await;

    let at = Utc::now();
    let mut ids = Vec::new();
    for body in ["first insert", "second insert"] {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (author_id, body, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(u.id)
        .bind(body)
        .bind(at)
        .fetch_one(&pool)
        .await
        .unwrap();
        ids.push(id);
    }

    let feed = graph::home_feed(&pool, u.id, 1, 10).await.unwrap();
    let got: Vec<i64> = feed.items.into_iter().map(|p| p.id).collect();
    // Higher id means created later, so it wins the tie.
    assert_eq!(got, vec![ids[1], ids[0]]);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn home_feed_pagination_envelope() {
    let pool = test_pool().await;
    let u = create_user(&pool, "pager").await;
    for i in 0..7 {
        insert_post_at(&pool, u.id, &format!("post {}", i), i).await;
    }

    let page1 = graph::home_feed(&pool, u.id, 1, 5).await.unwrap();
    assert_eq!(page1.items.len(), 5);
    assert!(page1.has_next);
    assert!(!page1.has_prev);

    let page2 = graph::home_feed(&pool, u.id, 2, 5).await.unwrap();
    assert_eq!(page2.items.len(), 2);
    assert!(!page2.has_next);
    assert!(page2.has_prev);

    let page3 = graph::home_feed(&pool, u.id, 3, 5).await.unwrap();
    assert!(page3.items.is_empty());
    assert!(!page3.has_next);
    assert!(!page3.has_prev);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn duplicate_username_and_email_conflict() {
    let pool = test_pool().await;
    let existing = create_user(&pool, "taken").await;

    let same_username = RegisterUser {
        username: existing.username.clone(),
        email: format!("{}@elsewhere.example.com", unique("u")),
        password: "password123".to_string(),
    };
    assert!(matches!(
        register_user(&pool, &same_username).await,
        Err(AppError::Conflict(_))
    ));

    let same_email = RegisterUser {
        username: unique("other"),
        email: existing.email.clone(),
        password: "password123".to_string(),
    };
    assert!(matches!(
        register_user(&pool, &same_email).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn token_lifecycle() {
    let pool = test_pool().await;
    let user = create_user(&pool, "tok").await;

    let t1 = token::issue_token(&pool, &user).await.unwrap();

    // A second issue within the reuse window hands back the same token.
    let refreshed = fetch_user(&pool, user.id).await;
    let t2 = token::issue_token(&pool, &refreshed).await.unwrap();
    assert_eq!(t1, t2);

    let owner = token::check_token(&pool, &t1).await.unwrap();
    let owner = owner.expect("valid token resolves to its owner");
    assert_eq!(owner.id, user.id);
    assert!(owner.last_seen.is_some());

    token::revoke_token(&pool, user.id).await.unwrap();
    assert!(token::check_token(&pool, &t1).await.unwrap().is_none());

    // A revoked holder gets a fresh token on the next issue.
    let refreshed = fetch_user(&pool, user.id).await;
    let t3 = token::issue_token(&pool, &refreshed).await.unwrap();
    assert_ne!(t1, t3);

    // Natural expiry: push the expiration into the past without revoking.
    sqlx::query("UPDATE users SET token_expiration = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();
    assert!(token::check_token(&pool, &t3).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn only_the_author_may_edit_a_post() {
    let pool = test_pool().await;
    let author = create_user(&pool, "auth").await;
    let stranger = create_user(&pool, "str").await;

    let post = content::new_post(&pool, author.id, "original body").await.unwrap();

    let result = content::edit_post(&pool, post.id, stranger.id, "hijacked").await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    let result = content::edit_post(&pool, post.id, author.id, "   ").await;
    assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));

    let edited = content::edit_post(&pool, post.id, author.id, "edited body")
        .await
        .unwrap();
    assert_eq!(edited.body, "edited body");
    // Editing refreshes the timestamp.
    assert!(edited.created_at >= post.created_at);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn empty_post_body_is_rejected() {
    let pool = test_pool().await;
    let user = create_user(&pool, "empty").await;

    let result = content::new_post(&pool, user.id, "  ").await;
    assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn deleting_a_user_cascades_to_posts_and_edges() {
    let pool = test_pool().await;
    let keeper = create_user(&pool, "keep").await;
    let goner = create_user(&pool, "gone").await;

    content::new_post(&pool, goner.id, "soon to vanish").await.unwrap();
    graph::follow(&pool, keeper.id, goner.id).await.unwrap();
    graph::follow(&pool, goner.id, keeper.id).await.unwrap();

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(goner.id)
        .execute(&pool)
        .await
        .unwrap();

    let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1")
        .bind(goner.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(posts, 0);

    let edges: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = $1 OR followed_id = $1")
            .bind(goner.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(edges, 0);

    assert_eq!(graph::followed_count(&pool, keeper.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn profile_update_persists_changes() {
    let pool = test_pool().await;
    let user = create_regular_user(&pool, "edit").await;

    let new_name = unique("renamed");
    let result = update_user(
        State(pool.clone()),
        AuthUser(fetch_user(&pool, user.id).await),
        Path(user.id),
        Json(UpdateUser {
            username: Some(new_name.clone()),
            email: None,
            about_me: Some("hello from the tests".to_string()),
            password: None,
        }),
    )
    .await;
    assert!(result.is_ok());

    let refreshed = fetch_user(&pool, user.id).await;
    assert_eq!(refreshed.username, new_name);
    assert_eq!(refreshed.about_me.as_deref(), Some("hello from the tests"));
    // Untouched fields keep their values.
    assert_eq!(refreshed.email, user.email);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn profile_rename_onto_taken_username_conflicts() {
    let pool = test_pool().await;
    let user = create_regular_user(&pool, "ren").await;
    let other = create_regular_user(&pool, "occ").await;

    let result = update_user(
        State(pool.clone()),
        AuthUser(fetch_user(&pool, user.id).await),
        Path(user.id),
        Json(UpdateUser {
            username: Some(other.username.clone()),
            email: None,
            about_me: None,
            password: None,
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let refreshed = fetch_user(&pool, user.id).await;
    assert_eq!(refreshed.username, user.username);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn only_the_owner_may_edit_a_profile() {
    let pool = test_pool().await;
    let user = create_regular_user(&pool, "own").await;
    let stranger = create_regular_user(&pool, "str").await;

    let result = update_user(
        State(pool.clone()),
        AuthUser(fetch_user(&pool, stranger.id).await),
        Path(user.id),
        Json(UpdateUser {
            username: None,
            email: None,
            about_me: Some("hijacked".to_string()),
            password: None,
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn single_post_lookup_is_scoped_to_its_author() {
    let pool = test_pool().await;
    let author = create_user(&pool, "one").await;
    let other = create_user(&pool, "two").await;

    let post = content::new_post(&pool, author.id, "a single post").await.unwrap();

    let found = content::post_of_user(&pool, author.id, post.id).await.unwrap();
    assert_eq!(found.id, post.id);
    assert_eq!(found.author.id, author.id);

    // The same post id under the wrong author is not found.
    let result = content::post_of_user(&pool, other.id, post.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn reset_token_resolves_to_the_encoded_user() {
    let pool = test_pool().await;
    let user = create_user(&pool, "reset").await;

    let secret = "integration-secret";
    let reset = auth::token::make_reset_token(user.id, secret).unwrap();
    assert_eq!(auth::token::verify_reset_token(&reset, secret), Some(user.id));
}
