use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Router,
};
use dotenv::dotenv;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use murmur_backend::{auth, config::settings::Settings, email::EmailService, follows, posts, users};

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    settings: Settings,
    email: Option<EmailService>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> PgPool {
        app_state.pool.clone()
    }
}

impl FromRef<AppState> for Settings {
    fn from_ref(app_state: &AppState) -> Settings {
        app_state.settings.clone()
    }
}

impl FromRef<AppState> for Option<EmailService> {
    fn from_ref(app_state: &AppState) -> Option<EmailService> {
        app_state.email.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::new();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    info!("database connected");

    sqlx::migrate!().run(&pool).await?;

    let email = match &settings.smtp {
        Some(smtp) => Some(EmailService::new(smtp, &settings.frontend_url)?),
        None => None,
    };

    let app_state = AppState {
        pool,
        settings: settings.clone(),
        email,
    };

    let auth_router = Router::new()
        .route("/sign-up", post(auth::handler::signup))
        .route("/sign-in", post(auth::handler::login))
        .route("/me", get(auth::handler::get_me))
        .route("/forgot-password", post(auth::handler::forgot_password))
        .route("/reset-password", post(auth::handler::reset_password));

    let token_router = Router::new().route(
        "/",
        post(auth::handler::get_token).delete(auth::handler::revoke_token),
    );

    let user_router = Router::new()
        .route("/", get(users::handler::list_users))
        .route(
            "/:id",
            get(users::handler::get_user)
                .put(users::handler::update_user)
                .delete(users::handler::delete_user),
        )
        .route("/:id/followers", get(follows::handler::get_followers))
        .route("/:id/followed", get(follows::handler::get_followed))
        .route(
            "/:id/follow",
            post(follows::handler::follow_user).delete(follows::handler::unfollow_user),
        )
        .route("/:id/posts", get(users::handler::get_user_posts))
        .route("/:id/posts/:post_id", get(users::handler::get_user_post));

    let post_router = Router::new()
        .route(
            "/",
            get(posts::handler::get_posts).post(posts::handler::create_post),
        )
        .route("/:id", put(posts::handler::update_post));

    let app = Router::new()
        .route("/", get(|| async { "Murmur API" }))
        .nest("/api/auth", auth_router)
        .nest("/api/tokens", token_router)
        .nest("/api/users", user_router)
        .nest("/api/posts", post_router)
        .route("/api/feed", get(follows::handler::get_home_feed))
        .with_state(app_state);

    info!("Server running on http://localhost:{}", settings.port);

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
