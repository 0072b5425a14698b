use std::env;
use std::net::SocketAddr;

#[derive(Clone)]
pub struct Settings {
    pub port: u16,
    pub addr: SocketAddr,
    pub database_url: String,
    pub secret_key: String,
    pub posts_per_page: i64,
    pub users_per_page: i64,
    pub frontend_url: String,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl Settings {
    pub fn new() -> Self {
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let secret_key = env::var("SECRET_KEY").expect("SECRET_KEY must be set");

        let posts_per_page: i64 = env::var("POSTS_PER_PAGE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let users_per_page: i64 = env::var("USERS_PER_PAGE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));

        // Reset mail is skipped (with a warning) when SMTP is not configured.
        let smtp = env::var("SMTP_HOST").ok().map(|host| SmtpSettings {
            host,
            port: env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            username: env::var("SMTP_USERNAME").expect("SMTP_USERNAME must be set"),
            password: env::var("SMTP_PASSWORD").expect("SMTP_PASSWORD must be set"),
            from_email: env::var("FROM_EMAIL").expect("FROM_EMAIL must be set"),
            from_name: env::var("FROM_NAME").unwrap_or_else(|_| "Murmur".to_string()),
        });

        Self {
            port,
            addr,
            database_url,
            secret_key,
            posts_per_page,
            users_per_page,
            frontend_url,
            smtp,
        }
    }
}
