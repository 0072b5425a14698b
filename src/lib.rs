pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod follows;
pub mod pagination;
pub mod posts;
pub mod response;
pub mod users;
