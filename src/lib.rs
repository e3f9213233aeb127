pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod visibility;

// Re-export commonly used items for tests / external users
pub use feed::{compose_feed, compose_own_feed, delete_own_post, FeedItem, PostRef};
pub use routes::{config, AppState};
pub use visibility::{visible_reviews, visible_tickets};
