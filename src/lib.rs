pub mod app;
pub mod auth;
pub mod cache;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod lock;
pub mod models;
pub mod rbac;
pub mod refresh;
pub mod routes;
pub mod store;
pub mod token;
pub mod utils;

// Re-export commonly used items for tests
pub use app::create_app;
