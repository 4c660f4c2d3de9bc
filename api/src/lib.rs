pub mod config;
pub mod handlers;
pub mod headers;
pub mod pagination;

pub use config::AppConfig;
pub use handlers::{AppState, router};
