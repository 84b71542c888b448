//! Signwall API - HTTP Layer
//!
//! Axum routes for Discord login, the banner signing workflow, and the
//! rendered banner served from the stale-while-revalidate cache. Outbound
//! services (Discord, renderer, CAPTCHA, notification sinks) sit behind the
//! traits in `signwall-core`; everything is assembled once into
//! [`AppState`].

pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod providers;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ApiConfig, Environment};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::{AppDependencies, AppState};
