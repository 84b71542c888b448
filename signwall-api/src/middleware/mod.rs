//! Middleware modules for the signwall API
//!
//! - `session`: resolves the `session_id` cookie into a [`RequestContext`]
//! - `rate_limit`: per-IP and per-route limits, plus the per-session sign limit
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/banner/sign", post(sign).route_layer(sign_limit))  // needs the context
//!     .route_layer(from_fn_with_state(auth, session_middleware))
//!     .layer(from_fn_with_state(limits, rate_limit_middleware))   // outermost
//! ```
//!
//! [`RequestContext`]: crate::services::RequestContext

mod rate_limit;
mod session;

pub use rate_limit::{
    rate_limit_middleware, sign_rate_limit_middleware, RateLimitError, RateLimitKey,
    RateLimitState,
};
pub use session::{
    clear_session_cookie, read_session_cookie, session_cookie, session_middleware, Authenticated,
};
