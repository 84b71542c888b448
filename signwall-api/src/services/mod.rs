//! Service Layer
//!
//! The workflows behind the HTTP handlers: session authentication, signing,
//! banner serving, and post-signature notifications. Handlers stay thin and
//! services take their dependencies as trait objects.

mod artifact;
mod auth;
mod notifications;
mod signing;

pub use artifact::*;
pub use auth::*;
pub use notifications::*;
pub use signing::*;
