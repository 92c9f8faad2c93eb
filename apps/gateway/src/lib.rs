//! Tactix gateway: the authenticating edge in front of the backend API and
//! the realtime distributor.
//!
//! Every HTTP request outside the allowlist needs a valid bearer token and
//! is forwarded with its `Authorization` header intact. WebSocket upgrades
//! on `/rt` authenticate from the subprotocol or `?token=` before the
//! upgrade completes.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod router;
pub mod rt;
pub mod serve;
pub mod state;
pub mod utils;

pub use auth::{Authenticator, JwtAuthenticator};
pub use config::GatewayConfig;
pub use error::ApiError;
pub use middleware::Allowlist;
pub use router::router;
pub use serve::{ServeHandle, build_state, serve, serve_state};
pub use state::AppState;
