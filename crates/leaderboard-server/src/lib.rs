pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{Authenticator, AuthError, HeaderAuthenticator, Identity};
pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{build_router, start, start_with_state, AppState, ServerHandle};
