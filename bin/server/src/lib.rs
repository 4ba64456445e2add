//! gatehouse web server.
//!
//! Bridges an OIDC identity provider to local user accounts: browsers log in
//! through the provider and get a server-side session, API clients trade
//! that session for a signed bearer token.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;

pub use app::router;
