//! nearby-core - session and API core for the NearBy booking client.
//!
//! This crate implements the security-critical part of the client: the
//! OTP-based login lifecycle, persisted-credential bootstrap, and the
//! authenticated request pipeline with its bounded 401 recovery. UI layers
//! (screens, navigation, forms) build on top of the observation surface
//! exposed by [`auth::AuthManager`] and stay out of this crate.
//!
//! Typical wiring:
//!
//! ```no_run
//! use nearby_core::{AuthManager, Config};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let auth = AuthManager::from_config(&config)?;
//! auth.initialize().await; // restore a persisted session, if any
//! let _state = auth.subscribe();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiClient, ApiError, HttpResponse, RequestDescriptor, ReqwestTransport, Transport};
pub use auth::{
    AuthEvent, AuthManager, AuthState, AuthTokens, CredentialStore, KeyringStore, OtpInitiation,
    SessionHandle, StorageError,
};
pub use config::Config;
pub use models::{Role, User};
