//! Authentication core: session lifecycle, state machine, secure storage.
//!
//! This module provides:
//! - `AuthManager`: OTP login, logout, profile updates, one-time bootstrap
//! - `AuthState` / `reduce`: the pure reducer-style state machine
//! - `SessionHandle`: the single mutation path for session state
//! - `CredentialStore` / `KeyringStore`: at-rest-encrypted persistence
//!
//! Sessions carry a client-side one-hour expiry hint with a five-minute
//! refresh buffer; the server's 401 response stays authoritative.

pub mod manager;
pub mod session;
pub mod state;
pub mod storage;

pub use manager::{AuthManager, OtpInitiation};
pub use session::{AuthTokens, SessionHandle};
pub use state::{reduce, AuthEvent, AuthState};
pub use storage::{CredentialStore, KeyringStore, StorageError};
