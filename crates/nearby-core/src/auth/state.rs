//! Authentication state machine.
//!
//! All session mutation goes through the pure [`reduce`] function so that
//! every observable state is a complete, consistent snapshot. In particular
//! `user` and `tokens` are only ever set or cleared together; no event can
//! produce a state with one present and the other absent.

use chrono::{DateTime, Utc};

use crate::auth::session::AuthTokens;
use crate::models::User;

/// Snapshot of the current authentication status.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub tokens: Option<AuthTokens>,
    pub is_loading: bool,
    /// True only before the one-time bootstrap check of persisted
    /// credentials has finished.
    pub is_initializing: bool,
    pub last_error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            tokens: None,
            is_loading: false,
            is_initializing: true,
            last_error: None,
        }
    }
}

impl AuthState {
    /// Derived: true iff both `user` and `tokens` are present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.tokens.is_some()
    }
}

/// Events that can change authentication state.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    LoadingStarted,
    LoadingFinished,
    /// Bootstrap finished checking persisted credentials.
    InitCompleted,
    /// Successful OTP verification or restored persisted session.
    LoginSucceeded { user: User, tokens: AuthTokens },
    /// Explicit logout or terminal refresh failure.
    LoggedOut,
    /// Server rotated the auth token; user and refresh token unchanged.
    TokenRotated {
        auth_token: String,
        expires_at: DateTime<Utc>,
    },
    /// Profile name update confirmed by the server.
    DetailsUpdated {
        first_name: String,
        last_name: String,
    },
    Failed { message: String },
    ErrorCleared,
}

/// Pure transition function: `(state, event) -> state`.
pub fn reduce(state: &AuthState, event: AuthEvent) -> AuthState {
    let mut next = state.clone();
    match event {
        AuthEvent::LoadingStarted => {
            next.is_loading = true;
            next.last_error = None;
        }
        AuthEvent::LoadingFinished => {
            next.is_loading = false;
        }
        AuthEvent::InitCompleted => {
            next.is_initializing = false;
        }
        AuthEvent::LoginSucceeded { user, tokens } => {
            next.user = Some(user);
            next.tokens = Some(tokens);
            next.is_loading = false;
            next.last_error = None;
        }
        AuthEvent::LoggedOut => {
            next.user = None;
            next.tokens = None;
            next.is_loading = false;
            next.last_error = None;
        }
        AuthEvent::TokenRotated {
            auth_token,
            expires_at,
        } => {
            if let Some(tokens) = next.tokens.as_mut() {
                tokens.auth_token = auth_token;
                tokens.expires_at = expires_at;
            }
        }
        AuthEvent::DetailsUpdated {
            first_name,
            last_name,
        } => {
            if let Some(user) = next.user.as_mut() {
                user.full_name = Some(format!("{} {}", first_name, last_name));
                user.first_name = Some(first_name);
                user.last_name = Some(last_name);
            }
        }
        AuthEvent::Failed { message } => {
            next.last_error = Some(message);
            next.is_loading = false;
        }
        AuthEvent::ErrorCleared => {
            next.last_error = None;
        }
    }
    next
}
