//! Session lifecycle manager.
//!
//! Orchestrates OTP-based login, logout, token expiry bookkeeping, profile
//! detail updates, and the one-time bootstrap that restores a persisted
//! session at process start. All session mutation funnels through the
//! shared [`SessionHandle`]; the UI observes state through
//! [`AuthManager::subscribe`] and drives it only through the operations
//! defined here.

use chrono::Utc;
use reqwest::{header, Method};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::transport::{ReqwestTransport, RequestDescriptor, Transport};
use crate::auth::session::{AuthTokens, SessionHandle};
use crate::auth::state::{AuthEvent, AuthState};
use crate::auth::storage::{self, CredentialStore, KeyringStore};
use crate::config::Config;
use crate::models::{Role, User};

/// Result of a successful OTP initiation.
#[derive(Debug, Clone)]
pub struct OtpInitiation {
    /// Correlation id to pass back to `verify_otp`.
    pub request_id: String,
    /// Whether this phone number has no existing account.
    pub is_new_user: bool,
}

/// The authentication core: owns session state and the credential store,
/// and exposes the only mutation surface for them.
pub struct AuthManager<S, T> {
    session: SessionHandle<S>,
    client: ApiClient<S, T>,
}

impl<S: CredentialStore, T: Transport> AuthManager<S, T> {
    pub fn new(store: S, transport: T) -> Self {
        let session = SessionHandle::new(store);
        let client = ApiClient::new(session.clone(), transport);
        Self { session, client }
    }

    /// The authenticated pipeline, for non-auth API traffic.
    pub fn client(&self) -> &ApiClient<S, T> {
        &self.client
    }

    /// Read-only snapshot of the current auth state.
    pub async fn snapshot(&self) -> AuthState {
        self.session.snapshot().await
    }

    /// Observe state changes; yields a snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.session.subscribe()
    }

    pub async fn is_token_expired(&self) -> bool {
        self.session.is_token_expired().await
    }

    /// The auth token while still valid, `None` otherwise.
    pub async fn auth_token(&self) -> Option<String> {
        self.session.auth_token().await
    }

    pub async fn clear_error(&self) {
        self.session.apply(AuthEvent::ErrorCleared).await;
    }

    /// One-time bootstrap: restore a persisted session if a complete,
    /// non-expired record exists; otherwise start logged out. Storage
    /// failures are absorbed - the worst case is a logged-out start. Ends
    /// the initializing window exactly once per process.
    pub async fn initialize(&self) {
        if !self.session.snapshot().await.is_initializing {
            debug!("bootstrap already completed, ignoring");
            return;
        }

        match storage::load_session(self.session.store()).await {
            Ok(Some((user, tokens))) => {
                if tokens.is_past_expiry() {
                    info!("persisted session has expired, clearing");
                    storage::clear_session(self.session.store()).await;
                } else {
                    info!("session restored from secure storage");
                    self.session
                        .apply(AuthEvent::LoginSucceeded { user, tokens })
                        .await;
                }
            }
            Ok(None) => debug!("no persisted session found"),
            Err(e) => {
                warn!(error = %e, "failed to read persisted session, starting logged out");
                storage::clear_session(self.session.store()).await;
            }
        }

        self.session.apply(AuthEvent::InitCompleted).await;
    }

    /// Begin OTP login for a phone number. Does not mutate the session.
    pub async fn initiate_otp(
        &self,
        phone_no: &str,
        role: Role,
    ) -> Result<OtpInitiation, ApiError> {
        self.session.apply(AuthEvent::LoadingStarted).await;
        let result = self.initiate_otp_inner(phone_no, role).await;
        self.finish_operation(&result).await;
        result
    }

    async fn initiate_otp_inner(
        &self,
        phone_no: &str,
        role: Role,
    ) -> Result<OtpInitiation, ApiError> {
        let req = RequestDescriptor::unauthenticated(Method::POST, "/auth/initiate").body(json!({
            "phoneNo": phone_no,
            "authType": "PhoneNo",
            "role": role,
        }));
        let response = self.client.send(&req).await?;
        let parsed: InitiateResponse = response.json()?;

        if !parsed.success {
            return Err(ApiError::ServerRejected {
                status: response.status.as_u16(),
                message: parsed
                    .message
                    .unwrap_or_else(|| "Failed to send OTP".to_string()),
            });
        }
        let user = parsed
            .user
            .ok_or_else(|| ApiError::InvalidResponse("initiate response missing user".into()))?;

        debug!(is_new_user = user.is_new_user, "OTP initiated");
        Ok(OtpInitiation {
            request_id: user.user_id,
            is_new_user: user.is_new_user,
        })
    }

    /// Exchange the OTP for tokens. The session becomes visible as logged
    /// in only after all five fields are durably persisted; a storage
    /// failure rolls the record back and reports the login as failed. A
    /// failed verify never touches an existing session.
    pub async fn verify_otp(
        &self,
        phone_no: &str,
        otp: &str,
        request_id: &str,
        is_new_user: bool,
    ) -> Result<(), ApiError> {
        self.session.apply(AuthEvent::LoadingStarted).await;
        let result = self
            .verify_otp_inner(phone_no, otp, request_id, is_new_user)
            .await;
        self.finish_operation(&result).await;
        result
    }

    async fn verify_otp_inner(
        &self,
        phone_no: &str,
        otp: &str,
        request_id: &str,
        is_new_user: bool,
    ) -> Result<(), ApiError> {
        let req = RequestDescriptor::unauthenticated(Method::POST, "/auth/verify").body(json!({
            "otp": otp,
            "userId": request_id,
            "isNewUser": is_new_user,
            "role": Role::Requester.code(),
            "authType": "PhoneNo",
        }));

        let response = match self.client.send(&req).await {
            Ok(response) => response,
            // The verify endpoint signals a wrong or stale OTP as a 4xx.
            Err(ApiError::ServerRejected { status, message }) if status < 500 => {
                return Err(ApiError::InvalidOtp(message));
            }
            Err(e) => return Err(e),
        };
        let parsed: VerifyResponse = response.json()?;

        if !parsed.success {
            return Err(ApiError::InvalidOtp(
                parsed
                    .message
                    .unwrap_or_else(|| "Verification failed".to_string()),
            ));
        }

        let (Some(auth_token), Some(refresh_token), Some(session_id), Some(mut user)) = (
            parsed.auth_token,
            parsed.refresh_token,
            parsed.session_id,
            parsed.user,
        ) else {
            return Err(ApiError::InvalidResponse(
                "verify response missing tokens or user".into(),
            ));
        };

        // The verify response omits the phone number; carry it over from
        // the login attempt.
        user.phone_no = phone_no.to_string();

        let tokens = AuthTokens {
            auth_token,
            refresh_token,
            session_id,
            expires_at: AuthTokens::lifetime_from(Utc::now()),
        };

        // Durable persistence must succeed before the login becomes
        // visible; roll back partial writes otherwise.
        if let Err(e) = storage::persist_session(self.session.store(), &user, &tokens).await {
            warn!(error = %e, "failed to persist session, rolling back login");
            storage::clear_session(self.session.store()).await;
            return Err(ApiError::Storage(e));
        }

        info!("login successful");
        self.session
            .apply(AuthEvent::LoginSucceeded { user, tokens })
            .await;
        Ok(())
    }

    /// Log out. The server-side call is best-effort; local state and
    /// persisted credentials are always cleared, regardless of network or
    /// storage outcome.
    pub async fn logout(&self) {
        self.session.apply(AuthEvent::LoadingStarted).await;

        let auth_token = {
            let snapshot = self.session.snapshot().await;
            snapshot.tokens.map(|tokens| tokens.auth_token)
        };
        if let Some(token) = auth_token {
            let mut req = RequestDescriptor::unauthenticated(Method::POST, "/auth/logout");
            match header::HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    req.headers.insert(header::AUTHORIZATION, value);
                    if let Err(e) = self.client.send(&req).await {
                        warn!(error = %e, "server-side logout failed, continuing locally");
                    }
                }
                Err(e) => warn!(error = %e, "auth token not header-safe, skipping server logout"),
            }
        }

        self.session.force_logout().await;
        info!("logged out");
    }

    /// Update the user's name through the authenticated pipeline. Returns
    /// whether the update took effect; callers treat it as best-effort, so
    /// failures are logged rather than raised.
    pub async fn update_user_details(&self, first_name: &str, last_name: &str) -> bool {
        let req = RequestDescriptor::new(Method::PATCH, "/details").body(json!({
            "firstName": first_name,
            "lastName": last_name,
        }));

        let response = match self.client.send(&req).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "profile update request failed");
                return false;
            }
        };
        let parsed: DetailsResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "profile update response unreadable");
                return false;
            }
        };
        if !parsed.success {
            warn!(message = ?parsed.message, "profile update rejected");
            return false;
        }

        let state = self
            .session
            .apply(AuthEvent::DetailsUpdated {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            })
            .await;

        // Re-persist only the user blob; tokens are untouched.
        if let Some(user) = &state.user {
            if let Err(e) = storage::persist_user(self.session.store(), user).await {
                warn!(error = %e, "failed to re-persist updated user record");
            }
        }
        true
    }

    /// Apply the closing state event for an explicit user action: clear
    /// the loading flag on success, surface the message on failure.
    async fn finish_operation<V>(&self, result: &Result<V, ApiError>) {
        match result {
            Ok(_) => {
                self.session.apply(AuthEvent::LoadingFinished).await;
            }
            Err(e) => {
                self.session
                    .apply(AuthEvent::Failed {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }
}

impl AuthManager<KeyringStore, ReqwestTransport> {
    /// Production wiring: OS keychain storage and a reqwest transport.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = KeyringStore::new(&config.keyring_service);
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(store, transport))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct InitiateResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<InitiateUser>,
}

#[derive(Debug, Deserialize)]
struct InitiateUser {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "isNewUser")]
    is_new_user: bool,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "authToken", default)]
    auth_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    refresh_token: Option<String>,
    #[serde(rename = "session_id", default)]
    session_id: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}
