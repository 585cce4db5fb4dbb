//! Persisted session record and the secure credential store.
//!
//! Session artifacts are mirrored into an at-rest-encrypted key/value store
//! (the OS keychain in production) as five independently-keyed fields.
//! Writes across those keys are not atomic, so a crash mid-write can leave a
//! partial record; [`load_session`] treats any partial or corrupt record as
//! entirely absent and deletes whatever fields remain.

use chrono::{DateTime, Utc};
use keyring::Entry;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::session::AuthTokens;
use crate::models::User;

pub const KEY_USER: &str = "user_data";
pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_SESSION_ID: &str = "session_id";
pub const KEY_EXPIRES_AT: &str = "token_expires_at";

/// All keys that make up one persisted session record.
pub const SESSION_KEYS: [&str; 5] = [
    KEY_USER,
    KEY_AUTH_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_SESSION_ID,
    KEY_EXPIRES_AT,
];

/// A credential store read or write failed.
#[derive(Debug, Error)]
#[error("credential store failure for '{key}': {reason}")]
pub struct StorageError {
    pub key: String,
    pub reason: String,
}

impl StorageError {
    fn new(key: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Opaque at-rest-encrypted key/value store for session artifacts.
///
/// Production uses the OS keychain ([`KeyringStore`]); tests use an
/// in-memory fake with fault injection.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl<S: CredentialStore> CredentialStore for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.as_ref().get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.as_ref().set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.as_ref().delete(key).await
    }
}

/// OS keychain-backed credential store.
///
/// Keychain calls can block on the platform secret service, so they run on
/// the blocking pool.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(service: &str, key: &str) -> Result<Entry, StorageError> {
        Entry::new(service, key).map_err(|e| StorageError::new(key, e))
    }
}

impl CredentialStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let service = self.service.clone();
        let key_owned = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = KeyringStore::entry(&service, &key_owned)?;
            match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(StorageError::new(&key_owned, e)),
            }
        })
        .await
        .map_err(|e| StorageError::new(key, e))?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let service = self.service.clone();
        let key_owned = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = KeyringStore::entry(&service, &key_owned)?;
            entry
                .set_password(&value)
                .map_err(|e| StorageError::new(&key_owned, e))
        })
        .await
        .map_err(|e| StorageError::new(key, e))?
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let service = self.service.clone();
        let key_owned = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = KeyringStore::entry(&service, &key_owned)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(StorageError::new(&key_owned, e)),
            }
        })
        .await
        .map_err(|e| StorageError::new(key, e))?
    }
}

/// Write all five session fields.
///
/// Not atomic across keys; callers that need all-or-nothing semantics must
/// clear the record on failure (the OTP verify flow does).
pub(crate) async fn persist_session<S: CredentialStore>(
    store: &S,
    user: &User,
    tokens: &AuthTokens,
) -> Result<(), StorageError> {
    let user_json = serde_json::to_string(user).map_err(|e| StorageError::new(KEY_USER, e))?;
    store.set(KEY_USER, &user_json).await?;
    store.set(KEY_AUTH_TOKEN, &tokens.auth_token).await?;
    store.set(KEY_REFRESH_TOKEN, &tokens.refresh_token).await?;
    store.set(KEY_SESSION_ID, &tokens.session_id).await?;
    store
        .set(KEY_EXPIRES_AT, &tokens.expires_at.to_rfc3339())
        .await?;
    debug!("session persisted to credential store");
    Ok(())
}

/// Re-persist only the user blob (profile detail updates leave tokens alone).
pub(crate) async fn persist_user<S: CredentialStore>(
    store: &S,
    user: &User,
) -> Result<(), StorageError> {
    let user_json = serde_json::to_string(user).map_err(|e| StorageError::new(KEY_USER, e))?;
    store.set(KEY_USER, &user_json).await
}

/// Delete all five session fields. Best-effort: failures are logged, never
/// propagated, so logout and self-healing cannot be blocked by the store.
pub(crate) async fn clear_session<S: CredentialStore>(store: &S) {
    for key in SESSION_KEYS {
        if let Err(e) = store.delete(key).await {
            warn!(key, error = %e, "failed to delete persisted session field");
        }
    }
}

/// Load the persisted session record, self-healing partial or corrupt state.
///
/// Returns `Ok(None)` (with storage wiped) when any field is missing or
/// unparseable. Expiry is not checked here; the bootstrap sequencer owns
/// that decision.
pub(crate) async fn load_session<S: CredentialStore>(
    store: &S,
) -> Result<Option<(User, AuthTokens)>, StorageError> {
    let (user_json, auth_token, refresh_token, session_id, expires_at) = tokio::try_join!(
        store.get(KEY_USER),
        store.get(KEY_AUTH_TOKEN),
        store.get(KEY_REFRESH_TOKEN),
        store.get(KEY_SESSION_ID),
        store.get(KEY_EXPIRES_AT),
    )?;

    let (Some(user_json), Some(auth_token), Some(refresh_token), Some(session_id), Some(expires_at)) =
        (user_json, auth_token, refresh_token, session_id, expires_at)
    else {
        debug!("partial persisted session record, clearing remaining fields");
        clear_session(store).await;
        return Ok(None);
    };

    let user: User = match serde_json::from_str(&user_json) {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "stored user record is corrupt, clearing session");
            clear_session(store).await;
            return Ok(None);
        }
    };

    let expires_at = match DateTime::parse_from_rfc3339(&expires_at) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(error = %e, "stored expiry timestamp is corrupt, clearing session");
            clear_session(store).await;
            return Ok(None);
        }
    };

    Ok(Some((
        user,
        AuthTokens {
            auth_token,
            refresh_token,
            session_id,
            expires_at,
        },
    )))
}
