//! In-memory session state and its shared handle.
//!
//! [`SessionHandle`] is the single mutation path for authentication state:
//! every write goes through [`SessionHandle::apply`], which holds the write
//! lock while the reducer runs and then broadcasts the new snapshot to
//! subscribers. Readers always see whole snapshots, never a half-applied
//! update.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::warn;

use crate::auth::state::{reduce, AuthEvent, AuthState};
use crate::auth::storage::{self, CredentialStore};

/// Client-side session lifetime in minutes.
/// The server's 401 response remains the authoritative expiry signal; this
/// is a local optimization hint only.
pub(crate) const SESSION_LIFETIME_MINUTES: i64 = 60;

/// Buffer before expiry within which a token is already treated as expired,
/// guarding against clock skew and in-flight-request races.
pub(crate) const TOKEN_EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Bearer credentials for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub auth_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Expiry check with the refresh buffer applied.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at - Duration::minutes(TOKEN_EXPIRY_BUFFER_MINUTES)
    }

    /// Hard expiry check without the buffer; bootstrap uses this to decide
    /// whether a persisted session is worth restoring at all.
    pub fn is_past_expiry(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Expiry timestamp for a session issued now.
    pub fn lifetime_from(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(SESSION_LIFETIME_MINUTES)
    }
}

struct SessionInner<S> {
    store: S,
    state: RwLock<AuthState>,
    /// Serializes store writes against the session-wide clear, so a logout
    /// can never interleave with rotation persistence and leave a partial
    /// record behind.
    store_gate: Mutex<()>,
    tx: watch::Sender<AuthState>,
}

/// Shared handle to the session state and the credential store.
///
/// Cheap to clone; all clones observe and mutate the same state. The auth
/// manager and the request pipeline each hold one, which keeps the store's
/// single-writer discipline: nothing outside this handle ever writes it.
pub struct SessionHandle<S> {
    inner: Arc<SessionInner<S>>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: CredentialStore> SessionHandle<S> {
    pub fn new(store: S) -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(SessionInner {
                store,
                state: RwLock::new(AuthState::default()),
                store_gate: Mutex::new(()),
                tx,
            }),
        }
    }

    /// Current state snapshot.
    pub async fn snapshot(&self) -> AuthState {
        self.inner.state.read().await.clone()
    }

    /// Register an observer; the receiver yields a fresh snapshot after
    /// every applied event.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.tx.subscribe()
    }

    /// Apply an event under the write lock and broadcast the result.
    pub(crate) async fn apply(&self, event: AuthEvent) -> AuthState {
        let mut guard = self.inner.state.write().await;
        let next = reduce(&guard, event);
        *guard = next.clone();
        self.inner.tx.send_replace(next.clone());
        next
    }

    pub(crate) fn store(&self) -> &S {
        &self.inner.store
    }

    /// True if tokens are absent or inside the expiry buffer.
    pub async fn is_token_expired(&self) -> bool {
        match &self.inner.state.read().await.tokens {
            Some(tokens) => tokens.is_expired(),
            None => true,
        }
    }

    /// The auth token, only while it is still considered valid. Expired or
    /// absent tokens yield `None`, forcing callers through the refresh path.
    pub async fn auth_token(&self) -> Option<String> {
        let state = self.inner.state.read().await;
        let tokens = state.tokens.as_ref()?;
        if tokens.is_expired() {
            return None;
        }
        Some(tokens.auth_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        let state = self.inner.state.read().await;
        Some(state.tokens.as_ref()?.refresh_token.clone())
    }

    pub async fn session_id(&self) -> Option<String> {
        let state = self.inner.state.read().await;
        Some(state.tokens.as_ref()?.session_id.clone())
    }

    /// Accept a server-issued replacement auth token and mirror it into the
    /// credential store. Persistence failures are logged, not propagated:
    /// rotation happens on a background path and the in-memory token is
    /// already usable.
    pub(crate) async fn rotate_token(&self, auth_token: String) {
        let expires_at = AuthTokens::lifetime_from(Utc::now());
        self.apply(AuthEvent::TokenRotated {
            auth_token: auth_token.clone(),
            expires_at,
        })
        .await;
        let _gate = self.inner.store_gate.lock().await;
        // Re-check under the gate: a logout that won the race has already
        // cleared the record, and writing the token now would resurrect it
        // as a partial one.
        if self.inner.state.read().await.tokens.is_none() {
            return;
        }
        if let Err(e) = self
            .inner
            .store
            .set(storage::KEY_AUTH_TOKEN, &auth_token)
            .await
        {
            warn!(error = %e, "failed to persist rotated auth token");
        }
        if let Err(e) = self
            .inner
            .store
            .set(storage::KEY_EXPIRES_AT, &expires_at.to_rfc3339())
            .await
        {
            warn!(error = %e, "failed to persist rotated token expiry");
        }
    }

    /// Terminal auth failure: wipe persisted credentials and drop to the
    /// logged-out state. Idempotent.
    pub(crate) async fn force_logout(&self) {
        let _gate = self.inner.store_gate.lock().await;
        storage::clear_session(&self.inner.store).await;
        self.apply(AuthEvent::LoggedOut).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::{KEY_AUTH_TOKEN, KEY_EXPIRES_AT};
    use crate::testutil::{test_tokens, test_user, MemoryStore};

    fn login_event() -> AuthEvent {
        AuthEvent::LoginSucceeded {
            user: test_user(),
            tokens: test_tokens(60),
        }
    }

    #[test]
    fn test_token_expired_inside_buffer() {
        // Expires in 2 minutes: inside the 5-minute buffer.
        assert!(test_tokens(2).is_expired());
        assert!(!test_tokens(2).is_past_expiry());
        // Expires in 30 minutes: comfortably valid.
        assert!(!test_tokens(30).is_expired());
        // Already past.
        assert!(test_tokens(-1).is_expired());
        assert!(test_tokens(-1).is_past_expiry());
    }

    #[tokio::test]
    async fn test_auth_token_none_once_inside_buffer() {
        let session = SessionHandle::new(MemoryStore::new());
        session
            .apply(AuthEvent::LoginSucceeded {
                user: test_user(),
                tokens: test_tokens(2),
            })
            .await;
        assert!(session.is_token_expired().await);
        assert_eq!(session.auth_token().await, None);
        // The refresh token stays available as the fallback credential.
        assert!(session.refresh_token().await.is_some());
    }

    #[tokio::test]
    async fn test_rotation_updates_state_and_store() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let session = SessionHandle::new(store.clone());
        session.apply(login_event()).await;

        session.rotate_token("rotated-token".into()).await;

        let state = session.snapshot().await;
        assert_eq!(
            state.tokens.as_ref().unwrap().auth_token,
            "rotated-token"
        );
        assert_eq!(
            store.get_sync(KEY_AUTH_TOKEN).as_deref(),
            Some("rotated-token")
        );
        assert!(store.get_sync(KEY_EXPIRES_AT).is_some());
    }

    #[tokio::test]
    async fn test_rotation_after_logout_persists_nothing() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let session = SessionHandle::new(store.clone());

        session.rotate_token("orphan-token".into()).await;

        assert!(session.snapshot().await.tokens.is_none());
        assert_eq!(store.stored_key_count(), 0);
    }

    #[tokio::test]
    async fn test_rotation_racing_forced_logout_leaves_no_partial_record() {
        // Whichever side wins, the store must end up empty: either the
        // rotation writes land first and the logout clears them, or the
        // logout wins and the rotation skips its writes.
        for _ in 0..32 {
            let store = std::sync::Arc::new(MemoryStore::new());
            let session = SessionHandle::new(store.clone());
            session.apply(login_event()).await;
            crate::auth::storage::persist_session(
                session.store(),
                &test_user(),
                &test_tokens(60),
            )
            .await
            .unwrap();

            let rotating = session.clone();
            let leaving = session.clone();
            let rotate = tokio::spawn(async move {
                rotating.rotate_token("rotated-token".into()).await;
            });
            let logout = tokio::spawn(async move {
                leaving.force_logout().await;
            });
            rotate.await.unwrap();
            logout.await.unwrap();

            assert!(!session.snapshot().await.is_authenticated());
            assert_eq!(store.stored_key_count(), 0, "partial record left behind");
        }
    }

    #[tokio::test]
    async fn test_force_logout_clears_state_and_store() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let session = SessionHandle::new(store.clone());
        session.apply(login_event()).await;
        crate::auth::storage::persist_session(
            session.store(),
            &test_user(),
            &test_tokens(60),
        )
        .await
        .unwrap();

        session.force_logout().await;
        session.force_logout().await; // idempotent

        assert!(!session.snapshot().await.is_authenticated());
        assert_eq!(store.stored_key_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_applied_events() {
        let session = SessionHandle::new(MemoryStore::new());
        let mut rx = session.subscribe();
        assert!(!rx.borrow().is_authenticated());

        session.apply(login_event()).await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_authenticated());
    }
}
