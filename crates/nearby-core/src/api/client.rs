//! Authenticated request pipeline.
//!
//! Wraps outbound API calls: injects credentials from session state,
//! detects server-signaled auth failure, and performs at most one
//! 401-triggered recovery per original request as an explicit sequence of
//! named attempts - rotation-retry, refresh-retry, terminal failure. It
//! never recurses: an always-401 server produces a bounded number of
//! dispatches and ends in a forced logout.

use futures::future::{AbortRegistration, Abortable};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::transport::{
    HttpResponse, RequestDescriptor, Transport, HEADER_NEW_AUTH_TOKEN, HEADER_REFRESH_TOKEN,
    HEADER_SESSION_ID,
};
use crate::auth::session::SessionHandle;
use crate::auth::storage::CredentialStore;

/// API client routing all outbound traffic through the auth-aware pipeline.
///
/// Holds a [`SessionHandle`] for reading credentials; mutation happens only
/// through that handle's rotation and forced-logout operations, keeping the
/// auth core the sole owner of session state.
pub struct ApiClient<S, T> {
    session: SessionHandle<S>,
    transport: T,
}

impl<S: CredentialStore, T: Transport> ApiClient<S, T> {
    pub fn new(session: SessionHandle<S>, transport: T) -> Self {
        Self { session, transport }
    }

    /// Send a request, transparently recovering from one auth failure.
    ///
    /// Success returns the response unmodified. A 401 on a request that
    /// requires auth triggers the recovery sequence; every other failure is
    /// classified and returned without a retry.
    pub async fn send(&self, req: &RequestDescriptor) -> Result<HttpResponse, ApiError> {
        if !req.requires_auth {
            let response = self.dispatch(req, HeaderMap::new()).await?;
            if response.is_success() {
                return Ok(response);
            }
            return Err(ApiError::from_response(&response));
        }

        let headers = self.credential_headers().await?;
        let response = self.dispatch(req, headers).await?;
        if response.is_success() {
            return Ok(response);
        }
        if response.status != StatusCode::UNAUTHORIZED {
            return Err(ApiError::from_response(&response));
        }
        self.recover(req, &response).await
    }

    /// [`send`](Self::send), abortable by the caller (e.g. a dismissed
    /// screen). Aborting reports [`ApiError::Cancelled`] and has no effect
    /// on session state; it never enters the recovery path.
    pub async fn send_with_abort(
        &self,
        req: &RequestDescriptor,
        abort: AbortRegistration,
    ) -> Result<HttpResponse, ApiError> {
        match Abortable::new(self.send(req), abort).await {
            Ok(result) => result,
            Err(_aborted) => {
                debug!(path = %req.path, "request cancelled by caller");
                Err(ApiError::Cancelled)
            }
        }
    }

    /// Send and parse a JSON response body.
    pub async fn send_json<R: DeserializeOwned>(
        &self,
        req: &RequestDescriptor,
    ) -> Result<R, ApiError> {
        self.send(req).await?.json()
    }

    async fn dispatch(
        &self,
        req: &RequestDescriptor,
        mut headers: HeaderMap,
    ) -> Result<HttpResponse, ApiError> {
        headers.extend(req.headers.clone());
        self.transport
            .send(req, headers)
            .await
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    /// Credentials for the first attempt: a valid auth token wins; an
    /// expired one falls back to the refresh token so the server can
    /// refresh in place. The session id rides along in either case.
    async fn credential_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let snapshot = self.session.snapshot().await;
        let Some(tokens) = &snapshot.tokens else {
            return Ok(headers);
        };

        if tokens.is_expired() {
            headers.insert(
                HeaderName::from_static(HEADER_REFRESH_TOKEN),
                header_value(&tokens.refresh_token)?,
            );
        } else {
            headers.insert(header::AUTHORIZATION, bearer_value(&tokens.auth_token)?);
        }
        headers.insert(
            HeaderName::from_static(HEADER_SESSION_ID),
            header_value(&tokens.session_id)?,
        );
        Ok(headers)
    }

    /// The 401 recovery sequence. Exactly one retry of the original request
    /// is dispatched before the outcome is final.
    async fn recover(
        &self,
        req: &RequestDescriptor,
        failed: &HttpResponse,
    ) -> Result<HttpResponse, ApiError> {
        // Rotation-retry: the failure itself carried a replacement token.
        if let Some(rotated) = failed.header(HEADER_NEW_AUTH_TOKEN) {
            let rotated = rotated.to_string();
            debug!(path = %req.path, "401 carried a rotated auth token, retrying");
            self.session.rotate_token(rotated.clone()).await;

            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, bearer_value(&rotated)?);
            self.attach_session_id(&mut headers).await?;

            let retry = self.dispatch(req, headers).await?;
            if retry.is_success() {
                return Ok(retry);
            }
            if retry.status == StatusCode::UNAUTHORIZED {
                return self.terminal_failure(req).await;
            }
            return Err(ApiError::from_response(&retry));
        }

        // Refresh-retry: reissue with the refresh token and let the server
        // refresh on its side.
        if let Some(refresh_token) = self.session.refresh_token().await {
            debug!(path = %req.path, "401 without rotation signal, retrying with refresh token");
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_static(HEADER_REFRESH_TOKEN),
                header_value(&refresh_token)?,
            );
            self.attach_session_id(&mut headers).await?;

            let retry = self.dispatch(req, headers).await?;
            if retry.is_success() {
                if let Some(rotated) = retry.header(HEADER_NEW_AUTH_TOKEN) {
                    self.session.rotate_token(rotated.to_string()).await;
                }
                return Ok(retry);
            }
            if retry.status == StatusCode::UNAUTHORIZED {
                return self.terminal_failure(req).await;
            }
            return Err(ApiError::from_response(&retry));
        }

        // Terminal: nothing left to try.
        self.terminal_failure(req).await
    }

    async fn attach_session_id(&self, headers: &mut HeaderMap) -> Result<(), ApiError> {
        if let Some(session_id) = self.session.session_id().await {
            headers.insert(
                HeaderName::from_static(HEADER_SESSION_ID),
                header_value(&session_id)?,
            );
        }
        Ok(())
    }

    async fn terminal_failure(&self, req: &RequestDescriptor) -> Result<HttpResponse, ApiError> {
        warn!(path = %req.path, "authentication unrecoverable, forcing logout");
        self.session.force_logout().await;
        Err(ApiError::SessionExpired)
    }
}

fn bearer_value(token: &str) -> Result<HeaderValue, ApiError> {
    header_value(&format!("Bearer {token}"))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::InvalidCredential(e.to_string()))
}
