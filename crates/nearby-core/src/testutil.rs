//! Shared test fixtures: an in-memory credential store with fault
//! injection and a scripted HTTP transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::api::transport::{HttpResponse, RequestDescriptor, Transport, TransportError};
use crate::auth::session::AuthTokens;
use crate::auth::storage::{CredentialStore, StorageError};
use crate::models::User;

pub fn test_user() -> User {
    User {
        id: "u-1".to_string(),
        phone_no: "+911234567890".to_string(),
        first_name: Some("Asha".to_string()),
        last_name: Some("Rao".to_string()),
        full_name: Some("Asha Rao".to_string()),
        email: None,
        role: 1,
        is_verified: true,
        status: "active".to_string(),
        created_at: "2024-01-05T10:00:00Z".to_string(),
        updated_at: "2024-01-05T10:00:00Z".to_string(),
    }
}

/// Tokens expiring `expires_in_minutes` from now (negative for the past).
/// Sub-second precision is truncated so values survive the RFC 3339
/// round-trip through the store unchanged.
pub fn test_tokens(expires_in_minutes: i64) -> AuthTokens {
    let expires_at = Utc::now() + Duration::minutes(expires_in_minutes);
    let expires_at = expires_at - Duration::nanoseconds(i64::from(expires_at.timestamp_subsec_nanos()));
    AuthTokens {
        auth_token: "tok-auth".to_string(),
        refresh_token: "tok-refresh".to_string(),
        session_id: "sess-1".to_string(),
        expires_at,
    }
}

/// In-memory credential store with per-key fault injection.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    failing_gets: Mutex<HashSet<String>>,
    failing_sets: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_gets.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_set(&self, key: &str) {
        self.failing_sets.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    /// Direct synchronous read for assertions.
    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn stored_key_count(&self) -> usize {
        self.values.lock().unwrap().len()
    }
}

fn injected(key: &str) -> StorageError {
    StorageError {
        key: key.to_string(),
        reason: "injected failure".to_string(),
    }
}

impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(injected(key));
        }
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.failing_sets.lock().unwrap().contains(key) {
            return Err(injected(key));
        }
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(injected(key));
        }
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

/// One scripted transport outcome.
pub enum Reply {
    Response(HttpResponse),
    Network(String),
    /// Never resolves; for cancellation tests.
    Pending,
}

/// Build a scripted response from a status, header pairs, and a body.
pub fn reply(status: u16, headers: &[(&str, &str)], body: &str) -> Reply {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    Reply::Response(HttpResponse {
        status: StatusCode::from_u16(status).expect("valid status code"),
        headers: map,
        body: body.to_string(),
    })
}

/// A request as the transport saw it, with the final merged headers.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        Some(self.headers.get(name)?.to_str().ok()?.to_string())
    }
}

/// Scripted transport: replies are consumed in dispatch order, and every
/// dispatched request is recorded for assertions.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn send(
        &self,
        req: &RequestDescriptor,
        headers: HeaderMap,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: req.method.clone(),
            path: req.path.clone(),
            headers,
            body: req.body.clone(),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockTransport: no scripted reply left for request");
        match reply {
            Reply::Response(response) => Ok(response),
            Reply::Network(reason) => Err(TransportError(reason)),
            Reply::Pending => futures::future::pending().await,
        }
    }
}
