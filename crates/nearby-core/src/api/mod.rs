//! Authenticated API pipeline for the NearBy backend.
//!
//! This module provides the `ApiClient` that routes all outbound traffic:
//! it injects session credentials, recognizes server-signaled auth failure
//! and performs the bounded refresh-and-retry sequence, with `Transport`
//! abstracting the underlying HTTP client.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{
    HttpResponse, RequestDescriptor, ReqwestTransport, Transport, TransportError,
    HEADER_NEW_AUTH_TOKEN, HEADER_REFRESH_TOKEN, HEADER_SESSION_ID,
};
