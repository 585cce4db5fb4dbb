//! Data models for NearBy backend entities.
//!
//! This module contains the data structures shared between the auth core
//! and the API pipeline:
//!
//! - `User`: the identity record returned by the auth endpoints
//! - `Role`: requester/provider account role with its wire encodings

pub mod user;

pub use user::{Role, User};
