//! Remote API contract.
//!
//! The engine does not own the HTTP surface; the host application plugs in an
//! implementation of [`RemoteApi`] that maps each call onto
//! `GET/POST /api/{resource}` and `PUT/DELETE /api/{resource}/{id}` with its
//! own session and auth. Payloads are passed through opaquely.

use std::time::Duration;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::action::EntityKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The call did not complete (no connectivity, connection reset, ...)
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The server answered and refused the mutation (validation, auth, ...)
    #[error("Rejected by server ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
    },
}

impl RemoteError {
    /// Transient failures: the same request may succeed later unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `GET /api/{resource}`: authoritative list.
    async fn list(&self, entity: EntityKind) -> Result<Vec<Value>, RemoteError>;
    /// `POST /api/{resource}`: returns the created record including its id.
    async fn create(&self, entity: EntityKind, data: &Value) -> Result<Value, RemoteError>;
    /// `PUT /api/{resource}/{id}`
    async fn update(&self, entity: EntityKind, id: &str, data: &Value) -> Result<Value, RemoteError>;
    /// `DELETE /api/{resource}/{id}`
    async fn delete(&self, entity: EntityKind, id: &str) -> Result<Value, RemoteError>;
}
