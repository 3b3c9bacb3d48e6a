//! Contracts of the remote auth and record services.
//!
//! The core consumes these services; it never implements them. HTTP
//! implementations live in [`http`], tests substitute their own.

mod http;

pub use http::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Credential, LoginRequest, LoginResponse, PatientDraft, PatientId, RemotePatient};

/// Remote call errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Credential rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Not found")]
    NotFound,

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => RemoteError::Unauthorized { status },
            404 => RemoteError::NotFound,
            _ => RemoteError::Rejected {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether the credential was refused and the session must end.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, RemoteError::Unauthorized { .. })
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Auth service (`/auth`).
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> RemoteResult<LoginResponse>;

    /// `GET /auth/validate` with the bearer header. `Ok` means the token is accepted.
    async fn validate_token(&self, credential: &Credential) -> RemoteResult<()>;
}

/// Record service (`/patients`). Every call carries the bearer credential.
#[async_trait]
pub trait RecordApi: Send + Sync {
    /// `GET /patients`
    async fn list(&self, credential: &Credential) -> RemoteResult<Vec<RemotePatient>>;

    /// `POST /patients`
    async fn create(
        &self,
        credential: &Credential,
        draft: &PatientDraft,
    ) -> RemoteResult<RemotePatient>;

    /// `PUT /patients/{id}`
    async fn update(
        &self,
        credential: &Credential,
        id: &PatientId,
        draft: &PatientDraft,
    ) -> RemoteResult<RemotePatient>;

    /// `DELETE /patients/{id}`
    async fn delete(&self, credential: &Credential, id: &PatientId) -> RemoteResult<()>;
}
