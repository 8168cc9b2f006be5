//! Flow controller errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::saml::EngineError;
use crate::session::CacheError;

/// Result type for flow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Reasons a SAML request is aborted.
///
/// IdP-supplied detail is carried for server-side logging only; the HTTP
/// body is always a generic message.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Settings could not be loaded or a message could not be built.
    #[error("SAML engine error: {0}")]
    Engine(#[from] EngineError),

    /// The engine reported validation errors for the posted response.
    #[error("SAML authentication error: {}", .0.join(", "))]
    Rejected(Vec<String>),

    /// The response was valid but did not authenticate anyone.
    #[error("SAML user is not authenticated")]
    NotAuthenticated,

    /// The configured extractor found no username in the attributes.
    #[error("could not derive a username from the asserted attributes")]
    UsernameUnavailable,

    /// The platform refused to create a session for this user.
    #[error("platform rejected login for {username}")]
    LoginRejected { username: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The platform failed while creating the session.
    #[error("platform error: {0}")]
    Platform(anyhow::Error),
}

impl FlowError {
    pub fn status(&self) -> StatusCode {
        match self {
            FlowError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            FlowError::LoginRejected { .. } => StatusCode::FORBIDDEN,
            FlowError::Engine(_)
            | FlowError::Rejected(_)
            | FlowError::UsernameUnavailable
            | FlowError::Cache(_)
            | FlowError::Platform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            FlowError::Engine(_) => "SAML is not available",
            FlowError::Rejected(_) => "Authentication error",
            FlowError::NotAuthenticated => "Not authenticated",
            FlowError::UsernameUnavailable => "Could not determine username",
            FlowError::LoginRejected { .. } => "Login rejected",
            FlowError::Cache(_) | FlowError::Platform(_) => "Internal error",
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
