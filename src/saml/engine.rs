//! The SAML protocol engine seam.
//!
//! The flow controller only sequences protocol steps; building and checking
//! SAML messages is the engine's job. [`SamlProvider`](super::SamlProvider)
//! is the bundled implementation.

use std::collections::HashMap;
use thiserror::Error;

use super::request::NormalizedRequest;
use super::settings::SettingsError;
use crate::session::Attributes;

/// Engine failures that prevent a message from being built.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("IdP does not publish a {0} endpoint")]
    MissingEndpoint(&'static str),

    #[error("failed to encode SAML message: {0}")]
    Encoding(String),
}

/// What the engine learned from a posted SAML response.
///
/// Callers check `errors` first, then `authenticated`.
#[derive(Debug, Clone, Default)]
pub struct AssertionOutcome {
    /// Validation errors; non-empty means the response must be rejected.
    pub errors: Vec<String>,
    /// Whether the response authenticated a subject.
    pub authenticated: bool,
    pub name_id: String,
    pub session_index: String,
    pub attributes: Attributes,
}

impl AssertionOutcome {
    /// An outcome carrying a single validation error.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

/// Inputs for a LogoutRequest.
#[derive(Debug, Clone, Default)]
pub struct LogoutParams {
    pub name_id: String,
    pub session_index: String,
    /// Deployment-configured passthrough parameters (`return-to`, ...).
    pub extra: HashMap<String, String>,
}

/// Builds and validates SAML messages for one service provider.
pub trait SamlEngine: Send + Sync {
    /// Redirect URL carrying an AuthnRequest; `return_to` becomes the RelayState.
    fn login_redirect(
        &self,
        request: &NormalizedRequest,
        return_to: &str,
    ) -> Result<String, EngineError>;

    /// Validate the response posted to the ACS endpoint.
    fn process_assertion(&self, request: &NormalizedRequest) -> AssertionOutcome;

    /// Redirect URL carrying a LogoutRequest for the given subject.
    fn logout_redirect(
        &self,
        request: &NormalizedRequest,
        params: &LogoutParams,
    ) -> Result<String, EngineError>;

    /// The IdP's published single logout URL.
    fn idp_slo_url(&self) -> Option<String>;

    /// This SP's metadata document.
    fn sp_metadata(&self) -> Result<String, EngineError>;

    /// Problems found in a metadata document; empty when it is valid.
    fn validate_metadata(&self, metadata: &str) -> Vec<String>;
}
