//! SAML protocol layer.
//!
//! Provides the engine seam, the bundled SP implementation, the settings
//! directory loader and the request adapter.

pub mod engine;
pub mod provider;
pub mod request;
pub mod settings;

pub use engine::{AssertionOutcome, EngineError, LogoutParams, SamlEngine};
pub use provider::SamlProvider;
pub use request::{NormalizedRequest, RawRequest, RequestAdapter};
pub use settings::{SamlSettings, SettingsError};
