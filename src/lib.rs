//! SAML2 single sign-on and single logout for multi-user hubs.
//!
//! The flow controller sequences login, assertion consumption and logout
//! against a pluggable SAML engine, while a session cache keeps the SAML
//! NameID and SessionIndex of every logged-in user so logout can be
//! propagated back to the IdP.

pub mod config;
pub mod extract;
pub mod flow;
pub mod platform;
pub mod saml;
pub mod session;

pub use config::{HubAuthConfig, Overrides};
pub use extract::{AttributeExtractor, UsernameExtractor};
pub use flow::{routes, FlowConfig, FlowController, FlowError, LogoutOutcome};
pub use platform::{LocalPlatform, Platform, PlatformLogin};
pub use saml::{RawRequest, RequestAdapter, SamlEngine, SamlProvider};
pub use session::{CacheRegistry, CacheSpec, SessionCache, SessionEntry};
