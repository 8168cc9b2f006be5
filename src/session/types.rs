//! Session cache types for SAML logout bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// SAML attributes as asserted by the IdP: name → values.
/// Most attributes are single-valued, but SAML allows multi-valued.
pub type Attributes = HashMap<String, Vec<String>>;

/// The SAML identifiers needed to later build a LogoutRequest for a user.
///
/// `SessionEntry::default()` is the "no session" sentinel returned on cache
/// misses. Callers check [`SessionEntry::is_empty`] rather than comparing fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Subject NameID as asserted by the IdP.
    pub name_id: String,

    /// Every attribute from the assertion.
    pub saml_attrs: Attributes,

    /// SessionIndex from the AuthnStatement.
    pub session_index: String,
}

impl SessionEntry {
    /// Create a populated entry.
    pub fn new(name_id: String, saml_attrs: Attributes, session_index: String) -> Self {
        Self {
            name_id,
            saml_attrs,
            session_index,
        }
    }

    /// An entry without a NameID carries no session.
    pub fn is_empty(&self) -> bool {
        self.name_id.is_empty()
    }
}

/// Which cache implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Disabled,
    InMemory,
    Remote,
}

impl CacheKind {
    /// Names accepted in configuration.
    pub const ALLOWED: [&'static str; 3] = ["disabled", "in-memory", "redis"];

    /// Parse a configured backend name.
    pub fn parse(name: &str) -> Result<Self, CacheError> {
        match name {
            "disabled" => Ok(Self::Disabled),
            "in-memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Remote),
            other => Err(CacheError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKind::Disabled => write!(f, "disabled"),
            CacheKind::InMemory => write!(f, "in-memory"),
            CacheKind::Remote => write!(f, "redis"),
        }
    }
}

/// Session cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Configuration named a backend that does not exist.
    #[error("unknown cache backend '{0}', allowed values are: disabled, in-memory, redis")]
    UnknownBackend(String),

    /// A backend was selected without the connection parameters it needs.
    #[error("cache backend '{backend}' requires parameter '{parameter}'")]
    MissingParameter {
        backend: CacheKind,
        parameter: &'static str,
    },

    /// The registry was read before a cache was registered.
    #[error("no session cache registered")]
    NotRegistered,

    /// The store returned a document that is not a session entry.
    #[error("corrupt session entry for '{username}': {reason}")]
    Corrupt { username: String, reason: String },

    /// The backing store failed.
    #[error("session cache backend error: {0}")]
    Backend(String),

    #[error("session cache lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry_is_empty() {
        let entry = SessionEntry::default();
        assert!(entry.is_empty());
        assert!(entry.saml_attrs.is_empty());
        assert!(entry.session_index.is_empty());
    }

    #[test]
    fn test_populated_entry() {
        let mut attrs = Attributes::new();
        attrs.insert(
            "groups".to_string(),
            vec!["staff".to_string(), "admins".to_string()],
        );
        let entry = SessionEntry::new("nameid-1".to_string(), attrs, "idx-1".to_string());
        assert!(!entry.is_empty());
        assert_eq!(entry.saml_attrs["groups"], vec!["staff", "admins"]);
    }

    #[test]
    fn test_entry_json_field_names() {
        let entry = SessionEntry::new(
            "nameid-1".to_string(),
            Attributes::new(),
            "idx-1".to_string(),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["name_id"], "nameid-1");
        assert_eq!(value["session_index"], "idx-1");
        assert!(value["saml_attrs"].is_object());
    }

    #[test]
    fn test_cache_kind_parse() {
        assert_eq!(CacheKind::parse("disabled").unwrap(), CacheKind::Disabled);
        assert_eq!(CacheKind::parse("in-memory").unwrap(), CacheKind::InMemory);
        assert_eq!(CacheKind::parse("redis").unwrap(), CacheKind::Remote);

        let err = CacheKind::parse("memcached").unwrap_err();
        assert!(matches!(err, CacheError::UnknownBackend(ref name) if name == "memcached"));
    }
}
