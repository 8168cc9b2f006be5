//! Username extraction from asserted attributes.
//!
//! The only place where an IdP's attribute schema is interpreted.

use serde::{Deserialize, Serialize};

use crate::session::Attributes;

/// Derives the platform username from SAML attributes.
pub trait UsernameExtractor: Send + Sync {
    /// `None` when the attributes do not identify a user.
    fn extract(&self, attributes: &Attributes) -> Option<String>;
}

impl<F> UsernameExtractor for F
where
    F: Fn(&Attributes) -> Option<String> + Send + Sync,
{
    fn extract(&self, attributes: &Attributes) -> Option<String> {
        self(attributes)
    }
}

/// Configurable extractor: the first value of one attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AttributeExtractor {
    /// Attribute to read.
    #[serde(default = "default_attribute")]
    pub attribute: String,

    /// Keep only the part before this delimiter, e.g. "@" for email local parts.
    #[serde(default = "default_split_at")]
    pub split_at: Option<String>,

    #[serde(default)]
    pub lowercase: bool,
}

fn default_attribute() -> String {
    "email".to_string()
}

fn default_split_at() -> Option<String> {
    Some("@".to_string())
}

impl Default for AttributeExtractor {
    fn default() -> Self {
        Self {
            attribute: default_attribute(),
            split_at: default_split_at(),
            lowercase: false,
        }
    }
}

impl UsernameExtractor for AttributeExtractor {
    fn extract(&self, attributes: &Attributes) -> Option<String> {
        let value = attributes.get(&self.attribute)?.first()?;

        let value = match self.split_at.as_deref() {
            Some(delimiter) if !delimiter.is_empty() => {
                value.split(delimiter).next().unwrap_or_default()
            }
            _ => value.as_str(),
        };
        let value = value.trim();

        if value.is_empty() {
            return None;
        }

        Some(if self.lowercase {
            value.to_lowercase()
        } else {
            value.to_string()
        })
    }
}
