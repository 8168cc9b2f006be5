//! SAML Service Provider settings loaded from a settings directory.
//!
//! The directory holds `settings.json` (SP and IdP endpoints) and
//! `advanced_settings.json` (security flags, contacts), in the layout used by
//! python3-saml deployments so existing settings directories can be reused.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main settings document.
pub const SETTINGS_FILE: &str = "settings.json";
/// Advanced settings document.
pub const ADVANCED_SETTINGS_FILE: &str = "advanced_settings.json";

const HTTP_REDIRECT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
const HTTP_POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
const UNSPECIFIED_NAME_ID_FORMAT: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// Settings directory errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not locate SAML settings directory at {0}")]
    MissingDirectory(PathBuf),

    #[error("could not locate {file} in SAML settings directory {dir}")]
    MissingFile { file: &'static str, dir: PathBuf },

    #[error("failed to parse {file}: {reason}")]
    Parse { file: &'static str, reason: String },

    #[error("invalid SAML settings: {0}")]
    Invalid(String),
}

/// An endpoint with its binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub binding: Option<String>,
}

/// This service provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpSettings {
    #[serde(default)]
    pub entity_id: String,

    #[serde(default)]
    pub assertion_consumer_service: Endpoint,

    #[serde(default)]
    pub single_logout_service: Option<Endpoint>,

    #[serde(rename = "NameIDFormat", default = "default_name_id_format")]
    pub name_id_format: String,

    /// SP certificate (base64 body or PEM), published in metadata.
    #[serde(default)]
    pub x509cert: Option<String>,
}

/// The identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpSettings {
    #[serde(default)]
    pub entity_id: String,

    #[serde(default)]
    pub single_sign_on_service: Endpoint,

    #[serde(default)]
    pub single_logout_service: Option<Endpoint>,

    #[serde(default)]
    pub x509cert: Option<String>,
}

/// `settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicSettings {
    /// Reject responses that fail any structural check.
    #[serde(default = "default_true")]
    pub strict: bool,

    #[serde(default)]
    pub debug: bool,

    pub sp: SpSettings,

    pub idp: IdpSettings,
}

/// Security flags from `advanced_settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettings {
    #[serde(default)]
    pub authn_requests_signed: bool,

    #[serde(default)]
    pub logout_request_signed: bool,

    #[serde(default)]
    pub want_assertions_signed: bool,

    /// Ask the IdP for a NameIDPolicy matching the SP's NameID format.
    #[serde(default = "default_true")]
    pub want_name_id: bool,
}

/// A contact published in metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub given_name: String,

    #[serde(default)]
    pub email_address: String,
}

/// `advanced_settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSettings {
    #[serde(default)]
    pub security: SecuritySettings,

    /// Contact type ("technical", "support", ...) → contact.
    #[serde(default)]
    pub contact_person: std::collections::BTreeMap<String, Contact>,
}

/// Both settings documents, validated.
#[derive(Debug, Clone)]
pub struct SamlSettings {
    pub basic: BasicSettings,
    pub advanced: AdvancedSettings,
    /// Directory the documents were read from.
    pub path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_name_id_format() -> String {
    UNSPECIFIED_NAME_ID_FORMAT.to_string()
}

/// Check that `dir` exists and holds both settings documents.
pub fn check_settings_dir(dir: &Path) -> Result<(), SettingsError> {
    if !dir.is_dir() {
        return Err(SettingsError::MissingDirectory(dir.to_path_buf()));
    }

    for file in [SETTINGS_FILE, ADVANCED_SETTINGS_FILE] {
        if !dir.join(file).is_file() {
            return Err(SettingsError::MissingFile {
                file,
                dir: dir.to_path_buf(),
            });
        }
    }

    Ok(())
}

fn read_document<T: serde::de::DeserializeOwned>(
    dir: &Path,
    file: &'static str,
) -> Result<T, SettingsError> {
    let raw = std::fs::read_to_string(dir.join(file)).map_err(|e| SettingsError::Parse {
        file,
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| SettingsError::Parse {
        file,
        reason: e.to_string(),
    })
}

impl SamlSettings {
    /// Load and validate the settings directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let dir = dir.as_ref();
        check_settings_dir(dir)?;

        let settings = Self {
            basic: read_document(dir, SETTINGS_FILE)?,
            advanced: read_document(dir, ADVANCED_SETTINGS_FILE)?,
            path: dir.to_path_buf(),
        };
        settings.validate()?;

        Ok(settings)
    }

    /// Validate required endpoints.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sp = &self.basic.sp;
        let idp = &self.basic.idp;

        if sp.entity_id.is_empty() {
            return Err(SettingsError::Invalid("sp.entityId is required".to_string()));
        }

        if sp.assertion_consumer_service.url.is_empty() {
            return Err(SettingsError::Invalid(
                "sp.assertionConsumerService.url is required".to_string(),
            ));
        }

        if idp.entity_id.is_empty() {
            return Err(SettingsError::Invalid("idp.entityId is required".to_string()));
        }

        if idp.single_sign_on_service.url.is_empty() {
            return Err(SettingsError::Invalid(
                "idp.singleSignOnService.url is required".to_string(),
            ));
        }

        Ok(())
    }

    pub fn sp_entity_id(&self) -> &str {
        &self.basic.sp.entity_id
    }

    pub fn acs_url(&self) -> &str {
        &self.basic.sp.assertion_consumer_service.url
    }

    pub fn acs_binding(&self) -> &str {
        self.basic
            .sp
            .assertion_consumer_service
            .binding
            .as_deref()
            .unwrap_or(HTTP_POST_BINDING)
    }

    /// The SP's own single logout endpoint, if configured.
    pub fn sp_slo(&self) -> Option<(&str, &str)> {
        self.basic
            .sp
            .single_logout_service
            .as_ref()
            .filter(|e| !e.url.is_empty())
            .map(|e| {
                (
                    e.url.as_str(),
                    e.binding.as_deref().unwrap_or(HTTP_REDIRECT_BINDING),
                )
            })
    }

    pub fn idp_entity_id(&self) -> &str {
        &self.basic.idp.entity_id
    }

    pub fn idp_sso_url(&self) -> &str {
        &self.basic.idp.single_sign_on_service.url
    }

    /// The IdP's published single logout URL.
    pub fn idp_slo_url(&self) -> Option<&str> {
        self.basic
            .idp
            .single_logout_service
            .as_ref()
            .map(|e| e.url.as_str())
            .filter(|url| !url.is_empty())
    }

    pub fn name_id_format(&self) -> &str {
        &self.basic.sp.name_id_format
    }

    pub fn strict(&self) -> bool {
        self.basic.strict
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) const SETTINGS_JSON: &str = r#"{
        "strict": true,
        "debug": false,
        "sp": {
            "entityId": "https://hub.example.com/hub/metadata",
            "assertionConsumerService": {
                "url": "https://hub.example.com/hub/acs",
                "binding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
            },
            "singleLogoutService": {
                "url": "https://hub.example.com/hub/logout",
                "binding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
            },
            "NameIDFormat": "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
            "x509cert": "",
            "privateKey": ""
        },
        "idp": {
            "entityId": "https://idp.example.com/metadata",
            "singleSignOnService": {
                "url": "https://idp.example.com/sso",
                "binding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
            },
            "singleLogoutService": {
                "url": "https://idp.example.com/slo",
                "binding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
            },
            "x509cert": "MIIC..."
        }
    }"#;

    pub(crate) const ADVANCED_SETTINGS_JSON: &str = r#"{
        "security": {
            "authnRequestsSigned": false,
            "wantAssertionsSigned": false,
            "signatureAlgorithm": "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"
        },
        "contactPerson": {
            "technical": {"givenName": "Hub Ops", "emailAddress": "ops@example.com"}
        },
        "organization": {"en-US": {"name": "Example", "url": "https://example.com"}}
    }"#;

    /// A temp directory holding valid settings documents.
    pub(crate) fn settings_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), SETTINGS_JSON).unwrap();
        std::fs::write(dir.path().join(ADVANCED_SETTINGS_FILE), ADVANCED_SETTINGS_JSON).unwrap();
        dir
    }

    #[test]
    fn test_load_settings() {
        let dir = settings_dir();
        let settings = SamlSettings::load(dir.path()).unwrap();

        assert_eq!(settings.sp_entity_id(), "https://hub.example.com/hub/metadata");
        assert_eq!(settings.acs_url(), "https://hub.example.com/hub/acs");
        assert_eq!(settings.idp_sso_url(), "https://idp.example.com/sso");
        assert_eq!(settings.idp_slo_url(), Some("https://idp.example.com/slo"));
        assert_eq!(
            settings.name_id_format(),
            "urn:oasis:names:tc:SAML:2.0:nameid-format:transient"
        );
        assert!(settings.strict());
        assert_eq!(
            settings.advanced.contact_person["technical"].email_address,
            "ops@example.com"
        );
    }

    #[test]
    fn test_missing_directory() {
        let result = SamlSettings::load("/nonexistent/saml/settings");
        assert!(matches!(result, Err(SettingsError::MissingDirectory(_))));
    }

    #[test]
    fn test_missing_advanced_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), SETTINGS_JSON).unwrap();

        let result = check_settings_dir(dir.path());
        assert!(matches!(
            result,
            Err(SettingsError::MissingFile { file: ADVANCED_SETTINGS_FILE, .. })
        ));
    }

    #[test]
    fn test_unparseable_settings() {
        let dir = settings_dir();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();

        let result = SamlSettings::load(dir.path());
        assert!(matches!(result, Err(SettingsError::Parse { file: SETTINGS_FILE, .. })));
    }

    #[test]
    fn test_validation() {
        let dir = settings_dir();
        let mut settings = SamlSettings::load(dir.path()).unwrap();
        assert!(settings.validate().is_ok());

        settings.basic.idp.single_sign_on_service.url.clear();
        assert!(settings.validate().is_err());

        settings.basic.idp.single_sign_on_service.url = "https://idp.example.com/sso".to_string();
        settings.basic.sp.entity_id.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_idp_slo_is_none() {
        let dir = settings_dir();
        let mut settings = SamlSettings::load(dir.path()).unwrap();
        settings.basic.idp.single_logout_service = None;
        assert_eq!(settings.idp_slo_url(), None);
    }
}
