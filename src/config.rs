//! Deployment configuration for the SAML handlers.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::extract::AttributeExtractor;
use crate::flow::FlowConfig;
use crate::saml::settings::check_settings_dir;
use crate::session::CacheSpec;

/// JSON configuration file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct HubAuthConfig {
    /// Directory holding settings.json and advanced_settings.json.
    #[serde(default = "default_settings_path")]
    pub saml_settings_path: PathBuf,

    /// Path the SAML routes are mounted under.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Extra cookies cleared on logout, e.g. the IdP's own session cookies.
    #[serde(default)]
    pub session_cookie_names: BTreeSet<String>,

    /// Redirect to the IdP on logout.
    #[serde(default = "default_true")]
    pub idp_logout: bool,

    /// Skip the LogoutRequest and redirect straight to the IdP's SLO URL.
    #[serde(default)]
    pub unencrypted_logout: bool,

    /// Passed through to the LogoutRequest builder.
    #[serde(default)]
    pub logout_params: HashMap<String, String>,

    #[serde(default)]
    pub cache: CacheSpec,

    /// How the username is derived from asserted attributes.
    #[serde(default)]
    pub username: AttributeExtractor,

    /// Treat every request as HTTPS (TLS terminated upstream).
    #[serde(default)]
    pub https_override: bool,

    /// Where the browser lands after login. Defaults to `<base-path>/home`.
    #[serde(default)]
    pub post_login_url: Option<String>,

    #[serde(default = "default_platform_cookie")]
    pub platform_cookie_name: String,
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("/etc/saml")
}

fn default_base_path() -> String {
    "/hub".to_string()
}

fn default_true() -> bool {
    true
}

fn default_platform_cookie() -> String {
    "hub-session-id".to_string()
}

impl Default for HubAuthConfig {
    fn default() -> Self {
        Self {
            saml_settings_path: default_settings_path(),
            base_path: default_base_path(),
            session_cookie_names: BTreeSet::new(),
            idp_logout: true,
            unencrypted_logout: false,
            logout_params: HashMap::new(),
            cache: CacheSpec::default(),
            username: AttributeExtractor::default(),
            https_override: false,
            post_login_url: None,
            platform_cookie_name: default_platform_cookie(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub saml_settings_path: Option<PathBuf>,
    pub https_override: bool,
}

impl HubAuthConfig {
    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load the file (if any), apply command-line overrides and validate.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.saml_settings_path {
            self.saml_settings_path = path;
        }
        if overrides.https_override {
            self.https_override = true;
        }
    }

    /// Check the settings directory and the remaining fields.
    pub fn validate(&self) -> Result<()> {
        check_settings_dir(&self.saml_settings_path).context("Invalid SAML settings path")?;

        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            bail!("base-path must start with '/': {}", self.base_path);
        }

        self.cache.kind().context("Invalid cache configuration")?;

        if self.platform_cookie_name.is_empty() {
            bail!("platform-cookie-name must not be empty");
        }

        Ok(())
    }

    /// Base path without a trailing slash.
    pub fn base_path(&self) -> &str {
        self.base_path.trim_end_matches('/')
    }

    pub fn post_login_url(&self) -> String {
        self.post_login_url
            .clone()
            .unwrap_or_else(|| format!("{}/home", self.base_path()))
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            base_path: self.base_path().to_string(),
            session_cookie_names: self.session_cookie_names.clone(),
            idp_logout: self.idp_logout,
            unencrypted_logout: self.unencrypted_logout,
            logout_params: self.logout_params.clone(),
        }
    }
}
