//! SAML login, assertion consumption and logout sequencing.
//!
//! Per browser session: anonymous → login initiated → authenticated →
//! logged out. The controller drives the engine and the session cache; it
//! builds no SAML itself.

pub mod error;
pub mod routes;

pub use error::{FlowError, FlowResult};
pub use routes::routes;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::extract::UsernameExtractor;
use crate::platform::{Platform, PlatformLogin};
use crate::saml::{LogoutParams, RawRequest, RequestAdapter, SamlEngine};
use crate::session::{CacheError, CacheRegistry, SessionEntry};

/// Logout and routing behaviour.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Path the SAML routes are mounted under, e.g. "/hub".
    pub base_path: String,
    /// Cookies cleared on logout that the platform does not know about.
    pub session_cookie_names: BTreeSet<String>,
    /// Redirect to the IdP on logout.
    pub idp_logout: bool,
    /// Redirect straight to the IdP's SLO URL without a LogoutRequest.
    pub unencrypted_logout: bool,
    /// Passed through to the LogoutRequest builder.
    pub logout_params: HashMap<String, String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            base_path: "/hub".to_string(),
            session_cookie_names: BTreeSet::new(),
            idp_logout: true,
            unencrypted_logout: false,
            logout_params: HashMap::new(),
        }
    }
}

/// A successful assertion consumption.
#[derive(Debug, Clone)]
pub struct AcsSuccess {
    pub username: String,
    pub login: PlatformLogin,
}

/// How the browser is sent to the IdP on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// 307: plain redirect to the IdP's SLO URL.
    Temporary,
    /// 302: redirect carrying a LogoutRequest.
    Found,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRedirect {
    pub location: String,
    pub kind: RedirectKind,
}

/// What the logout callback must send back to the browser.
#[derive(Debug, Default)]
pub struct LogoutOutcome {
    /// Cookie names to clear.
    pub cleared_cookies: Vec<String>,
    pub redirect: Option<LogoutRedirect>,
    /// First cache failure seen; local logout still went ahead.
    pub cache_error: Option<CacheError>,
}

/// The SP metadata document, or why it cannot be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    Valid(String),
    Invalid(Vec<String>),
}

/// Drives the SAML engine and the session cache for each request.
pub struct FlowController {
    engine: Arc<dyn SamlEngine>,
    caches: Arc<CacheRegistry>,
    extractor: Arc<dyn UsernameExtractor>,
    platform: Arc<dyn Platform>,
    adapter: RequestAdapter,
    config: FlowConfig,
}

impl FlowController {
    pub fn new(
        engine: Arc<dyn SamlEngine>,
        caches: Arc<CacheRegistry>,
        extractor: Arc<dyn UsernameExtractor>,
        platform: Arc<dyn Platform>,
        adapter: RequestAdapter,
        config: FlowConfig,
    ) -> Self {
        Self {
            engine,
            caches,
            extractor,
            platform,
            adapter,
            config,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Start SP-initiated login: the redirect URL to the IdP.
    pub fn login(&self, raw: &RawRequest) -> FlowResult<String> {
        let request = self.adapter.normalize(raw);
        let return_to = format!(
            "{}{}/acs",
            request.origin(),
            self.config.base_path.trim_end_matches('/')
        );

        let url = self.engine.login_redirect(&request, &return_to).map_err(|e| {
            error!(error = %e, "Could not build SAML login redirect");
            FlowError::from(e)
        })?;

        debug!(return_to = %return_to, "Redirecting to IdP for login");
        Ok(url)
    }

    /// Consume the assertion posted by the IdP and log the user into the platform.
    ///
    /// The session entry is written before the platform login, so every user
    /// the platform considers logged in has one. The write runs on its own task
    /// and completes even if this request is dropped; the platform login does not.
    pub async fn consume_assertion(&self, raw: &RawRequest) -> FlowResult<AcsSuccess> {
        let request = self.adapter.normalize(raw);
        let outcome = self.engine.process_assertion(&request);

        if !outcome.errors.is_empty() {
            error!(errors = ?outcome.errors, "SAML authentication error");
            return Err(FlowError::Rejected(outcome.errors));
        }

        if !outcome.authenticated {
            error!("SAML user is not authenticated");
            return Err(FlowError::NotAuthenticated);
        }

        let username = self.extractor.extract(&outcome.attributes).ok_or_else(|| {
            error!(
                attributes = ?outcome.attributes.keys().collect::<Vec<_>>(),
                "No username in asserted attributes"
            );
            FlowError::UsernameUnavailable
        })?;

        let entry = SessionEntry::new(outcome.name_id, outcome.attributes, outcome.session_index);
        let cache = self.caches.get()?;
        let key = username.clone();
        tokio::spawn(async move { cache.upsert(&key, entry).await })
            .await
            .map_err(|e| CacheError::Backend(format!("session write task failed: {}", e)))??;

        let login = self
            .platform
            .login_user(&username)
            .await
            .map_err(FlowError::Platform)?
            .ok_or_else(|| {
                error!(username = %username, "Platform could not log in user");
                FlowError::LoginRejected {
                    username: username.clone(),
                }
            })?;

        info!(username = %username, "SAML login complete");
        Ok(AcsSuccess { username, login })
    }

    /// Logout callback for a known platform user.
    ///
    /// Cookie clearing and cache removal always happen; cache failures are
    /// reported in the outcome rather than aborting the logout.
    pub async fn logout(&self, raw: &RawRequest, username: &str) -> LogoutOutcome {
        let mut outcome = self.cookies_only();

        let entry = match self.caches.get() {
            Ok(cache) => {
                let entry = match cache.get(username).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(username = %username, error = %e, "Could not read session entry");
                        outcome.cache_error = Some(e);
                        SessionEntry::default()
                    }
                };

                if let Err(e) = cache.remove(username).await {
                    warn!(username = %username, error = %e, "Could not remove session entry");
                    outcome.cache_error.get_or_insert(e);
                }

                entry
            }
            Err(e) => {
                warn!(error = %e, "No session cache available during logout");
                outcome.cache_error = Some(e);
                SessionEntry::default()
            }
        };

        if !self.config.idp_logout {
            info!(username = %username, "Logged out locally");
            return outcome;
        }

        outcome.redirect = if self.config.unencrypted_logout {
            match self.engine.idp_slo_url() {
                Some(location) => Some(LogoutRedirect {
                    location,
                    kind: RedirectKind::Temporary,
                }),
                None => {
                    warn!("IdP publishes no single logout URL; skipping IdP logout");
                    None
                }
            }
        } else {
            if entry.is_empty() {
                warn!(username = %username, "Building LogoutRequest without a cached SAML session");
            }
            let params = LogoutParams {
                name_id: entry.name_id,
                session_index: entry.session_index,
                extra: self.config.logout_params.clone(),
            };
            let request = self.adapter.normalize(raw);
            match self.engine.logout_redirect(&request, &params) {
                Ok(location) => Some(LogoutRedirect {
                    location,
                    kind: RedirectKind::Found,
                }),
                Err(e) => {
                    warn!(error = %e, "Could not build LogoutRequest; skipping IdP logout");
                    None
                }
            }
        };

        info!(
            username = %username,
            idp_redirect = outcome.redirect.is_some(),
            "Logged out"
        );
        outcome
    }

    /// Logout without a known user: only the configured cookies are cleared.
    pub fn cookies_only(&self) -> LogoutOutcome {
        LogoutOutcome {
            cleared_cookies: self.config.session_cookie_names.iter().cloned().collect(),
            ..Default::default()
        }
    }

    /// This SP's metadata, served only when it passes validation.
    pub fn metadata(&self) -> FlowResult<Metadata> {
        let document = self.engine.sp_metadata()?;
        let errors = self.engine.validate_metadata(&document);

        if errors.is_empty() {
            Ok(Metadata::Valid(document))
        } else {
            error!(errors = ?errors, "Could not serve metadata");
            Ok(Metadata::Invalid(errors))
        }
    }
}
