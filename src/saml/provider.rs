//! Bundled SAML engine.
//!
//! Builds HTTP-Redirect binding AuthnRequests and LogoutRequests, checks
//! posted responses structurally (status, destination, issuer, audience,
//! validity window) and publishes SP metadata. Messages are sent unsigned and
//! response signatures are not verified here, so settings that require either
//! are refused at load; deployments that need signing plug in their own
//! [`SamlEngine`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use super::engine::{AssertionOutcome, EngineError, LogoutParams, SamlEngine};
use super::request::NormalizedRequest;
use super::settings::{SamlSettings, SettingsError};
use crate::session::Attributes;

/// Allowed clock drift between this host and the IdP.
pub const ALLOWED_CLOCK_DRIFT_SECS: i64 = 300;

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

/// SAML Service Provider driven by a settings directory.
pub struct SamlProvider {
    settings: RwLock<SamlSettings>,
}

impl SamlProvider {
    /// Create a provider from already-loaded settings.
    ///
    /// Fails when the settings ask for request signing or signed assertions.
    pub fn new(settings: SamlSettings) -> Result<Self, SettingsError> {
        reject_signing_requirements(&settings)?;
        Ok(Self {
            settings: RwLock::new(settings),
        })
    }

    /// Load the settings directory and create a provider.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::new(SamlSettings::load(dir)?)
    }

    /// Re-read the settings directory the provider was created from.
    ///
    /// On failure the previous settings stay in effect.
    pub fn reload(&self) -> Result<(), EngineError> {
        let path = self.settings()?.path;
        let fresh = SamlSettings::load(&path)?;
        reject_signing_requirements(&fresh)?;

        let mut settings = self
            .settings
            .write()
            .map_err(|_| SettingsError::Invalid("settings lock poisoned".to_string()))?;
        *settings = fresh;

        info!(path = ?path, "SAML settings reloaded");
        Ok(())
    }

    /// Get a clone of the current settings.
    pub fn settings(&self) -> Result<SamlSettings, EngineError> {
        self.settings
            .read()
            .map(|s| s.clone())
            .map_err(|_| SettingsError::Invalid("settings lock poisoned".to_string()).into())
    }

    fn check_response(&self, settings: &SamlSettings, encoded: &str) -> AssertionOutcome {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let response_xml = match BASE64.decode(compact) {
            Ok(bytes) => bytes,
            Err(e) => return AssertionOutcome::rejected(format!("SAMLResponse is not base64: {}", e)),
        };
        let response_str = match String::from_utf8(response_xml) {
            Ok(s) => s,
            Err(_) => return AssertionOutcome::rejected("SAMLResponse is not valid UTF-8"),
        };

        debug!("Processing SAML response");

        let response: samael::schema::Response = match response_str.parse() {
            Ok(r) => r,
            Err(e) => return AssertionOutcome::rejected(format!("malformed SAML response: {}", e)),
        };

        let status = match response.status.as_ref() {
            Some(status) => status,
            None => return AssertionOutcome::rejected("SAML response has no Status"),
        };
        let status_value = status.status_code.value.as_deref();
        if status_value != Some(STATUS_SUCCESS) {
            let message = status
                .status_message
                .as_ref()
                .and_then(|m| m.value.clone())
                .unwrap_or_else(|| "Unknown error".to_string());
            return AssertionOutcome::rejected(format!(
                "IdP returned status {}: {}",
                status_value.unwrap_or("(none)"),
                message
            ));
        }

        let mut errors = Vec::new();
        let strict = settings.strict();

        if settings.advanced.security.want_assertions_signed {
            errors.push(
                "signed assertions are required but signatures are not verified".to_string(),
            );
        }

        if let Some(ref destination) = response.destination {
            if strict && destination != settings.acs_url() {
                errors.push(format!(
                    "response destination {} does not match ACS URL {}",
                    destination,
                    settings.acs_url()
                ));
            }
        }

        let assertion = match response.assertion.as_ref() {
            Some(a) => a,
            None => {
                errors.push("SAML response contains no assertion".to_string());
                return AssertionOutcome {
                    errors,
                    ..Default::default()
                };
            }
        };

        let issuer = assertion.issuer.value.clone().unwrap_or_default();
        if strict && issuer != settings.idp_entity_id() {
            errors.push(format!(
                "assertion issuer {} does not match IdP entity ID {}",
                issuer,
                settings.idp_entity_id()
            ));
        }

        let now = Utc::now();
        let skew = Duration::seconds(ALLOWED_CLOCK_DRIFT_SECS);

        if let Some(ref conditions) = assertion.conditions {
            if let Some(not_before) = conditions.not_before {
                if now < not_before - skew {
                    errors.push("assertion is not yet valid".to_string());
                }
            }
            if let Some(not_on_or_after) = conditions.not_on_or_after {
                if now >= not_on_or_after + skew {
                    errors.push("assertion has expired".to_string());
                }
            }
            if let Some(ref restrictions) = conditions.audience_restrictions {
                let sp_entity_id = settings.sp_entity_id();
                let allowed = restrictions
                    .iter()
                    .all(|r| r.audience.iter().any(|a| a == sp_entity_id));
                if strict && !allowed {
                    errors.push(format!("{} is not a valid audience for this assertion", sp_entity_id));
                }
            }
        }

        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.clone())
            .unwrap_or_default();
        if name_id.is_empty() {
            errors.push("assertion is missing a NameID".to_string());
        }

        let session_index = assertion
            .authn_statements
            .as_ref()
            .and_then(|stmts| stmts.first())
            .and_then(|s| s.session_index.clone())
            .unwrap_or_default();

        let mut attributes = Attributes::new();
        if let Some(ref attr_statements) = assertion.attribute_statements {
            for attr_statement in attr_statements {
                for attr in &attr_statement.attributes {
                    if let Some(ref name) = attr.name {
                        let values: Vec<String> = attr
                            .values
                            .iter()
                            .filter_map(|v| v.value.clone())
                            .collect();
                        attributes.entry(name.clone()).or_default().extend(values);
                    }
                }
            }
        }

        let authenticated = errors.is_empty();
        if authenticated {
            info!(
                name_id = %name_id,
                idp = %issuer,
                attributes = attributes.len(),
                "SAML assertion validated"
            );
        }

        AssertionOutcome {
            errors,
            authenticated,
            name_id,
            session_index,
            attributes,
        }
    }
}

impl SamlEngine for SamlProvider {
    fn login_redirect(
        &self,
        _request: &NormalizedRequest,
        return_to: &str,
    ) -> Result<String, EngineError> {
        let settings = self.settings()?;

        let request_id = format!("_id{}", uuid::Uuid::new_v4());
        let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let name_id_policy = if settings.advanced.security.want_name_id {
            format!(
                r#"<samlp:NameIDPolicy Format="{}" AllowCreate="true"/>"#,
                xml_escape(settings.name_id_format())
            )
        } else {
            String::new()
        };

        let authn_request = format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" ProtocolBinding="{}" AssertionConsumerServiceURL="{}"><saml:Issuer>{}</saml:Issuer>{}</samlp:AuthnRequest>"#,
            request_id,
            issue_instant,
            xml_escape(settings.idp_sso_url()),
            POST_BINDING,
            xml_escape(settings.acs_url()),
            xml_escape(settings.sp_entity_id()),
            name_id_policy
        );

        let encoded = deflate_and_encode(&authn_request)?;
        let url = append_query(
            settings.idp_sso_url(),
            &[("SAMLRequest", encoded.as_str()), ("RelayState", return_to)],
        );

        debug!(request_id = %request_id, "Created SAML AuthnRequest redirect");
        Ok(url)
    }

    fn process_assertion(&self, request: &NormalizedRequest) -> AssertionOutcome {
        let settings = match self.settings() {
            Ok(s) => s,
            Err(e) => return AssertionOutcome::rejected(e.to_string()),
        };

        match request.field("SAMLResponse") {
            Some(encoded) if !encoded.is_empty() => self.check_response(&settings, encoded),
            _ => AssertionOutcome::rejected(
                "SAMLResponse not found; only the HTTP-POST binding is supported",
            ),
        }
    }

    fn logout_redirect(
        &self,
        _request: &NormalizedRequest,
        params: &LogoutParams,
    ) -> Result<String, EngineError> {
        let settings = self.settings()?;
        let slo_url = settings
            .idp_slo_url()
            .ok_or(EngineError::MissingEndpoint("SingleLogoutService"))?;

        let mut name_id_format = settings.name_id_format().to_string();
        let mut name_qualifier = String::new();
        let mut relay_state = None;
        for (key, value) in &params.extra {
            match key.as_str() {
                "return-to" => relay_state = Some(value.as_str()),
                "name-id-format" => name_id_format = value.clone(),
                "nq" => name_qualifier.push_str(&format!(r#" NameQualifier="{}""#, xml_escape(value))),
                "spnq" => {
                    name_qualifier.push_str(&format!(r#" SPNameQualifier="{}""#, xml_escape(value)))
                }
                other => debug!(parameter = %other, "Ignoring unrecognised logout parameter"),
            }
        }

        let session_index = if params.session_index.is_empty() {
            String::new()
        } else {
            format!(
                "<samlp:SessionIndex>{}</samlp:SessionIndex>",
                xml_escape(&params.session_index)
            )
        };

        let logout_request = format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_id{}" Version="2.0" IssueInstant="{}" Destination="{}"><saml:Issuer>{}</saml:Issuer><saml:NameID Format="{}"{}>{}</saml:NameID>{}</samlp:LogoutRequest>"#,
            uuid::Uuid::new_v4(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            xml_escape(slo_url),
            xml_escape(settings.sp_entity_id()),
            xml_escape(&name_id_format),
            name_qualifier,
            xml_escape(&params.name_id),
            session_index
        );

        let encoded = deflate_and_encode(&logout_request)?;
        let mut query = vec![("SAMLRequest", encoded.as_str())];
        if let Some(state) = relay_state {
            query.push(("RelayState", state));
        }

        Ok(append_query(slo_url, &query))
    }

    fn idp_slo_url(&self) -> Option<String> {
        self.settings()
            .ok()
            .and_then(|s| s.idp_slo_url().map(str::to_string))
    }

    fn sp_metadata(&self) -> Result<String, EngineError> {
        let settings = self.settings()?;
        let security = &settings.advanced.security;

        let key_descriptor = settings
            .basic
            .sp
            .x509cert
            .as_deref()
            .map(certificate_body)
            .filter(|cert| !cert.is_empty())
            .map(|cert| {
                format!(
                    r#"<md:KeyDescriptor use="signing"><ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#,
                    cert
                )
            })
            .unwrap_or_default();

        let slo = settings
            .sp_slo()
            .map(|(url, binding)| {
                format!(
                    r#"<md:SingleLogoutService Binding="{}" Location="{}"/>"#,
                    xml_escape(binding),
                    xml_escape(url)
                )
            })
            .unwrap_or_default();

        let contacts: String = settings
            .advanced
            .contact_person
            .iter()
            .map(|(kind, contact)| {
                format!(
                    r#"<md:ContactPerson contactType="{}"><md:GivenName>{}</md:GivenName><md:EmailAddress>{}</md:EmailAddress></md:ContactPerson>"#,
                    xml_escape(kind),
                    xml_escape(&contact.given_name),
                    xml_escape(&contact.email_address)
                )
            })
            .collect();

        Ok(format!(
            r#"<?xml version="1.0"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}"><md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="{}" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">{}{}<md:NameIDFormat>{}</md:NameIDFormat><md:AssertionConsumerService Binding="{}" Location="{}" index="1"/></md:SPSSODescriptor>{}</md:EntityDescriptor>"#,
            xml_escape(settings.sp_entity_id()),
            security.authn_requests_signed,
            security.want_assertions_signed,
            key_descriptor,
            slo,
            xml_escape(settings.name_id_format()),
            xml_escape(settings.acs_binding()),
            xml_escape(settings.acs_url()),
            contacts
        ))
    }

    fn validate_metadata(&self, metadata: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if !metadata.contains("<md:EntityDescriptor") {
            errors.push("metadata has no EntityDescriptor".to_string());
        } else {
            let entity_id = metadata
                .split_once(r#"entityID=""#)
                .and_then(|(_, rest)| rest.split_once('"'))
                .map(|(id, _)| id);
            if entity_id.map_or(true, str::is_empty) {
                errors.push("EntityDescriptor has an empty entityID".to_string());
            }
        }

        if !metadata.contains("<md:SPSSODescriptor") {
            errors.push("metadata has no SPSSODescriptor".to_string());
        }

        if !metadata.contains("<md:AssertionConsumerService") {
            errors.push("SPSSODescriptor has no AssertionConsumerService".to_string());
        }

        errors
    }
}

fn reject_signing_requirements(settings: &SamlSettings) -> Result<(), SettingsError> {
    let security = &settings.advanced.security;

    let mut required = Vec::new();
    if security.authn_requests_signed {
        required.push("authnRequestsSigned");
    }
    if security.logout_request_signed {
        required.push("logoutRequestSigned");
    }
    if security.want_assertions_signed {
        required.push("wantAssertionsSigned");
    }

    if required.is_empty() {
        return Ok(());
    }

    warn!(
        settings = ?required,
        "Signing is required by settings but not supported by the bundled engine"
    );
    Err(SettingsError::Invalid(format!(
        "{} requires XML signatures, which the bundled engine does not support",
        required.join(", ")
    )))
}

/// Append query parameters to a URL that may already carry a query.
fn append_query(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    let mut separator = if base.contains('?') { '&' } else { '?' };
    for (key, value) in params {
        url.push(separator);
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    url
}

/// Strip PEM armour and whitespace from a certificate.
fn certificate_body(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
        .collect()
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Deflate and base64 encode for SAML redirect binding.
fn deflate_and_encode(xml: &str) -> Result<String, EngineError> {
    use std::io::Write;

    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| EngineError::Encoding(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| EngineError::Encoding(e.to_string()))?;
    Ok(BASE64.encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::settings::tests::settings_dir;
    use std::collections::HashMap;
    use std::io::Read;

    fn test_provider() -> (SamlProvider, tempfile::TempDir) {
        let dir = settings_dir();
        let provider = SamlProvider::from_dir(dir.path()).unwrap();
        (provider, dir)
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        let (_, query) = url.split_once('?')?;
        crate::saml::request::parse_form(query)
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn inflate(encoded: &str) -> String {
        let compressed = BASE64.decode(encoded).unwrap();
        let mut decoder = flate2::read::DeflateDecoder::new(compressed.as_slice());
        let mut xml = String::new();
        decoder.read_to_string(&mut xml).unwrap();
        xml
    }

    fn saml_response(audience: &str, not_on_or_after: chrono::DateTime<Utc>) -> String {
        let now = Utc::now();
        let fmt = "%Y-%m-%dT%H:%M:%SZ";
        format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0" IssueInstant="{now}" Destination="https://hub.example.com/hub/acs">
  <saml:Issuer>https://idp.example.com/metadata</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_assert1" Version="2.0" IssueInstant="{now}">
    <saml:Issuer>https://idp.example.com/metadata</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:transient">_nameid123</saml:NameID>
    </saml:Subject>
    <saml:Conditions NotBefore="{before}" NotOnOrAfter="{after}">
      <saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="{now}" SessionIndex="_session456">
      <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></saml:AuthnContext>
    </saml:AuthnStatement>
    <saml:AttributeStatement>
      <saml:Attribute Name="email"><saml:AttributeValue>user1@example.com</saml:AttributeValue></saml:Attribute>
      <saml:Attribute Name="groups"><saml:AttributeValue>staff</saml:AttributeValue><saml:AttributeValue>admins</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#,
            now = now.format(fmt),
            before = (now - Duration::seconds(60)).format(fmt),
            after = not_on_or_after.format(fmt),
            audience = audience,
        )
    }

    fn posted(xml: &str) -> NormalizedRequest {
        let mut fields = HashMap::new();
        fields.insert("SAMLResponse".to_string(), BASE64.encode(xml));
        NormalizedRequest {
            fields,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_authn_request() {
        let (provider, _dir) = test_provider();

        let url = provider
            .login_redirect(&NormalizedRequest::default(), "https://hub.example.com/hub/acs")
            .unwrap();
        assert!(url.starts_with("https://idp.example.com/sso?"));
        assert_eq!(
            query_param(&url, "RelayState").as_deref(),
            Some("https://hub.example.com/hub/acs")
        );

        let xml = inflate(&query_param(&url, "SAMLRequest").unwrap());
        assert!(xml.contains("<samlp:AuthnRequest"));
        assert!(xml.contains(r#"AssertionConsumerServiceURL="https://hub.example.com/hub/acs""#));
        assert!(xml.contains("<saml:Issuer>https://hub.example.com/hub/metadata</saml:Issuer>"));
        assert!(xml.contains("nameid-format:transient"));
    }

    #[test]
    fn test_process_valid_response() {
        let (provider, _dir) = test_provider();
        let xml = saml_response(
            "https://hub.example.com/hub/metadata",
            Utc::now() + Duration::seconds(600),
        );

        let outcome = provider.process_assertion(&posted(&xml));
        assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
        assert!(outcome.authenticated);
        assert_eq!(outcome.name_id, "_nameid123");
        assert_eq!(outcome.session_index, "_session456");
        assert_eq!(outcome.attributes["email"], vec!["user1@example.com"]);
        assert_eq!(outcome.attributes["groups"], vec!["staff", "admins"]);
    }

    #[test]
    fn test_process_wrong_audience() {
        let (provider, _dir) = test_provider();
        let xml = saml_response("https://other.example.com", Utc::now() + Duration::seconds(600));

        let outcome = provider.process_assertion(&posted(&xml));
        assert!(!outcome.authenticated);
        assert!(outcome.errors.iter().any(|e| e.contains("audience")));
    }

    #[test]
    fn test_process_expired_response() {
        let (provider, _dir) = test_provider();
        let xml = saml_response(
            "https://hub.example.com/hub/metadata",
            Utc::now() - Duration::seconds(3600),
        );

        let outcome = provider.process_assertion(&posted(&xml));
        assert!(!outcome.authenticated);
        assert!(outcome.errors.iter().any(|e| e.contains("expired")));
    }

    #[test]
    fn test_process_response_without_status() {
        let (provider, _dir) = test_provider();
        let xml = saml_response(
            "https://hub.example.com/hub/metadata",
            Utc::now() + Duration::seconds(600),
        )
        .replace(
            r#"<samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>"#,
            "",
        );

        let outcome = provider.process_assertion(&posted(&xml));
        assert!(!outcome.authenticated);
        assert!(outcome.errors.iter().any(|e| e.contains("no Status")));
    }

    #[test]
    fn test_signing_requirements_refused_at_load() {
        for flag in ["wantAssertionsSigned", "authnRequestsSigned", "logoutRequestSigned"] {
            let dir = settings_dir();
            let advanced = format!(r#"{{"security": {{"{}": true}}}}"#, flag);
            std::fs::write(dir.path().join("advanced_settings.json"), advanced).unwrap();

            match SamlProvider::from_dir(dir.path()) {
                Err(SettingsError::Invalid(reason)) => assert!(reason.contains(flag)),
                Err(e) => panic!("unexpected error for {}: {}", flag, e),
                Ok(_) => panic!("{} was accepted", flag),
            }
        }
    }

    #[test]
    fn test_reload_refuses_signing_requirements() {
        let (provider, dir) = test_provider();
        std::fs::write(
            dir.path().join("advanced_settings.json"),
            r#"{"security": {"wantAssertionsSigned": true}}"#,
        )
        .unwrap();

        assert!(provider.reload().is_err());
        assert!(!provider.settings().unwrap().advanced.security.want_assertions_signed);
    }

    #[test]
    fn test_unsigned_assertion_rejected_when_signatures_required() {
        let dir = settings_dir();
        let mut settings = SamlSettings::load(dir.path()).unwrap();
        settings.advanced.security.want_assertions_signed = true;
        let provider = SamlProvider {
            settings: RwLock::new(settings),
        };

        let xml = saml_response(
            "https://hub.example.com/hub/metadata",
            Utc::now() + Duration::seconds(600),
        )
        .replace("_nameid123", "forged")
        .replace("user1@example.com", "admin@example.com");

        let outcome = provider.process_assertion(&posted(&xml));
        assert!(!outcome.authenticated);
        assert!(outcome.errors.iter().any(|e| e.contains("signed assertions")));
    }

    #[test]
    fn test_process_missing_response() {
        let (provider, _dir) = test_provider();
        let outcome = provider.process_assertion(&NormalizedRequest::default());
        assert_eq!(outcome.errors.len(), 1);
        assert!(!outcome.authenticated);
    }

    #[test]
    fn test_process_garbage_response() {
        let (provider, _dir) = test_provider();
        let mut fields = HashMap::new();
        fields.insert("SAMLResponse".to_string(), "%%%not-base64".to_string());
        let request = NormalizedRequest {
            fields,
            ..Default::default()
        };

        let outcome = provider.process_assertion(&request);
        assert!(!outcome.errors.is_empty());
        assert!(!outcome.authenticated);
    }

    #[test]
    fn test_logout_request() {
        let (provider, _dir) = test_provider();
        let mut extra = HashMap::new();
        extra.insert("return-to".to_string(), "https://hub.example.com/hub/login".to_string());

        let url = provider
            .logout_redirect(
                &NormalizedRequest::default(),
                &LogoutParams {
                    name_id: "_nameid123".to_string(),
                    session_index: "_session456".to_string(),
                    extra,
                },
            )
            .unwrap();

        assert!(url.starts_with("https://idp.example.com/slo?"));
        assert_eq!(
            query_param(&url, "RelayState").as_deref(),
            Some("https://hub.example.com/hub/login")
        );
        let xml = inflate(&query_param(&url, "SAMLRequest").unwrap());
        assert!(xml.contains("<samlp:LogoutRequest"));
        assert!(xml.contains(">_nameid123</saml:NameID>"));
        assert!(xml.contains("<samlp:SessionIndex>_session456</samlp:SessionIndex>"));
    }

    #[test]
    fn test_logout_request_without_session() {
        let (provider, _dir) = test_provider();
        let url = provider
            .logout_redirect(&NormalizedRequest::default(), &LogoutParams::default())
            .unwrap();

        let xml = inflate(&query_param(&url, "SAMLRequest").unwrap());
        assert!(!xml.contains("SessionIndex"));
        assert!(query_param(&url, "RelayState").is_none());
    }

    #[test]
    fn test_metadata_is_valid() {
        let (provider, _dir) = test_provider();
        let metadata = provider.sp_metadata().unwrap();

        assert!(metadata.contains(r#"entityID="https://hub.example.com/hub/metadata""#));
        assert!(metadata.contains(r#"Location="https://hub.example.com/hub/acs""#));
        assert!(metadata.contains("<md:SingleLogoutService"));
        assert!(metadata.contains(r#"contactType="technical""#));
        assert!(provider.validate_metadata(&metadata).is_empty());
    }

    #[test]
    fn test_validate_metadata_errors() {
        let (provider, _dir) = test_provider();
        let errors = provider.validate_metadata(r#"<md:EntityDescriptor entityID="">"#);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let (provider, dir) = test_provider();
        let updated = crate::saml::settings::tests::SETTINGS_JSON
            .replace("https://idp.example.com/slo", "https://idp.example.com/logout2");
        std::fs::write(dir.path().join("settings.json"), updated).unwrap();

        provider.reload().unwrap();
        assert_eq!(
            provider.idp_slo_url().as_deref(),
            Some("https://idp.example.com/logout2")
        );
    }

    #[test]
    fn test_append_query() {
        assert_eq!(
            append_query("https://idp/sso", &[("a", "1 2")]),
            "https://idp/sso?a=1%202"
        );
        assert_eq!(
            append_query("https://idp/sso?x=y", &[("a", "b"), ("c", "d")]),
            "https://idp/sso?x=y&a=b&c=d"
        );
    }

    #[test]
    fn test_certificate_body() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\nAAAA\n-----END CERTIFICATE-----\n";
        assert_eq!(certificate_body(pem), "MIIBAAAA");
    }
}
