//! Normalizes inbound HTTP requests into the shape the SAML engine reads.

use std::collections::HashMap;

/// Environment toggle that forces HTTPS detection on, for deployments behind
/// a TLS-terminating proxy. Any non-empty value enables it.
pub const HTTPS_OVERRIDE_ENV: &str = "SAML_HTTPS_OVERRIDE";

/// Transport-level view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// Whether the connection itself was TLS.
    pub tls: bool,
    /// Host header value, possibly with a port.
    pub host: String,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// URL-encoded form body.
    pub body: Option<String>,
}

/// The request as the SAML engine sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub https: bool,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query_string: String,
    /// Form and query fields, first value only; form fields win over query fields.
    pub fields: HashMap<String, String>,
}

impl NormalizedRequest {
    /// A single field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// `scheme://host[:port]` of the request.
    pub fn origin(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{}://{}:{}", scheme, self.host, port),
            None => format!("{}://{}", scheme, self.host),
        }
    }
}

/// Converts raw requests, applying the configured HTTPS overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestAdapter {
    /// Set from [`HTTPS_OVERRIDE_ENV`].
    env_override: bool,
    /// Set from deployment configuration.
    https_override: bool,
}

impl RequestAdapter {
    pub fn new(env_override: bool, https_override: bool) -> Self {
        Self {
            env_override,
            https_override,
        }
    }

    /// Read the environment toggle once and combine it with the configured flag.
    pub fn from_env(https_override: bool) -> Self {
        let env_override = std::env::var(HTTPS_OVERRIDE_ENV)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        Self::new(env_override, https_override)
    }

    /// Build the engine-facing request.
    pub fn normalize(&self, raw: &RawRequest) -> NormalizedRequest {
        let https = raw.tls || self.env_override || self.https_override;
        let (host, port) = split_host_and_port(&raw.host);

        let mut fields = HashMap::new();
        for (name, value) in raw
            .body
            .as_deref()
            .map(parse_form)
            .unwrap_or_default()
            .into_iter()
            .chain(raw.query.as_deref().map(parse_form).unwrap_or_default())
        {
            fields.entry(name).or_insert(value);
        }

        NormalizedRequest {
            https,
            host,
            port,
            path: raw.path.clone(),
            query_string: raw.query.clone().unwrap_or_default(),
            fields,
        }
    }
}

/// Split `host[:port]`, including bracketed IPv6 literals.
pub fn split_host_and_port(netloc: &str) -> (String, Option<u16>) {
    if let Some((host, port)) = netloc.rsplit_once(':') {
        let bracketed_or_plain = !host.contains(':') || (host.starts_with('[') && host.ends_with(']'));
        if bracketed_or_plain {
            if let Ok(port) = port.parse::<u16>() {
                return (host.to_string(), Some(port));
            }
        }
    }
    (netloc.to_string(), None)
}

/// Parse `application/x-www-form-urlencoded` pairs in order.
pub fn parse_form(encoded: &str) -> Vec<(String, String)> {
    encoded
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
