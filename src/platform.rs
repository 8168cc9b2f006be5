//! Host platform seam.
//!
//! After a successful assertion the platform materializes its own user session
//! (cookies, spawner state). On logout it tells the controller whose session
//! is being closed.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// Result of a successful platform login.
#[derive(Debug, Clone)]
pub struct PlatformLogin {
    /// Where to send the browser afterwards.
    pub next_url: String,
    /// `Set-Cookie` values establishing the platform session.
    pub set_cookies: Vec<String>,
}

/// The host platform's user-session lifecycle.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create a session for `username`; `Ok(None)` when the platform refuses.
    async fn login_user(&self, username: &str) -> Result<Option<PlatformLogin>>;

    /// Username owning the session named by the request's `Cookie` header.
    async fn session_user(&self, cookie_header: &str) -> Option<String>;

    /// Drop the platform session named by the `Cookie` header; returns the
    /// `Set-Cookie` values that clear it.
    async fn end_session(&self, cookie_header: &str) -> Vec<String>;
}

/// Find a cookie value in a `Cookie` header.
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn clear_cookie(name: &str, path: &str) -> String {
    format!(
        "{}=; Path={}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        name, path
    )
}

/// In-process platform used by the standalone binary: random session ids in
/// a cookie, session id → username in memory.
pub struct LocalPlatform {
    cookie_name: String,
    cookie_secure: bool,
    post_login_url: String,
    /// Empty means everyone may log in.
    allowed_users: Vec<String>,
    sessions: RwLock<HashMap<String, String>>,
}

impl LocalPlatform {
    pub fn new(cookie_name: String, post_login_url: String) -> Self {
        Self {
            cookie_name,
            cookie_secure: false,
            post_login_url,
            allowed_users: Vec::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Only let these users in.
    pub fn with_allowed_users(mut self, users: Vec<String>) -> Self {
        self.allowed_users = users;
        self
    }

    /// Mark the session cookie `Secure`.
    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    fn build_cookie(&self, session_id: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, session_id
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Number of live platform sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Platform for LocalPlatform {
    async fn login_user(&self, username: &str) -> Result<Option<PlatformLogin>> {
        if !self.allowed_users.is_empty() && !self.allowed_users.iter().any(|u| u == username) {
            info!(username = %username, "User is not in the allowed list");
            return Ok(None);
        }

        let session_id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions
            .write()
            .map_err(|_| anyhow!("Platform session lock poisoned"))?
            .insert(session_id.clone(), username.to_string());

        debug!(username = %username, "Platform session created");

        Ok(Some(PlatformLogin {
            next_url: self.post_login_url.clone(),
            set_cookies: vec![self.build_cookie(&session_id)],
        }))
    }

    async fn session_user(&self, cookie_header: &str) -> Option<String> {
        let session_id = cookie_value(cookie_header, &self.cookie_name)?;
        self.sessions.read().ok()?.get(session_id).cloned()
    }

    async fn end_session(&self, cookie_header: &str) -> Vec<String> {
        if let Some(session_id) = cookie_value(cookie_header, &self.cookie_name) {
            if let Ok(mut sessions) = self.sessions.write() {
                sessions.remove(session_id);
            }
        }
        vec![clear_cookie(&self.cookie_name, "/")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> LocalPlatform {
        LocalPlatform::new("hub-session-id".to_string(), "/hub/home".to_string())
    }

    #[test]
    fn test_cookie_value() {
        let header = "other=value; hub-session-id=abc123; another=test";
        assert_eq!(cookie_value(header, "hub-session-id"), Some("abc123"));
        assert_eq!(cookie_value(header, "missing"), None);
        assert_eq!(cookie_value("", "hub-session-id"), None);
    }

    #[test]
    fn test_clear_cookie() {
        let cookie = clear_cookie("PHPSESSIDIDP", "/");
        assert!(cookie.starts_with("PHPSESSIDIDP=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_login_and_resolve() {
        let platform = platform();
        let login = platform.login_user("user1").await.unwrap().unwrap();
        assert_eq!(login.next_url, "/hub/home");
        assert_eq!(login.set_cookies.len(), 1);

        let cookie = login.set_cookies[0].split(';').next().unwrap().to_string();
        assert_eq!(platform.session_user(&cookie).await.as_deref(), Some("user1"));

        let cleared = platform.end_session(&cookie).await;
        assert_eq!(cleared.len(), 1);
        assert_eq!(platform.session_user(&cookie).await, None);
        assert_eq!(platform.session_count(), 0);
    }

    #[tokio::test]
    async fn test_allowed_users() {
        let platform = platform().with_allowed_users(vec!["user1".to_string()]);
        assert!(platform.login_user("user1").await.unwrap().is_some());
        assert!(platform.login_user("intruder").await.unwrap().is_none());
    }

    #[test]
    fn test_secure_cookie() {
        let platform = platform().with_secure_cookie(true);
        assert!(platform.build_cookie("x").ends_with("; Secure"));
    }
}
