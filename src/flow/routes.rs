//! HTTP surface for the SAML handlers.

use axum::{
    extract::{OriginalUri, State},
    http::{
        header::{CONTENT_TYPE, COOKIE, HOST, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{FlowController, Metadata, RedirectKind};
use crate::platform::clear_cookie;
use crate::saml::RawRequest;

/// Build the router for the login, metadata, ACS and logout handlers,
/// mounted under the controller's base path.
pub fn routes(controller: Arc<FlowController>) -> Router {
    let base_path = controller
        .config()
        .base_path
        .trim_end_matches('/')
        .to_string();

    let handlers = Router::new()
        .route("/saml_login", get(login))
        .route("/metadata", get(metadata))
        .route("/acs", post(acs))
        .route("/logout", get(logout))
        .with_state(controller);

    if base_path.is_empty() {
        handlers
    } else {
        Router::new().nest(&base_path, handlers)
    }
}

async fn login(
    State(controller): State<Arc<FlowController>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let raw = raw_request(&uri, &headers, None);
    match controller.login(&raw) {
        Ok(url) => redirect(StatusCode::FOUND, &url, &[]),
        Err(e) => e.into_response(),
    }
}

async fn metadata(State(controller): State<Arc<FlowController>>) -> Response {
    match controller.metadata() {
        Ok(Metadata::Valid(xml)) => ([(CONTENT_TYPE, "text/xml")], xml).into_response(),
        Ok(Metadata::Invalid(errors)) => {
            ([(CONTENT_TYPE, "text/plain")], errors.join(", ")).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn acs(
    State(controller): State<Arc<FlowController>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let raw = raw_request(&uri, &headers, Some(body));
    match controller.consume_assertion(&raw).await {
        Ok(success) => redirect(
            StatusCode::FOUND,
            &success.login.next_url,
            &success.login.set_cookies,
        ),
        Err(e) => e.into_response(),
    }
}

async fn logout(
    State(controller): State<Arc<FlowController>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let raw = raw_request(&uri, &headers, None);
    let cookie_header = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let platform = controller.platform();
    let outcome = match platform.session_user(cookie_header).await {
        Some(username) => controller.logout(&raw, &username).await,
        None => {
            debug!("Logout without a platform session");
            controller.cookies_only()
        }
    };

    let mut set_cookies = platform.end_session(cookie_header).await;
    set_cookies.extend(
        outcome
            .cleared_cookies
            .iter()
            .map(|name| clear_cookie(name, "/")),
    );

    match outcome.redirect {
        Some(target) => {
            let status = match target.kind {
                RedirectKind::Temporary => StatusCode::TEMPORARY_REDIRECT,
                RedirectKind::Found => StatusCode::FOUND,
            };
            redirect(status, &target.location, &set_cookies)
        }
        None => {
            let mut response = (StatusCode::OK, "Logged out").into_response();
            append_cookies(response.headers_mut(), &set_cookies);
            response
        }
    }
}

fn raw_request(uri: &Uri, headers: &HeaderMap, body: Option<String>) -> RawRequest {
    let forwarded_https = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    RawRequest {
        tls: uri.scheme_str() == Some("https") || forwarded_https,
        host,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
    }
}

/// Redirect with an explicit status; axum's `Redirect` helpers only offer 303/307/308.
fn redirect(status: StatusCode, location: &str, set_cookies: &[String]) -> Response {
    let location = match HeaderValue::from_str(location) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Redirect target is not a valid header value");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = status.into_response();
    response.headers_mut().insert(LOCATION, location);
    append_cookies(response.headers_mut(), set_cookies);
    response
}

fn append_cookies(headers: &mut HeaderMap, set_cookies: &[String]) {
    for cookie in set_cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => error!(error = %e, "Dropping invalid Set-Cookie value"),
        }
    }
}
