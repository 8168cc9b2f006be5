//! Hub SAML Authenticator
//!
//! Serves the SAML login, ACS, logout and metadata endpoints for a hub,
//! with the SAML session cache selected by configuration.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use hub_saml_auth::{
    routes, CacheRegistry, FlowController, HubAuthConfig, LocalPlatform, Overrides,
    RequestAdapter, SamlProvider,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "hub-saml-auth")]
#[command(about = "SAML2 single sign-on and single logout for multi-user hubs")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000", env = "HUB_SAML_LISTEN")]
    listen: SocketAddr,

    /// JSON configuration file
    #[arg(long, env = "HUB_SAML_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding settings.json and advanced_settings.json
    #[arg(long, env = "SAML_SETTINGS_PATH")]
    saml_settings_path: Option<PathBuf>,

    /// Treat every request as HTTPS (TLS terminated upstream)
    #[arg(long, env = "HUB_SAML_HTTPS_OVERRIDE")]
    https_override: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "HUB_SAML_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .init();

    info!("Starting Hub SAML Authenticator");

    let config = HubAuthConfig::load(
        args.config.as_deref(),
        Overrides {
            saml_settings_path: args.saml_settings_path,
            https_override: args.https_override,
        },
    )?;

    let cache_spec = config.cache.clone().with_env_fallback();
    let caches = CacheRegistry::from_spec(&cache_spec).context("Failed to create session cache")?;

    let provider = Arc::new(
        SamlProvider::from_dir(&config.saml_settings_path)
            .context("Failed to load SAML settings")?,
    );

    let adapter = RequestAdapter::from_env(config.https_override);
    let platform = LocalPlatform::new(config.platform_cookie_name.clone(), config.post_login_url())
        .with_secure_cookie(config.https_override);

    info!(
        settings_path = ?config.saml_settings_path,
        base_path = %config.base_path(),
        cache = %cache_spec.cache_type,
        idp_logout = config.idp_logout,
        unencrypted_logout = config.unencrypted_logout,
        session_cookies = config.session_cookie_names.len(),
        "Configuration loaded"
    );

    #[cfg(unix)]
    reload_on_hangup(Arc::clone(&provider))?;

    let controller = Arc::new(FlowController::new(
        provider,
        Arc::new(caches),
        Arc::new(config.username.clone()),
        Arc::new(platform),
        adapter,
        config.flow_config(),
    ));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;

    info!(listen = %args.listen, "Serving SAML endpoints");
    axum::serve(listener, routes(controller))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

/// Re-read the SAML settings directory on SIGHUP.
#[cfg(unix)]
fn reload_on_hangup(provider: Arc<SamlProvider>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(e) = provider.reload() {
                warn!(error = %e, "Failed to reload SAML settings, keeping previous settings");
            }
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
