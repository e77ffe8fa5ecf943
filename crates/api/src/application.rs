use std::path::Path;
use std::sync::Arc;

#[cfg(unix)]
use std::fs;

use actix_web::{middleware::Logger, web, App, HttpServer};
use thiserror::Error;
use tracing::info;
use vanish_domain::config::{ApiConfig, ConfigError};
use vanish_domain::services::{
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
    validation::{DohValidator, ValidationError},
};
use vanish_domain::storage::StorageError;
use vanish_storage::SeaOrmStorage;

use crate::{
    handlers::{
        add_domain_handler, authenticity_challenge_handler, get_domain_brand_handler,
        get_domain_handler, get_domain_logo_handler, get_notice_handler, list_domains_handler,
        metrics_handler, post_notice_handler, receive_feedback_handler,
        remove_domain_handler, remove_domain_logo_handler, update_domain_brand_handler,
        update_domain_logo_handler, verify_domain_handler,
    },
    state::AppState,
};

/// Customer-facing routes. `/add` is registered ahead of `/{domain}` so it
/// is never captured as a domain name.
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/v2/account/domains/add",
        web::post().to(add_domain_handler),
    )
    .route("/api/v2/account/domains", web::get().to(list_domains_handler))
    .route(
        "/api/v2/account/domains/{domain}",
        web::get().to(get_domain_handler),
    )
    .route(
        "/api/v2/account/domains/{domain}/verify",
        web::post().to(verify_domain_handler),
    )
    .route(
        "/api/v2/account/domains/{domain}/remove",
        web::post().to(remove_domain_handler),
    )
    .service(
        web::resource("/api/v2/account/domains/{domain}/brand")
            .route(web::get().to(get_domain_brand_handler))
            .route(web::put().to(update_domain_brand_handler)),
    )
    .service(
        web::resource("/api/v2/account/domains/{domain}/logo")
            .route(web::get().to(get_domain_logo_handler))
            .route(web::post().to(update_domain_logo_handler))
            .route(web::delete().to(remove_domain_logo_handler)),
    )
    .route("/api/v2/feedback", web::post().to(receive_feedback_handler))
    .route(
        "/api/v2/authenticity/challenge",
        web::get().to(authenticity_challenge_handler),
    )
    .route("/api/v2/notice", web::get().to(get_notice_handler));
}

/// Operator routes, bound only on the internal listener.
pub fn configure_internal(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/api/v2/notice", web::post().to(post_notice_handler));
}

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let validator = Arc::new(DohValidator::new(config.site().doh_url())?);

    let state = AppState::new(storage, config.site().clone(), validator, telemetry);

    // Without an internal listener metrics fall back to the public one.
    let include_metrics_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(configure_public);

        if include_metrics_on_public {
            app = app.route("/metrics", web::get().to(metrics_handler));
        }

        app
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    info!(address = config.api_bind_address(), "public listener ready");
    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .configure(configure_internal)
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("domain validator error: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Removes a socket file left behind by an unclean shutdown; binding would
/// fail otherwise.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    #[actix_web::test]
    async fn cleanup_socket_removes_stale_file() {
        use super::cleanup_socket;

        let path = std::env::temp_dir().join(format!(
            "vanish-test-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, b"stub").expect("write socket file");
        cleanup_socket(path.to_str().unwrap()).expect("cleanup succeeds");
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn cleanup_socket_ignores_missing_file() {
        use super::cleanup_socket;

        let path = std::env::temp_dir().join(format!("vanish-missing-{}.sock", std::process::id()));
        cleanup_socket(path.to_str().unwrap()).expect("missing file is fine");
    }
}
