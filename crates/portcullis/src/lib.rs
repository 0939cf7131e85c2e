use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use portcullis_auth::fs_backend::FsAuthStore;
use portcullis_auth::saml::SamlSettings;
use std::fs::read_to_string;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub mod cli;
mod config;

/// Binds the listener and returns the server future, so callers know the port is taken once this returns.
pub async fn start_listening(args: cli::PortcullisArgs) -> anyhow::Result<impl Future<Output = anyhow::Result<()>>> {
    let config: config::Config = serde_yaml::from_str(
        &read_to_string(&args.config).context("Failed to read config file from disk, is it present?")?,
    )
    .context("Failed to deserialize config file, please make sure its in the right format")?;

    let config::Config {
        service,
        saml_path,
        auth_config,
    } = config;

    PrometheusBuilder::new()
        .with_http_listener(service.metrics_address)
        .set_buckets(&[
            100e-6, 500e-6, 1e-3, 5e-3, 1e-2, 5e-2, 1e-1, 2e-1, 3e-1, 4e-1, 5e-1, 6e-1, 7e-1, 8e-1, 9e-1, 1.0, 5.0,
            10.0,
        ])
        .context("Failed to set buckets for prometheus")?
        .install()
        .context("Failed to install prometheus exporter")?;

    let addr = service.address;

    let store = Arc::new(FsAuthStore::new(auth_config).context("Failed to initialize auth store")?);

    let saml_path = args.saml.saml_path.or(saml_path);
    let saml = SamlSettings::load_optional(saml_path.as_deref());

    let router = portcullis_server::router(service, Arc::clone(&store), store, saml)
        .context("Failed to set up the HTTP service")?;

    tracing::info!(?addr, "Starting portcullis");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;

    Ok(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Portcullis server exited with error")?;

        tracing::info!("Completed graceful shutdown");

        Ok(())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, beginning graceful shutdown");
}
