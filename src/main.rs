use anyhow::Context;
use dotenvy::dotenv;
use image_convert_backend::config::{AppConfig, DeliveryMode};
use image_convert_backend::infrastructure::storage;
use image_convert_backend::services::converter::Converter;
use image_convert_backend::services::publisher::Publisher;
use image_convert_backend::services::workspace::Workspace;
use image_convert_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_convert_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Image Convert Backend...");

    let config = AppConfig::from_env()?;

    // No request can be served without the scratch directory.
    let workspace =
        Arc::new(Workspace::create().context("failed to create workspace directory")?);
    info!("📂 Workspace: {}", workspace.root().display());

    let converter = Arc::new(Converter::new(config.convert_command.clone()));

    let publisher = match &config.delivery_mode {
        DeliveryMode::Inline => {
            info!("📦 Delivery: inline response");
            Arc::new(Publisher::inline())
        }
        DeliveryMode::S3(s3) => {
            let client = storage::setup_storage(s3).await;
            Arc::new(Publisher::storage(
                client,
                s3.bucket.clone(),
                s3.region.clone(),
            ))
        }
    };

    info!(
        "🛡️  Config: Max Upload={}MB, Mode={}, Tool={}",
        config.max_upload_size / 1024 / 1024,
        config.delivery_mode.as_str(),
        config.convert_command
    );

    let state = AppState {
        workspace,
        converter,
        publisher,
        config: config.clone(),
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server listening on: http://0.0.0.0:{}", config.port);
    info!(
        "📖 Swagger UI documentation: http://localhost:{}/swagger-ui",
        config.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
