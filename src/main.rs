use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use hemogram_core::{constants::DEFAULT_LAB_DATA_DIR, environment_from_env_value, CoreConfig};

/// Main entry point for the hemogram service
///
/// Resolves configuration once and serves the REST API.
///
/// # Environment Variables
/// - `HEMOGRAM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `LAB_DATA_DIR`: Directory for sample storage (default: "lab_data"), created if absent
/// - `LAB_CONFIG`: Deployment profile: development, testing or production
/// - `API_KEY`: API key required on every request except health and docs
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = environment_from_env_value(std::env::var("LAB_CONFIG").ok())?;
    let level = environment.default_log_level();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("hemogram={level}").parse()?)
                .add_directive(format!("api_rest={level}").parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_key = std::env::var("API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        anyhow::bail!("API_KEY must be set to a non-empty value");
    }

    let lab_data_dir = PathBuf::from(
        std::env::var("LAB_DATA_DIR").unwrap_or_else(|_| DEFAULT_LAB_DATA_DIR.into()),
    );
    std::fs::create_dir_all(&lab_data_dir)
        .with_context(|| format!("failed to create {}", lab_data_dir.display()))?;

    let cfg = Arc::new(CoreConfig::new(lab_data_dir, environment)?);
    let rest_addr = std::env::var("HEMOGRAM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!(
        environment = %environment,
        data_dir = %cfg.lab_data_dir().display(),
        "++ Starting hemogram REST on {}",
        rest_addr
    );

    let app = api_rest::router(AppState::new(cfg, api_key));
    let listener = tokio::net::TcpListener::bind(&rest_addr)
        .await
        .with_context(|| format!("failed to bind {rest_addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
