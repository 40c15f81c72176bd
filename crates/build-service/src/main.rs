//! Build Service
//!
//! REST API that runs circuit builds against blob storage

use anyhow::{Context, Result};
use build_service::{create_router, AppState};
use forge_pipeline::{
    BackendRegistry, Orchestrator, OrchestratorConfig, S3BlobStore,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "build_service=debug,forge_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration
    let bucket = env::var("BLOB_BUCKET")
        .context("BLOB_BUCKET must be set")?;
    let endpoint = env::var("BLOB_ENDPOINT").ok();
    let host = env::var("BUILD_HOST")
        .unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("BUILD_PORT")
        .unwrap_or_else(|_| "8085".to_string());
    let build_dir = env::var("BUILD_DIR")
        .unwrap_or_else(|_| "/tmp/builds".to_string());
    let ptau_cache_dir = env::var("PTAU_CACHE_DIR")
        .unwrap_or_else(|_| "/tmp/ptau".to_string());
    let tool_dir = env::var("TOOL_DIR").ok().map(PathBuf::from);

    info!("Starting Build Service");
    info!("Blob bucket: {}", bucket);
    info!("Build directory: {}", build_dir);
    info!("PTAU cache: {}", ptau_cache_dir);

    // Ensure working directories exist
    std::fs::create_dir_all(&build_dir)
        .context("Failed to create build directory")?;
    std::fs::create_dir_all(&ptau_cache_dir)
        .context("Failed to create PTAU cache directory")?;

    // Connect blob storage
    let store = Arc::new(S3BlobStore::connect(bucket, endpoint).await);

    // Create application state
    let orchestrator = Orchestrator::new(
        store,
        BackendRegistry::with_cli_backends(tool_dir.as_deref()),
        OrchestratorConfig {
            build_dir: PathBuf::from(build_dir),
            ptau_cache_dir: PathBuf::from(ptau_cache_dir),
            tool_dir,
        },
    );
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    // Create router
    let app = create_router(state);

    // Start API server
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Build Service API running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
