//! Campaign Microsite Portal Backend
//!
//! A production-grade REST backend managing artist campaign microsites:
//! content and asset administration, static-site generation and deployment
//! orchestration against an external hosting provider.

mod api;
mod auth;
mod config;
mod db;
mod deploy;
mod errors;
mod generator;
mod models;
mod storage;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use deploy::{DeployService, HostingClient};
use storage::BlobStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub storage: Arc<BlobStore>,
    pub deploy: Arc<DeployService>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Campaign Microsite Portal Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Templates dir: {:?}", config.templates_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if the admin key is not configured
    if config.admin_api_key.is_none() {
        tracing::warn!("No admin API key configured (PORTAL_ADMIN_API_KEY). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    // External providers
    let storage = BlobStore::new(
        &config.blob_store_url,
        &config.blob_store_token,
        &config.upload_token_secret,
    );
    let hosting = HostingClient::new(&config.hosting_api_url, &config.hosting_api_token);
    let deploy = DeployService::new(repo.clone(), hosting, config.templates_dir.clone());

    // Create application state
    let state = AppState {
        repo: Arc::new(repo),
        storage: Arc::new(storage),
        deploy: Arc::new(deploy),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone the admin key for the auth layer
    let admin_key = state.config.admin_api_key.clone();

    // Admin API routes; the deployment webhook is appended after the auth
    // layer because the provider cannot send credentials.
    let api_routes = Router::new()
        // Sites
        .route("/sites", get(api::list_sites))
        .route("/sites", post(api::create_site))
        .route("/sites/{id}", get(api::get_site))
        .route("/sites/{id}", patch(api::update_site))
        .route("/sites/{id}", delete(api::delete_site))
        // Content
        .route("/sites/{id}/content", get(api::list_content))
        .route("/sites/{id}/content", post(api::create_content))
        .route("/content/{id}", get(api::get_content))
        .route("/content/{id}", patch(api::update_content))
        .route("/content/{id}", delete(api::delete_content))
        // Assets
        .route("/sites/{id}/assets", get(api::list_assets))
        .route("/sites/{id}/assets/upload", post(api::upload_asset))
        .route("/sites/{id}/assets/upload-token", post(api::issue_upload_token))
        .route("/assets/upload-complete", post(api::complete_upload))
        .route("/assets/{id}", get(api::get_asset))
        .route("/assets/{id}", delete(api::delete_asset))
        // Card manifests
        .route("/sites/{id}/cards", get(api::list_cards))
        .route("/sites/{id}/cards", post(api::create_card))
        .route("/cards/{id}", get(api::get_card))
        .route("/cards/{id}", patch(api::update_card))
        .route("/cards/{id}", delete(api::delete_card))
        // Templates
        .route("/templates", get(api::list_templates))
        .route("/templates", post(api::create_template))
        .route("/templates/{id}", get(api::get_template))
        .route("/templates/{id}", patch(api::update_template))
        .route("/templates/{id}", delete(api::delete_template))
        // Deployment
        .route("/sites/{id}/deploy", post(api::deploy_site))
        .route("/sites/{id}/deployment", get(api::deployment_status))
        // Points
        .route("/points/rules", get(api::list_point_rules))
        .route("/points/rules", post(api::create_point_rule))
        .route("/points/rules/{id}", get(api::get_point_rule))
        .route("/points/rules/{id}", patch(api::update_point_rule))
        .route("/points/rules/{id}", delete(api::delete_point_rule))
        .route("/points/transactions", get(api::list_point_transactions))
        .route("/points/transactions", post(api::create_point_transaction))
        // Events
        .route("/events", get(api::list_events))
        .route("/events", post(api::create_event))
        .route("/events/{id}", get(api::get_event))
        .route("/events/{id}", patch(api::update_event))
        .route("/events/{id}", delete(api::delete_event))
        .route("/events/{id}/checkin", post(api::check_in))
        .route("/events/{id}/checkins", get(api::list_checkins))
        // Apply admin auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::admin_auth_layer(admin_key.clone(), req, next)
        }))
        // Webhook stays outside the auth layer
        .route("/webhooks/deployment", post(api::deployment_webhook));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
