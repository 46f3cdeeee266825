use std::any::Any;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use recipe_api::{decode_draft, DeleteResult, RecipeApi, SearchQuery};
use recipe_core::{Recipe, RecipeError};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");
const NOT_FOUND_MESSAGE: &str = "Recipe not found";
const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug, Clone)]
struct ServiceState {
    api: RecipeApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "recipes-service")]
#[command(about = "HTTP service for the recipes collection")]
struct Args {
    /// JSON array of recipes loaded into the collection at startup.
    #[arg(long, env = "RECIPES_DATASET")]
    dataset: Option<PathBuf>,
    #[arg(long, env = "RECIPES_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,
    /// Fallback log filter when `RUST_LOG` is unset.
    #[arg(long, env = "RECIPES_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, error: message.into() }
    }
}

impl From<RecipeError> for ServiceError {
    fn from(err: RecipeError) -> Self {
        match err {
            RecipeError::Validation(message) => Self::new(StatusCode::BAD_REQUEST, message),
            RecipeError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE),
            RecipeError::IdExhausted => {
                tracing::error!("Recipe operation failed: {err}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

fn app(state: ServiceState) -> Router {
    let routes = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/openapi", get(openapi))
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/search", get(search_recipes))
        .route("/recipes/:id", get(get_recipe).put(update_recipe).delete(delete_recipe))
        .fallback(route_not_found);
    with_service_layers(routes).with_state(state)
}

/// Panic recovery and request tracing shared by every route.
fn with_service_layers(routes: Router<ServiceState>) -> Router<ServiceState> {
    routes.layer(CatchPanicLayer::custom(handle_panic)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level);
    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!("Ignoring unreadable .env file: {err}"),
    }

    tracing::info!("Initializing recipes service");
    let state = ServiceState { api: RecipeApi::from_dataset(args.dataset.as_deref())? };

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!("Recipes service listening on {}", args.bind);
    axum::serve(listener, app(state)).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("Recipes service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    tracing::error!(detail, "Request handler panicked");
    ServiceError::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE).into_response()
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn route_not_found() -> ServiceError {
    ServiceError::new(StatusCode::NOT_FOUND, "route not found")
}

async fn create_recipe(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<Json<Recipe>, ServiceError> {
    let draft = decode_draft(&body)?;
    let recipe = state.api.create_recipe(draft)?;
    Ok(Json(recipe))
}

async fn list_recipes(State(state): State<ServiceState>) -> Json<Vec<Recipe>> {
    Json(state.api.list_recipes())
}

async fn get_recipe(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, ServiceError> {
    let recipe = state.api.get_recipe(&id)?;
    Ok(Json(recipe))
}

async fn update_recipe(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Recipe>, ServiceError> {
    let replacement = decode_draft(&body)?;
    let recipe = state.api.update_recipe(&id, replacement)?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResult>, ServiceError> {
    let result = state.api.delete_recipe(&id)?;
    Ok(Json(result))
}

async fn search_recipes(
    State(state): State<ServiceState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Recipe>> {
    tracing::info!(tag = %query.tag, "Searching recipes by tag");
    Json(state.api.search_recipes(&query))
}
