use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use concept_resolver::{Disambiguator, ResolutionEngine, TerminologyService, build_engine};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::lookup::lookup;

/// One engine per process; the mutex serialises resolutions so cache updates never interleave.
struct AppState<T, D> {
    engine: Arc<Mutex<ResolutionEngine<T, D>>>,
    browser_edition: Arc<str>,
}

impl<T, D> Clone for AppState<T, D> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            browser_edition: Arc::clone(&self.browser_edition),
        }
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let config = opts.resolver.clone().into_config();
    let engine = build_engine(&config).context("build resolution engine")?;

    let app = router(engine, &opts.browser_edition);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router<T, D>(engine: ResolutionEngine<T, D>, browser_edition: &str) -> Router
where
    T: TerminologyService + 'static,
    D: Disambiguator + 'static,
{
    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        browser_edition: Arc::from(browser_edition),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/get_snomed_code", post(api_get_snomed_code::<T, D>))
        .route("/health", get(api_health::<T, D>))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DiagnosisRequest {
    #[serde(default)]
    diagnosis_type: String,
    diagnostic_term: String,
}

async fn api_get_snomed_code<T, D>(
    State(st): State<AppState<T, D>>,
    Json(req): Json<DiagnosisRequest>,
) -> Response
where
    T: TerminologyService + 'static,
    D: Disambiguator + 'static,
{
    let term = req.diagnostic_term.trim();
    if term.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "diagnostic_term must not be empty".to_string(),
        )
            .into_response();
    }

    tracing::info!(diagnosis_type = %req.diagnosis_type, term, "lookup");
    let mut engine = st.engine.lock().await;
    let response = lookup(&mut engine, term, &st.browser_edition).await;
    Json(response).into_response()
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    cache_entries: usize,
}

async fn api_health<T, D>(State(st): State<AppState<T, D>>) -> impl IntoResponse
where
    T: TerminologyService + 'static,
    D: Disambiguator + 'static,
{
    let engine = st.engine.lock().await;
    Json(HealthResponse {
        status: "ok",
        cache_entries: engine.cache().len(),
    })
}
