use crate::ads_client::AdsConnector;
use crate::config::Config;
use crate::runner::Ingestion;
use crate::secrets::SecretProvider;
use crate::storage::BlobStore;
use axum::{extract::State, http::StatusCode, Router};
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

/// Everything a triggered run needs, built once at startup.
pub struct AppState {
    pub config: Config,
    pub secrets: Box<dyn SecretProvider>,
    pub ads: Box<dyn AdsConnector>,
    pub store: Box<dyn BlobStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    // Any method on any path starts a run.
    Router::new().fallback(trigger).with_state(state)
}

async fn trigger(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    let result = Ingestion::new(
        &state.config,
        state.secrets.as_ref(),
        state.ads.as_ref(),
        state.store.as_ref(),
    )
    .run()
    .await;

    let status =
        StatusCode::from_u16(result.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, result.message())
}

pub async fn serve(state: AppState, port: u16) -> Result<(), crate::error::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(Arc::new(state))).await?;

    Ok(())
}
