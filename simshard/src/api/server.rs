use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::routes::{self, SearchDefaults};
use crate::error::Result;
use crate::query::QueryProcessor;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<QueryProcessor>,
    pub defaults: SearchDefaults,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(processor: Arc<QueryProcessor>, defaults: SearchDefaults) -> Self {
        Self {
            state: AppState {
                processor,
                defaults,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/query", post(routes::query))
            .route("/shards", post(routes::add_shard).get(routes::list_shards))
            .route("/health", get(routes::health))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub async fn serve(&self, bind_addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        tracing::info!("listening on {bind_addr}");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
