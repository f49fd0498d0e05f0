//! Query vectorization through an external embedding service.

pub mod tf_serving;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::DEFAULT_DIM;

/// Configuration for query vectorizers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VectorizerConfig {
    /// TensorFlow-Serving style REST endpoint
    /// (`POST {url}/v1/models/{model}:predict`).
    TfServing {
        url: String,
        model: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
}

fn default_dimension() -> usize {
    DEFAULT_DIM
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self::TfServing {
            url: "http://localhost:8501".to_string(),
            model: "USE-lite-v2".to_string(),
            dimension: DEFAULT_DIM,
        }
    }
}

/// Trait for query vectorizers.
#[async_trait]
pub trait Vectorizer: Send + Sync {
    /// Embed one query string into a `1×D` vector.
    async fn vectorize(&self, text: &str) -> Result<Vec<f32>>;

    /// Model name, used for logging.
    fn model_name(&self) -> &str;

    /// Embedding dimension this vectorizer produces.
    fn dimensions(&self) -> usize;
}

/// Build a vectorizer from configuration.
pub fn create_vectorizer(config: &VectorizerConfig) -> Arc<dyn Vectorizer> {
    match config {
        VectorizerConfig::TfServing {
            url,
            model,
            dimension,
        } => Arc::new(tf_serving::TfServingVectorizer::new(url, model, *dimension)),
    }
}
