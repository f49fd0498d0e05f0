//! TensorFlow-Serving REST vectorizer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Vectorizer;
use crate::error::{Error, Result};

/// Client for a TF-Serving style embedding endpoint.
pub struct TfServingVectorizer {
    client: Client,
    url: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    inputs: PredictInputs<'a>,
}

#[derive(Serialize)]
struct PredictInputs<'a> {
    text: Vec<&'a str>,
}

#[derive(Deserialize)]
struct PredictResponse {
    outputs: serde_json::Value,
}

impl TfServingVectorizer {
    pub fn new(url: &str, model: &str, dimensions: usize) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        }
    }

    fn predict_url(&self) -> String {
        format!("{}/v1/models/{}:predict", self.url, self.model)
    }
}

#[async_trait]
impl Vectorizer for TfServingVectorizer {
    async fn vectorize(&self, text: &str) -> Result<Vec<f32>> {
        let request = PredictRequest {
            inputs: PredictInputs { text: vec![text] },
        };

        let response = self
            .client
            .post(self.predict_url())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Vectorizer(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: PredictResponse = response.json().await?;
        let vector = parse_outputs(&parsed.outputs)?;
        if self.dimensions != 0 && vector.len() != self.dimensions {
            return Err(Error::Vectorizer(format!(
                "embedding service returned {} dims, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Flatten the service's `outputs` field to one f32 vector. A one-element
/// batch comes back nested (`[[…]]`); some models return the row directly.
fn parse_outputs(outputs: &serde_json::Value) -> Result<Vec<f32>> {
    let rows = outputs
        .as_array()
        .ok_or_else(|| Error::Vectorizer("outputs is not an array".into()))?;
    let row = match rows.first() {
        None => return Err(Error::Vectorizer("empty outputs".into())),
        Some(serde_json::Value::Array(inner)) => inner,
        Some(_) => rows,
    };
    row.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::Vectorizer(format!("non-numeric output: {v}")))
        })
        .collect()
}
