//! HTTP client for the model inference sidecar.
//!
//! The sidecar hosts the embedding, classification and price models and
//! exposes one JSON endpoint per operation. Images travel as base64 PNG.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use reqwest::blocking::Client as HttpClient;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solescope_core::{
    Classification, Error, FeatureRow, ImageClassifier, ImageEncoder, PriceRegressor, Result,
    Vector,
};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: &'a str,
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    image: &'a str,
    prompts: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct CompareResponse {
    probabilities: Vec<f32>,
}

#[derive(Deserialize)]
struct PriceResponse {
    price: f64,
}

/// Implements every model contract against one sidecar base URL.
#[derive(Clone)]
pub struct RemoteModels {
    base: Url,
    client: HttpClient,
}

impl RemoteModels {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid model url {}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn call<B: Serialize + ?Sized, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let url = self
            .base
            .join(endpoint)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        debug!(%url, "Model request");

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::Model(format!("{} returned {}: {}", endpoint, status, text)));
        }
        response.json().map_err(|e| transport_error(endpoint, e))
    }
}

fn transport_error(endpoint: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("model endpoint {}", endpoint))
    } else {
        Error::Model(format!("{}: {}", endpoint, e))
    }
}

/// PNG-encode and base64 an image for transport.
pub fn encode_image(image: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(STANDARD.encode(buf.into_inner()))
}

impl ImageEncoder for RemoteModels {
    fn embed(&self, image: &DynamicImage) -> Result<Vector> {
        let encoded = encode_image(image)?;
        let response: EmbedResponse = self.call("embed", &ImageRequest { image: &encoded })?;
        if response.embedding.is_empty() {
            return Err(Error::Model("empty embedding".to_string()));
        }
        Ok(Vector::new(response.embedding))
    }

    fn compare_texts(&self, image: &DynamicImage, prompts: &[&str]) -> Result<Vec<f32>> {
        let encoded = encode_image(image)?;
        let response: CompareResponse = self.call(
            "compare",
            &CompareRequest {
                image: &encoded,
                prompts,
            },
        )?;
        Ok(response.probabilities)
    }
}

impl ImageClassifier for RemoteModels {
    fn classify(&self, image: &DynamicImage) -> Result<Classification> {
        let encoded = encode_image(image)?;
        let classification: Classification =
            self.call("classify", &ImageRequest { image: &encoded })?;
        if !(0.0..=1.0).contains(&classification.confidence) {
            return Err(Error::Model(format!(
                "confidence out of range: {}",
                classification.confidence
            )));
        }
        Ok(classification)
    }
}

impl PriceRegressor for RemoteModels {
    fn predict(&self, features: &FeatureRow) -> Result<f64> {
        let response: PriceResponse = self.call("price", features)?;
        if !response.price.is_finite() {
            return Err(Error::Model("non-finite price".to_string()));
        }
        Ok(response.price)
    }
}
