// src/core/engine/mod.rs

//! The image processing contract and the HTTP engine client.
//!
//! The transform kernels themselves live in an external processing service;
//! the gateway only coordinates around them.

use crate::core::deadline::Deadline;
use crate::core::errors::GatewayError;
use crate::core::object::Transform;
use crate::core::response::Response;
use async_trait::async_trait;
use http::header;
use tracing::debug;
use url::Url;

/// Header carrying the serialized transform chain to the engine service.
pub const TRANSFORMS_HEADER: &str = "x-pixelgate-transforms";

/// Applies an ordered transform chain to an input image.
///
/// Implementations consume the input stream exactly once.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    async fn process(
        &self,
        input: Response,
        transforms: &[Transform],
        deadline: Deadline,
    ) -> Result<Response, GatewayError>;
}

/// Delegates processing to a remote engine service over HTTP.
///
/// The input bytes are POSTed as the request body with the chain in a JSON
/// header; the service answers with the transformed bytes.
pub struct HttpImageEngine {
    url: Url,
    client: reqwest::Client,
}

impl HttpImageEngine {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ImageEngine for HttpImageEngine {
    async fn process(
        &self,
        input: Response,
        transforms: &[Transform],
        deadline: Deadline,
    ) -> Result<Response, GatewayError> {
        if deadline.expired() {
            return Err(GatewayError::Timeout);
        }

        let content_type = input
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = input.into_body_bytes().await?;
        let chain = serde_json::to_string(transforms)?;

        debug!(
            "Invoking engine at {} with {} transform(s), {} input bytes",
            self.url,
            transforms.len(),
            body.len()
        );

        let reply = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, content_type)
            .header(TRANSFORMS_HEADER, chain)
            .body(body)
            .timeout(deadline.remaining())
            .send()
            .await?;

        let status = reply.status().as_u16();
        if !(200..300).contains(&status) {
            let detail = reply.text().await.unwrap_or_default();
            return Err(GatewayError::TransformFailure(format!(
                "engine rejected input (status {status}): {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let output_type = reply
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let output = reply.bytes().await?;
        Ok(Response::buffered(200, output).with_content_type(&output_type))
    }
}
