//! Client for OpenAI-compatible image generation endpoints.
//!
//! Sends `POST {base_url}/v1/images/generations`, asking for `b64_json`
//! first. If the provider rejects that response format with an HTTP error,
//! the request is repeated once with `response_format: "url"` and the
//! returned URLs are downloaded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use aigpic_core::providers::{ProviderConfig, ProviderRegistry};
use async_trait::async_trait;
use image::ImageFormat;
use serde::Serialize;

use crate::client::{GenerationClient, GenerationRequest, ImagePayload};
use crate::error::ProviderError;
use crate::response::{parse_images_response, sniff_format, ResponseImages};

/// Upper bound on one provider call, including downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const IMAGE_SIZE: &str = "1024x1024";
const IMAGE_QUALITY: &str = "standard";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum ResponseFormat {
    B64Json,
    Url,
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    stream: bool,
    size: &'a str,
    quality: &'a str,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

/// One configured provider with its own HTTP client.
struct Endpoint {
    config: ProviderConfig,
    http: reqwest::Client,
}

/// [`GenerationClient`] over a set of named images-API endpoints.
pub struct ImagesApiClient {
    endpoints: HashMap<String, Endpoint>,
    timeout: Duration,
}

impl ImagesApiClient {
    /// Build one HTTP client per configuration, honouring its proxy.
    pub fn from_registry(
        registry: &ProviderRegistry,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut endpoints = HashMap::new();
        for config in registry.configs() {
            let mut builder = reqwest::Client::builder().timeout(timeout);
            if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
                tracing::info!(config_name = %config.name, proxy, "Using proxy for provider");
                builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            }
            endpoints.insert(
                config.name.clone(),
                Endpoint {
                    config: config.clone(),
                    http: builder.build()?,
                },
            );
        }
        Ok(Self { endpoints, timeout })
    }

    // ---- private helpers ----

    async fn request_images(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
        format: ResponseFormat,
    ) -> Result<ResponseImages, ProviderError> {
        let url = format!(
            "{}/v1/images/generations",
            endpoint.config.base_url.trim_end_matches('/')
        );
        let body = GenerationBody {
            model: &endpoint.config.model,
            prompt: &request.prompt,
            n: request.count,
            stream: false,
            size: IMAGE_SIZE,
            quality: IMAGE_QUALITY,
            response_format: format,
            image: request.reference_image.as_deref(),
        };

        let response = endpoint
            .http
            .post(url)
            .bearer_auth(&endpoint.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let response = self.ensure_success(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        parse_images_response(&bytes)
    }

    async fn download(&self, endpoint: &Endpoint, url: &str) -> Result<ImagePayload, ProviderError> {
        tracing::debug!(url, "Downloading generated image");
        let response = endpoint
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        let response = self.ensure_success(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse(format!(
                "empty image download from {url}"
            )));
        }

        let format = sniff_format(&bytes, Some((&content_type, url)), ImageFormat::Jpeg);
        Ok(ImagePayload::new(bytes.to_vec(), format))
    }

    async fn resolve(
        &self,
        endpoint: &Endpoint,
        images: ResponseImages,
    ) -> Result<Vec<ImagePayload>, ProviderError> {
        match images {
            ResponseImages::Inline(payloads) => Ok(payloads),
            ResponseImages::Urls(urls) => {
                let mut payloads = Vec::with_capacity(urls.len());
                for url in &urls {
                    payloads.push(self.download(endpoint, url).await?);
                }
                Ok(payloads)
            }
        }
    }

    /// Return the response unchanged on 2xx, or a
    /// [`ProviderError::Rejected`] carrying the status and body.
    async fn ensure_success(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::rejected(status.as_u16(), &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationClient for ImagesApiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImagePayload>, ProviderError> {
        let endpoint = self
            .endpoints
            .get(&request.config_name)
            .ok_or_else(|| ProviderError::UnknownConfig(request.config_name.clone()))?;

        let started = Instant::now();
        tracing::info!(
            config_name = %request.config_name,
            count = request.count,
            has_reference = request.reference_image.is_some(),
            "Requesting images from provider"
        );

        let images = match self
            .request_images(endpoint, request, ResponseFormat::B64Json)
            .await
        {
            Err(ProviderError::Rejected { status, body }) => {
                tracing::warn!(
                    config_name = %request.config_name,
                    status,
                    body = %body,
                    "b64_json response format rejected, retrying with url format"
                );
                self.request_images(endpoint, request, ResponseFormat::Url)
                    .await?
            }
            other => other?,
        };

        let payloads = self.resolve(endpoint, images).await?;
        tracing::info!(
            config_name = %request.config_name,
            returned = payloads.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Provider returned images"
        );
        Ok(payloads)
    }

    fn has_config(&self, config_name: &str) -> bool {
        self.endpoints.contains_key(config_name)
    }
}
