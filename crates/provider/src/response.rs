//! Decoding of `/v1/images/generations` responses.
//!
//! Pure functions over response bodies; the HTTP side lives in
//! [`crate::images_api`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use serde::Deserialize;

use crate::client::ImagePayload;
use crate::error::ProviderError;

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// What a successful response carried.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseImages {
    /// Images delivered inline as base64.
    Inline(Vec<ImagePayload>),
    /// Images to download, in order.
    Urls(Vec<String>),
}

/// Parse a 2xx response body.
///
/// The first item decides the shape: `b64_json` items are decoded inline,
/// `url` items are returned for download. Every item must match that shape.
pub fn parse_images_response(body: &[u8]) -> Result<ResponseImages, ProviderError> {
    let parsed: ImagesResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed JSON: {e}")))?;

    let Some(first) = parsed.data.first() else {
        return Err(ProviderError::InvalidResponse(
            "No image data in response".to_string(),
        ));
    };

    if first.b64_json.is_some() {
        let payloads = parsed
            .data
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let encoded = item.b64_json.as_deref().ok_or_else(|| {
                    ProviderError::InvalidResponse(format!("item {idx} has no b64_json"))
                })?;
                decode_b64_image(encoded)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResponseImages::Inline(payloads))
    } else if first.url.is_some() {
        let urls = parsed
            .data
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                item.url.ok_or_else(|| {
                    ProviderError::InvalidResponse(format!("item {idx} has no url"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResponseImages::Urls(urls))
    } else {
        Err(ProviderError::InvalidResponse(
            "Unknown response format".to_string(),
        ))
    }
}

/// Decode one base64 image, accepting an optional `data:` URL prefix.
pub fn decode_b64_image(encoded: &str) -> Result<ImagePayload, ProviderError> {
    let raw = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| ProviderError::InvalidResponse(format!("undecodable base64 image: {e}")))?;
    if bytes.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "empty image payload".to_string(),
        ));
    }
    let format = sniff_format(&bytes, None, ImageFormat::Png);
    Ok(ImagePayload::new(bytes, format))
}

/// Determine the image format of downloaded bytes.
///
/// Magic bytes win; otherwise the content type, then the URL suffix, then
/// `fallback`.
pub fn sniff_format(bytes: &[u8], hint: Option<(&str, &str)>, fallback: ImageFormat) -> ImageFormat {
    if let Ok(format) = image::guess_format(bytes) {
        return format;
    }
    if let Some((content_type, url)) = hint {
        if let Some(format) = ImageFormat::from_mime_type(content_type) {
            return format;
        }
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if let Ok(format) = ImageFormat::from_path(path) {
            return format;
        }
    }
    fallback
}
