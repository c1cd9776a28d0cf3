//! The generation client seam.

use async_trait::async_trait;
use image::ImageFormat;

use crate::error::ProviderError;

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Number of images wanted, already clamped by submission rules.
    pub count: u32,
    pub config_name: String,
    /// Reference image (base64 or data URL) for image-to-image generation.
    pub reference_image: Option<String>,
}

/// Raw bytes of one generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self { bytes, format }
    }

    /// Preferred file extension for this payload, e.g. `"png"` or `"jpg"`.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("png")
    }
}

/// Produces images for a prompt.
///
/// Implementations make exactly one logical attempt per call and may take
/// minutes. The caller holds no shared lock while awaiting `generate`.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate up to `request.count` images.
    ///
    /// May return fewer images than requested; returning none is left to the
    /// caller to treat as a failure.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImagePayload>, ProviderError>;

    /// Whether `config_name` names a usable configuration.
    fn has_config(&self, config_name: &str) -> bool;
}
