//! Submission validation for new generation jobs.
//!
//! Pure functions only. Whether a configuration name is known is supplied by
//! the caller so this module stays free of provider concerns.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest number of images a job may request.
pub const MIN_REQUESTED_COUNT: u32 = 1;
/// Largest number of images a job may request.
pub const MAX_REQUESTED_COUNT: u32 = 10;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// A submission as received from a caller, before validation.
#[derive(Debug, Clone)]
pub struct NewJobRequest {
    pub prompt: String,
    pub requested_count: u32,
    pub config_name: String,
    /// Optional reference image (base64 or a data URL).
    pub reference_image: Option<String>,
}

/// A submission that passed validation.
///
/// `requested_count` already reflects the reference-image clamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub prompt: String,
    pub requested_count: u32,
    pub config_name: String,
    pub reference_image: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// The number of images actually requested from the provider.
///
/// Image-to-image generation produces a single image, so a reference image
/// clamps the count to one.
pub fn effective_count(requested: u32, has_reference_image: bool) -> u32 {
    if has_reference_image {
        MIN_REQUESTED_COUNT
    } else {
        requested
    }
}

/// Validate a submission.
///
/// Rules:
/// - The prompt must not be empty after trimming.
/// - `requested_count` must be within `MIN_REQUESTED_COUNT..=MAX_REQUESTED_COUNT`.
/// - `config_name` must be accepted by `is_known_config`.
///
/// A blank reference image is treated as absent.
pub fn validate_submission(
    request: NewJobRequest,
    is_known_config: impl Fn(&str) -> bool,
) -> Result<ValidatedSubmission, CoreError> {
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Prompt must not be empty".to_string(),
        ));
    }
    if !(MIN_REQUESTED_COUNT..=MAX_REQUESTED_COUNT).contains(&request.requested_count) {
        return Err(CoreError::Validation(format!(
            "Requested image count must be between {MIN_REQUESTED_COUNT} and {MAX_REQUESTED_COUNT}, got {}",
            request.requested_count
        )));
    }
    if !is_known_config(&request.config_name) {
        return Err(CoreError::Validation(format!(
            "Unknown configuration '{}'",
            request.config_name
        )));
    }

    let reference_image = request
        .reference_image
        .filter(|image| !image.trim().is_empty());
    let requested_count = effective_count(request.requested_count, reference_image.is_some());

    Ok(ValidatedSubmission {
        prompt: request.prompt,
        requested_count,
        config_name: request.config_name,
        reference_image,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
