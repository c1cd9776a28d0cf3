use std::time::Duration;

/// Longest provider body kept in an error message.
const MAX_BODY_CHARS: usize = 500;

/// Errors from a generation provider.
///
/// The `Display` text becomes the `error` of a failed job, so each variant
/// reads as a short human-readable cause.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No response within the configured time bound.
    #[error("Provider timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The provider answered with a non-2xx status.
    #[error("Provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request never reached the provider (DNS, connect, TLS, proxy).
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// A 2xx response that did not contain usable image data.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Unknown configuration '{0}'")]
    UnknownConfig(String),
}

impl ProviderError {
    /// Build a [`ProviderError::Rejected`], truncating long bodies.
    pub fn rejected(status: u16, body: &str) -> Self {
        let body = if body.chars().count() > MAX_BODY_CHARS {
            let cut: String = body.chars().take(MAX_BODY_CHARS).collect();
            format!("{cut}...")
        } else {
            body.to_string()
        };
        Self::Rejected { status, body }
    }

    /// Classify a transport-level [`reqwest::Error`].
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if let Some(status) = err.status() {
            Self::rejected(status.as_u16(), &err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        match ProviderError::rejected(500, &body) {
            ProviderError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.chars().count(), MAX_BODY_CHARS + 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(300)).to_string(),
            "Provider timed out after 300s"
        );
        assert_eq!(
            ProviderError::rejected(401, "bad key").to_string(),
            "Provider rejected the request (401): bad key"
        );
    }
}
