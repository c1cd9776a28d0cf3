//! Output directory for generated image files.
//!
//! Files are named `{YYYYmmdd_HHMMSS}_{short_id}_{index}.{ext}` and only
//! ever resolved as a single plain component under the output directory.

use std::io;
use std::path::{Component, Path, PathBuf};

use aigpic_provider::ImagePayload;
use chrono::Utc;

/// Writes and removes generated images under one directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Write every payload and return the filenames in payload order.
    ///
    /// All-or-nothing: if any write fails, files already written by this
    /// call are removed before the error is returned.
    pub async fn save(&self, payloads: &[ImagePayload]) -> io::Result<Vec<String>> {
        self.ensure_dir().await?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        let short_id = &short_id[..8];

        let mut written = Vec::with_capacity(payloads.len());
        for (idx, payload) in payloads.iter().enumerate() {
            let filename = format!("{stamp}_{short_id}_{}.{}", idx + 1, payload.extension());
            let path = self.dir.join(&filename);
            if let Err(e) = tokio::fs::write(&path, &payload.bytes).await {
                tracing::error!(filename = %filename, error = %e, "Failed to write image");
                self.remove_all(&written).await;
                return Err(e);
            }
            tracing::debug!(filename = %filename, bytes = payload.bytes.len(), "Saved image");
            written.push(filename);
        }
        Ok(written)
    }

    /// Resolve `filename` to a path inside the output directory.
    ///
    /// Returns `None` for anything but a single normal path component.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Some(self.dir.join(name)),
            _ => None,
        }
    }

    pub async fn remove(&self, filename: &str) -> io::Result<()> {
        let path = self.resolve(filename).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid image filename '{filename}'"),
            )
        })?;
        tokio::fs::remove_file(path).await
    }

    /// Best-effort removal; failures are logged.
    pub async fn remove_all(&self, filenames: &[String]) {
        for filename in filenames {
            if let Err(e) = self.remove(filename).await {
                tracing::warn!(filename = %filename, error = %e, "Failed to remove image file");
            }
        }
    }
}
