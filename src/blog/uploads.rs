use std::path::PathBuf;

/// Extensions accepted for post images and profile pictures.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Public URL prefix (and stored path prefix) for uploaded files.
pub const PUBLIC_PREFIX: &str = "uploads";

/// Whether `filename` carries an allowed image extension. Only the name is
/// checked; contents are not inspected.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce an untrusted filename to something safe to join onto the uploads
/// directory: ASCII only, separators and whitespace become `_`, anything
/// outside `[A-Za-z0-9._-]` is dropped, and leading/trailing `.`/`_` are
/// stripped. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename.chars().filter(|c| c.is_ascii()).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// On-disk home for uploaded images.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Save an uploaded image if its name passes the image policy.
    ///
    /// Returns the stored relative path (`uploads/<name>`), or `None` when the
    /// file was rejected. An existing file with the same name is overwritten.
    pub async fn save_image(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> std::io::Result<Option<String>> {
        if !allowed_file(original_name) {
            tracing::info!("Rejected upload with disallowed name: {}", original_name);
            return Ok(None);
        }

        let filename = secure_filename(original_name);
        if filename.is_empty() {
            tracing::info!("Rejected upload, name sanitized to nothing: {}", original_name);
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&filename), bytes).await?;
        tracing::debug!("Saved upload {} ({} bytes)", filename, bytes.len());

        Ok(Some(format!("{}/{}", PUBLIC_PREFIX, filename)))
    }

    /// Remove a file previously stored by [`UploadStore::save_image`].
    /// Already-missing files are ignored.
    pub async fn discard(&self, stored: &str) {
        let name = stored
            .strip_prefix(PUBLIC_PREFIX)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(stored);
        let Some(path) = self.resolve(name) else {
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!("Discarded upload {}", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove upload {}: {}", name, e),
        }
    }

    /// Map a requested name back to a file inside the uploads directory.
    /// Names that would not survive sanitizing unchanged are refused.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || secure_filename(name) != name {
            return None;
        }
        Some(self.dir.join(name))
    }
}
