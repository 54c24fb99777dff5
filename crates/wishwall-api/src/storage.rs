use anyhow::{Result, bail};
use rand::{Rng, distr::Alphanumeric};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// URL prefix under which stored images are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const DEFAULT_EXTENSION: &str = "jpg";

/// Manages uploaded images on disk.
///
/// Each image is a flat file at `{dir}/{filename}` and is referenced from
/// content rows by its public URL, `/uploads/{filename}`.
pub struct Storage {
    dir: PathBuf,
    max_upload_size: usize,
}

impl Storage {
    pub async fn new(dir: PathBuf, max_upload_size: usize) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir, max_upload_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Largest accepted image, in bytes.
    pub fn max_upload_size(&self) -> usize {
        self.max_upload_size
    }

    /// Writes an image under a fresh name and returns its public URL.
    pub async fn save_image(&self, original_name: Option<&str>, data: &[u8]) -> Result<String> {
        let filename = generate_filename(original_name);
        let path = self.dir.join(&filename);

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(format!("{}/{}", PUBLIC_PREFIX, filename))
    }

    /// Removes the file behind a public URL. Already-missing files are fine.
    pub async fn delete_image(&self, url: &str) -> Result<()> {
        let Some(filename) = filename_from_url(url) else {
            bail!("Refusing to delete unrecognised image URL '{}'", url);
        };

        match fs::remove_file(self.dir.join(filename)).await {
            Ok(()) => {
                info!("Deleted image {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", filename);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of several images; failures are logged.
    pub async fn delete_images(&self, urls: &[String]) {
        for url in urls {
            if let Err(e) = self.delete_image(url).await {
                warn!("Failed to delete image {}: {}", url, e);
            }
        }
    }
}

/// `<YYYYmmdd_HHMMSS>_<16 alphanumerics>.<ext>`, keeping the upload's
/// extension when it is plain ASCII.
pub fn generate_filename(original_name: Option<&str>) -> String {
    let random: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    format!("{}_{}.{}", timestamp, random, extension_of(original_name))
}

fn extension_of(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Maps `/uploads/<name>` back to `<name>`, rejecting anything that could
/// escape the upload directory.
fn filename_from_url(url: &str) -> Option<&str> {
    let name = url.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;

    let safe = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    safe.then_some(name)
}
