//! Stored photo files: upload name sanitizing, collision-free writes and
//! thumbnail rendering.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ImageError, Rgb, RgbImage};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Upload extensions accepted for ingestion (case-insensitive).
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff"];

pub const THUMBNAIL_WIDTH: u32 = 300;
pub const THUMBNAIL_HEIGHT: u32 = 200;
const THUMBNAIL_QUALITY: u8 = 85;

/// Suffixes tried before giving up on a free name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("cannot write {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no free file name for {0}")]
    NoFreeName(String),
    #[error("cannot create media directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reduce an uploaded file name to a safe single path component.
///
/// Directory parts are discarded, whitespace becomes `_`, anything other than
/// ASCII alphanumerics, `.`, `-` and `_` is dropped, and leading dots and
/// underscores are stripped. `None` when nothing usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Whether `name` carries one of [`ALLOWED_EXTENSIONS`].
pub fn is_allowed(name: &str) -> bool {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

/// `thumb_<stem>.jpg` for a stored photo name.
pub fn thumbnail_name(stored: &str) -> String {
    let stem = Path::new(stored)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(stored);
    format!("thumb_{stem}.jpg")
}

/// Fit `image` inside 300×200 without upscaling, centre it on a white canvas
/// and encode as JPEG.
pub fn render_thumbnail(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let fitted = if image.width() <= THUMBNAIL_WIDTH && image.height() <= THUMBNAIL_HEIGHT {
        image.to_rgb8()
    } else {
        image.thumbnail(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT).to_rgb8()
    };

    let mut canvas = RgbImage::from_pixel(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, Rgb([255, 255, 255]));
    let x = (THUMBNAIL_WIDTH - fitted.width().min(THUMBNAIL_WIDTH)) / 2;
    let y = (THUMBNAIL_HEIGHT - fitted.height().min(THUMBNAIL_HEIGHT)) / 2;
    imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY).encode_image(&canvas)?;
    Ok(out)
}

/// Directory holding stored photos and thumbnails.
#[derive(Debug, Clone)]
pub struct MediaDir {
    root: PathBuf,
}

impl MediaDir {
    pub fn create(root: &Path) -> Result<Self, MediaError> {
        std::fs::create_dir_all(root).map_err(|source| MediaError::CreateDir {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root: root.to_path_buf() })
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write `bytes` under `name`, or `stem-N.ext` if taken. Existing files
    /// are never overwritten. Returns the name used.
    pub async fn write_unique(&self, name: &str, bytes: &[u8]) -> Result<String, MediaError> {
        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let ext = path.extension().and_then(|e| e.to_str());

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = match (attempt, ext) {
                (0, _) => name.to_string(),
                (n, Some(ext)) => format!("{stem}-{n}.{ext}"),
                (n, None) => format!("{stem}-{n}"),
            };

            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.path_of(&candidate))
                .await;

            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(MediaError::Write { name: candidate, source }),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;

            if let Err(source) = written {
                self.remove(&candidate).await;
                return Err(MediaError::Write { name: candidate, source });
            }

            if attempt > 0 {
                tracing::debug!(requested = name, stored = %candidate, "name taken; stored under suffix");
            }
            return Ok(candidate);
        }

        Err(MediaError::NoFreeName(name.to_string()))
    }

    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path_of(name)).await.unwrap_or(false)
    }

    /// Best-effort removal; failures are logged.
    pub async fn remove(&self, name: &str) {
        if let Err(e) = tokio::fs::remove_file(self.path_of(name)).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(name, error = %e, "failed to remove stored file");
            }
        }
    }
}
