//! Path normalization + MIME helpers for product image uploads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use loboshop_types::ImageUpload;

/// Normalizes user-provided file paths.
///
/// Handles common drag-and-drop shell escaping (`\ `, `\(`, `\)`) and
/// expands `~/` to the HOME directory when available.
#[must_use]
pub fn normalize_input_path(path: &str) -> PathBuf {
    let unescaped = path
        .replace("\\ ", " ")
        .replace("\\(", "(")
        .replace("\\)", ")");

    if let Some(rest) = unescaped.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }

    PathBuf::from(unescaped)
}

/// Returns MIME type inferred from file extension for supported image formats.
#[must_use]
pub fn mime_type_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|e| e.to_str())?;

    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Reads an image file into an upload part.
///
/// # Errors
/// Returns an error if the extension is not a supported image type or the
/// file cannot be read.
pub async fn read_image(path: &str) -> Result<ImageUpload> {
    let path = normalize_input_path(path);
    let Some(mime_type) = mime_type_for_extension(&path) else {
        bail!(
            "Unsupported image type: {} (expected png, jpg, gif or webp)",
            path.display()
        );
    };

    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;

    let file_name = path
        .file_name()
        .map_or_else(|| "imagen".to_string(), |n| n.to_string_lossy().into_owned());

    Ok(ImageUpload {
        file_name,
        mime_type: mime_type.to_string(),
        bytes,
    })
}
