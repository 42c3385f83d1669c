//! Common types used across Fieldsnap
//!
//! Site keys and categories become path segments of object keys
//! (`{site}/{category}/{id}-{file}`), so both are validated on construction.

use crate::error::{FieldsnapError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum length of a site key or category segment
pub const MAX_SEGMENT_LEN: usize = 128;

/// Maximum length of an uploaded file name
pub const MAX_FILE_NAME_LEN: usize = 255;

fn validate_segment(field: &'static str, raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(FieldsnapError::validation(field, "must not be empty"));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(FieldsnapError::validation(
            field,
            format!("must not exceed {} characters", MAX_SEGMENT_LEN),
        ));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(FieldsnapError::validation(field, "must not contain path separators"));
    }
    Ok(value.to_string())
}

/// Correlation key of the site an upload belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteKey(String);

impl SiteKey {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_segment("site key", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SiteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workflow tag partitioning a site's uploads (e.g. "before", "after")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_segment("category", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract and validate the file name component of a local path
pub fn file_name_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .ok_or_else(|| FieldsnapError::validation("file name", "path has no file name"))?
        .to_str()
        .ok_or_else(|| FieldsnapError::validation("file name", "must be valid UTF-8"))?;

    if name.len() > MAX_FILE_NAME_LEN {
        return Err(FieldsnapError::validation(
            "file name",
            format!("must not exceed {} characters", MAX_FILE_NAME_LEN),
        ));
    }

    Ok(name.to_string())
}

/// Best-effort content type from a file extension
pub fn content_type_for_path(path: &Path) -> mime::Mime {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("png") => mime::IMAGE_PNG,
        Some("gif") => mime::IMAGE_GIF,
        Some("bmp") => mime::IMAGE_BMP,
        Some("webp") => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
