//! Upload validation: size limit and extension allow-list.

use thiserror::Error;

use crate::models::format_file_size;

/// Default maximum upload size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default accepted extensions.
pub const DEFAULT_EXTENSIONS: [&str; 4] = [".pdf", ".docx", ".txt", ".md"];

/// Limits applied to every uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    /// Extensions including the leading dot, lower-case (e.g. `".pdf"`).
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Why a file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File size exceeds {} limit", limit_label(.limit))]
    TooLarge { size: u64, limit: u64 },
    #[error("Unsupported file type")]
    UnsupportedType { extension: Option<String> },
}

fn limit_label(limit: &u64) -> String {
    const MIB: u64 = 1024 * 1024;
    let limit = *limit;
    if limit >= MIB && limit % MIB == 0 {
        format!("{}MB", limit / MIB)
    } else {
        format_file_size(limit)
    }
}

/// Lower-cased extension of `filename` including the dot, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// File type label stored with a document: the extension without its dot,
/// or `"unknown"`.
pub fn file_type_of(filename: &str) -> String {
    extension_of(filename)
        .map(|e| e.trim_start_matches('.').to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check a file against the upload limits.
///
/// Size is checked first, so an oversized file of an unsupported type
/// reports the size error.
pub fn validate_file(filename: &str, size: u64, limits: &UploadLimits) -> Result<(), ValidationError> {
    if size > limits.max_file_size {
        return Err(ValidationError::TooLarge {
            size,
            limit: limits.max_file_size,
        });
    }

    let extension = extension_of(filename);
    let allowed = extension
        .as_deref()
        .map(|ext| {
            limits
                .allowed_extensions
                .iter()
                .any(|a| a.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);

    if !allowed {
        return Err(ValidationError::UnsupportedType { extension });
    }

    Ok(())
}
