//! Reading action side files (stderr) referenced by events.

use buildlens_log::event::File;
use std::io::Read;
use std::path::PathBuf;

/// Placeholder when a successful action's stderr file is gone
pub const PLACEHOLDER_CLEANED_UP: &str =
    "[stderr not available: the file was likely cleaned up after the action succeeded]";

/// Placeholder when a failed action's stderr file cannot be read
pub const PLACEHOLDER_MISSING: &str = "[stderr missing for failed action]";

/// Marker appended to text cut at the capture limit
pub const TRUNCATION_MARKER: &str = "\n[... truncated]";

/// Side file read errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// Neither a URI nor inline contents
    #[error("File {name:?} has no location")]
    NoLocation {
        /// File name from the event
        name: String,
    },

    /// URI scheme that cannot be read locally
    #[error("Unsupported URI: {uri}")]
    Unsupported {
        /// Original URI
        uri: String,
    },

    /// File does not exist
    #[error("File not found: {path}")]
    NotFound {
        /// Resolved path
        path: String,
    },

    /// Any other read failure
    #[error("Cannot read {path}: {message}")]
    Unreadable {
        /// Resolved path
        path: String,
        /// I/O error text
        message: String,
    },
}

/// Resolve a file reference to a local path.
///
/// `file://` URIs are converted; text that does not parse as a URL at all
/// is taken as a bare path.
///
/// # Errors
///
/// Returns error for non-file schemes
pub fn local_path(uri: &str) -> Result<PathBuf, CaptureError> {
    match url::Url::parse(uri) {
        Ok(parsed) if parsed.scheme() == "file" => {
            parsed.to_file_path().map_err(|()| CaptureError::Unsupported {
                uri: uri.to_string(),
            })
        }
        Ok(parsed) if parsed.scheme().len() == 1 => Ok(PathBuf::from(uri)),
        Ok(_) => Err(CaptureError::Unsupported {
            uri: uri.to_string(),
        }),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(PathBuf::from(uri)),
        Err(_) => Err(CaptureError::Unsupported {
            uri: uri.to_string(),
        }),
    }
}

/// Read a side file's text, capped at `max_bytes`.
///
/// Inline contents win over the URI.
///
/// # Errors
///
/// Returns error if the file cannot be located or read
pub fn read_side_file(file: &File, max_bytes: usize) -> Result<String, CaptureError> {
    if let Some(contents) = &file.contents {
        return Ok(cap_bytes(contents, max_bytes));
    }
    let uri = file.uri.as_deref().ok_or_else(|| CaptureError::NoLocation {
        name: file.name.clone(),
    })?;
    let path = local_path(uri)?;
    let shown = path.display().to_string();

    let handle = std::fs::File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CaptureError::NotFound {
            path: shown.clone(),
        },
        _ => CaptureError::Unreadable {
            path: shown.clone(),
            message: e.to_string(),
        },
    })?;

    let mut buf = Vec::new();
    handle
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(|e| CaptureError::Unreadable {
            path: shown,
            message: e.to_string(),
        })?;
    Ok(cap_bytes(&buf, max_bytes))
}

/// Lossy UTF-8 text of `bytes`, cut at `max_bytes` with a marker.
///
/// The cut backs off to the start of a multi-byte character it would split.
#[must_use]
pub fn cap_bytes(bytes: &[u8], max_bytes: usize) -> String {
    if bytes.len() <= max_bytes {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut end = max_bytes;
    while end > 0 && max_bytes - end < 3 && is_continuation(bytes[end]) {
        end -= 1;
    }
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    text.push_str(TRUNCATION_MARKER);
    text
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Cut text at `max_bytes` on a character boundary with a marker
#[must_use]
pub fn cap_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}
