//! Security utilities for input validation of uploaded photos and storage names

use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Upload extensions accepted at the HTTP boundary (compared case-insensitively)
pub const ALLOWED_PHOTO_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Check an uploaded filename's extension against the photo allow-list.
///
/// A filename without an extension is rejected. Passing this check does not make the
/// content an image; the normalizer sniffs the bytes.
pub fn is_allowed_photo_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_PHOTO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Validate a storage filename read back from a pointer before it touches the filesystem
pub fn validate_storage_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(anyhow::anyhow!("Filename cannot be empty"));
    }

    if filename.len() > 255 {
        return Err(anyhow::anyhow!("Filename too long (max 255 characters)"));
    }

    if filename.contains('\0') {
        return Err(anyhow::anyhow!("Filename contains null bytes"));
    }

    // Filenames should not contain path separators
    if filename.contains('/') || filename.contains('\\') {
        warn!("Path traversal attempt detected in stored filename: {}", filename);
        return Err(anyhow::anyhow!("Filename cannot contain path separators"));
    }

    if filename.chars().any(|ch| ch.is_control()) {
        return Err(anyhow::anyhow!("Filename contains control characters"));
    }

    if is_dangerous_filename(filename) {
        return Err(anyhow::anyhow!("Potentially dangerous filename: {}", filename));
    }

    Ok(())
}

/// Check if a filename is potentially dangerous
fn is_dangerous_filename(filename: &str) -> bool {
    let filename_lower = filename.to_lowercase();

    // Windows reserved names
    let reserved_names = [
        "con", "prn", "aux", "nul",
        "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8", "com9",
        "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
    ];

    let name_without_ext = filename_lower.split('.').next().unwrap_or("");
    if reserved_names.contains(&name_without_ext) {
        return true;
    }

    // Hidden names are reserved for in-flight temp files
    filename_lower.starts_with('.')
}

/// Normalize a path by resolving . and .. components without filesystem access
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(_) | Component::RootDir | Component::Prefix(_) => {
                normalized.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
        }
    }

    normalized
}

/// Validate that a path is within the allowed base directory
pub fn validate_path_within_base(path: &Path, base_dir: &Path) -> Result<()> {
    let current_dir = std::env::current_dir().unwrap_or_default();

    let absolute_base = if base_dir.is_absolute() {
        base_dir.to_path_buf()
    } else {
        current_dir.join(base_dir)
    };

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        current_dir.join(path)
    };

    let canonical_base = absolute_base
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(&absolute_base));

    let canonical_path = match (absolute_path.parent(), absolute_path.file_name()) {
        (Some(parent), Some(filename)) => parent
            .canonicalize()
            .unwrap_or_else(|_| normalize_path(parent))
            .join(filename),
        _ => normalize_path(&absolute_path),
    };

    debug!(
        "Path validation: canonical_path='{}', canonical_base='{}'",
        canonical_path.display(),
        canonical_base.display()
    );

    if !canonical_path.starts_with(&canonical_base) {
        return Err(anyhow::anyhow!(
            "Path '{}' is not within allowed base directory '{}'",
            path.display(),
            base_dir.display()
        ));
    }

    Ok(())
}
