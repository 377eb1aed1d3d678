use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;

const LOCAL_TAG: &str = "file:";
const BLOB_TAG: &str = "blob:";
const REMOTE_TAG: &str = "s3:";

/// Storage variant a pointer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    LocalFile,
    Blob,
    RemoteObject,
}

impl std::fmt::Display for PointerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalFile => write!(f, "local"),
            Self::Blob => write!(f, "blob"),
            Self::RemoteObject => write!(f, "s3"),
        }
    }
}

impl TryFrom<String> for PointerKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" | "local_file" | "filesystem" => Ok(Self::LocalFile),
            "blob" | "database" | "db" => Ok(Self::Blob),
            "s3" | "remote" | "remote_object" => Ok(Self::RemoteObject),
            _ => Err(format!("Invalid photo backend: {}", value)),
        }
    }
}

/// Locator of an employee's current photo.
///
/// One value per employee, never a list. `Blob` carries the photo itself because the
/// relational BLOB backend keeps the content in the record.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AttachmentPointer {
    LocalFile { filename: String },
    Blob { inline: Vec<u8> },
    RemoteObject { url: String, object_key: String },
    #[default]
    Absent,
}

impl std::fmt::Debug for AttachmentPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalFile { filename } => f.debug_struct("LocalFile").field("filename", filename).finish(),
            Self::Blob { inline } => f.debug_struct("Blob").field("bytes", &inline.len()).finish(),
            Self::RemoteObject { url, object_key } => f
                .debug_struct("RemoteObject")
                .field("url", url)
                .field("object_key", object_key)
                .finish(),
            Self::Absent => write!(f, "Absent"),
        }
    }
}

impl AttachmentPointer {
    pub fn kind(&self) -> Option<PointerKind> {
        match self {
            Self::LocalFile { .. } => Some(PointerKind::LocalFile),
            Self::Blob { .. } => Some(PointerKind::Blob),
            Self::RemoteObject { .. } => Some(PointerKind::RemoteObject),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Backend key of a keyed blob (filename or object key); `None` for inline and absent pointers
    pub fn storage_key(&self) -> Option<&str> {
        match self {
            Self::LocalFile { filename } => Some(filename),
            Self::RemoteObject { object_key, .. } => Some(object_key),
            Self::Blob { .. } | Self::Absent => None,
        }
    }

    /// Whether this pointer names exactly the listed backend key `key`
    pub fn references_key(&self, key: &str) -> bool {
        match self {
            Self::LocalFile { filename } => filename == key,
            Self::RemoteObject { url, object_key } => {
                object_key == key || url.ends_with(&format!("/{}", key))
            }
            Self::Blob { .. } | Self::Absent => false,
        }
    }

    /// Value persisted in the `foto` column
    pub fn locator(&self) -> Option<String> {
        match self {
            Self::LocalFile { filename } => Some(format!("{}{}", LOCAL_TAG, filename)),
            Self::Blob { .. } => Some(BLOB_TAG.to_string()),
            Self::RemoteObject { url, object_key } => {
                Some(format!("{}{}|{}", REMOTE_TAG, object_key, url))
            }
            Self::Absent => None,
        }
    }

    /// Split into the `(foto, foto_blob)` column pair
    pub fn to_columns(&self) -> (Option<String>, Option<Vec<u8>>) {
        match self {
            Self::Blob { inline } => (self.locator(), Some(inline.clone())),
            other => (other.locator(), None),
        }
    }

    /// Rebuild a pointer from the `(foto, foto_blob)` column pair.
    ///
    /// Accepts the values older deployments wrote: a bare filename (local disk),
    /// a public URL (bucket), or only a populated BLOB column.
    pub fn from_columns(foto: Option<String>, foto_blob: Option<Vec<u8>>) -> Self {
        let foto = foto.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(value) = foto else {
            return match foto_blob {
                Some(inline) if !inline.is_empty() => Self::Blob { inline },
                _ => Self::Absent,
            };
        };

        if let Some(filename) = value.strip_prefix(LOCAL_TAG) {
            return Self::LocalFile { filename: filename.to_string() };
        }

        if value.starts_with(BLOB_TAG) {
            return Self::Blob { inline: foto_blob.unwrap_or_default() };
        }

        if let Some(rest) = value.strip_prefix(REMOTE_TAG) {
            let (object_key, url) = rest.split_once('|').unwrap_or((rest, ""));
            return Self::RemoteObject {
                url: url.to_string(),
                object_key: object_key.to_string(),
            };
        }

        if value.starts_with("http://") || value.starts_with("https://") {
            let object_key = legacy_object_key(&value);
            return Self::RemoteObject { url: value, object_key };
        }

        // Bare filename, possibly stored with its static directory
        let filename = Path::new(&value)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&value)
            .to_string();
        Self::LocalFile { filename }
    }
}

/// Object key of a public bucket URL: everything after the host
fn legacy_object_key(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme.split_once('/').map(|(_, path)| path).unwrap_or("");
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.trim_matches('/').to_string()
}

/// Normalized photo ready to be stored
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CanonicalImage {
    pub const CONTENT_TYPE: &'static str = "image/jpeg";
    pub const EXTENSION: &'static str = "jpg";
}

impl std::fmt::Debug for CanonicalImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalImage")
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
