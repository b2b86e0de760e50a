use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::models::MaterialFile;
use crate::services::storage::StorageService;

#[derive(Debug, Error)]
pub(crate) enum FileError {
    #[error("invalid file path: {0}")]
    InvalidPath(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

/// How a material file is handed to the extraction model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FilePayload {
    Url(String),
    Inline { mime: &'static str, base64: String },
}

impl FilePayload {
    pub(crate) fn as_data_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Inline { mime, base64 } => format!("data:{mime};base64,{base64}"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct MaterialFiles {
    upload_dir: PathBuf,
    storage: Option<StorageService>,
    url_ttl: Duration,
}

impl MaterialFiles {
    pub(crate) fn from_settings(settings: &Settings, storage: Option<StorageService>) -> Self {
        Self {
            upload_dir: PathBuf::from(&settings.storage().upload_dir),
            storage,
            url_ttl: Duration::from_secs(settings.storage().presigned_url_expire_minutes * 60),
        }
    }

    /// Images in object storage are passed by presigned URL; everything else
    /// is inlined.
    pub(crate) async fn resolve(&self, file: &MaterialFile) -> Result<FilePayload, FileError> {
        let key = storage_key(file)?;
        let mime = guess_mime(&key);

        match &self.storage {
            Some(storage) if mime.starts_with("image/") => storage
                .presign_get(&key.to_string_lossy(), self.url_ttl)
                .await
                .map(FilePayload::Url)
                .map_err(|err| FileError::Storage(format!("{err:#}"))),
            Some(storage) => {
                let bytes = storage
                    .get_bytes(&key.to_string_lossy())
                    .await
                    .map_err(|err| FileError::Storage(format!("{err:#}")))?;
                Ok(FilePayload::Inline { mime, base64: STANDARD.encode(bytes) })
            }
            None => {
                let path = self.upload_dir.join(&key);
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return Err(FileError::NotFound(key.to_string_lossy().to_string()));
                    }
                    Err(err) => return Err(err.into()),
                };
                Ok(FilePayload::Inline { mime, base64: STANDARD.encode(bytes) })
            }
        }
    }
}

// Older rows carry only a URL such as `/upload/<name>`.
fn storage_key(file: &MaterialFile) -> Result<PathBuf, FileError> {
    let raw = if file.file_name.trim().is_empty() {
        file.file_url.trim().trim_start_matches("/upload/")
    } else {
        file.file_name.trim()
    };
    sanitize_relative_path(raw)
}

pub(crate) fn sanitize_relative_path(raw: &str) -> Result<PathBuf, FileError> {
    let normalized = raw.trim().replace('\\', "/").trim_start_matches('/').to_string();
    if normalized.is_empty() {
        return Err(FileError::InvalidPath(raw.to_string()));
    }

    let path = Path::new(&normalized);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FileError::InvalidPath(raw.to_string()));
            }
        }
    }

    Ok(path.to_path_buf())
}

pub(crate) fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}
