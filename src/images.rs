use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use handle_errors::Error;
use tracing::{Level, event};

const MAX_EXTENSION_LEN: usize = 8;

/// Uploaded images live flat in one directory under generated names.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(Error::ImageStorageError)?;
        Ok(ImageStore { dir })
    }

    /// Writes the upload and returns the name to store on the question.
    pub async fn save(&self, client_name: &str, data: &[u8]) -> Result<String, Error> {
        let name = image_file_name(client_name);
        tokio::fs::write(self.dir.join(&name), data)
            .await
            .map_err(Error::ImageStorageError)?;
        event!(Level::INFO, image = %name, bytes = data.len(), "stored image");
        Ok(name)
    }

    /// Removes a stored image. A file that is already gone is not an error.
    pub async fn remove(&self, name: &str) -> Result<(), Error> {
        let path = match self.path_of(name) {
            Some(path) => path,
            None => {
                event!(Level::WARN, image = %name, "refusing to remove image outside upload dir");
                return Ok(());
            }
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                event!(Level::INFO, image = %name, "removed image");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::ImageStorageError(e)),
        }
    }

    /// Full path of a stored name, or `None` if the name is not a bare file name.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        let file_name = Path::new(name).file_name()?;
        if file_name != name {
            return None;
        }
        Some(self.dir.join(file_name))
    }
}

/// Generated name for an upload. Only a short alphanumeric extension of the
/// client's file name survives.
pub fn image_file_name(client_name: &str) -> String {
    let id = uuid::Uuid::new_v4().to_simple().to_string();
    let base = client_name.rsplit(['/', '\\']).next().unwrap_or("");
    let extension = Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match extension {
        Some(extension) => format!("{}.{}", id, extension.to_ascii_lowercase()),
        None => id,
    }
}
