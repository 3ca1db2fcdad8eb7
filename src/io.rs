use std::path::{Path, PathBuf};

use anyhow::bail;
use chrono::Utc;
use tokio::fs::{create_dir_all, remove_file, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use uuid::Uuid;

/// Flat directory of uploaded course images. Courses only keep the returned
/// path string.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub async fn prepare(&self) -> anyhow::Result<()> {
        create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Writes `bytes` under a fresh name and returns the stored path.
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> anyhow::Result<String> {
        self.prepare().await?;
        let filename = format!(
            "course_{}_{}{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            Uuid::new_v4().simple(),
            extension_of(original_name)
        );
        let path = self.root.join(&filename);
        let file = create_io_file(&path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Removes a file previously returned by [`ImageStore::save`]. Paths
    /// outside the store root are ignored.
    pub async fn discard(&self, stored: &str) -> anyhow::Result<()> {
        let path = Path::new(stored);
        if path.parent() != Some(self.root.as_path()) || !path.exists() {
            return Ok(());
        }
        remove_file(path).await?;
        Ok(())
    }

    pub async fn read(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        if !is_plain_name(name) {
            bail!("Invalid image name `{}`", name);
        }
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        read_io_file(&path).await.map(Some)
    }
}

pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
}

pub fn content_type_of(name: &str) -> &'static str {
    match Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn extension_of(original_name: Option<&str>) -> String {
    let ext = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str());
    match ext {
        Some(ext) if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

async fn create_io_file(path: &Path) -> anyhow::Result<File> {
    if path.exists() {
        bail!("File already exists!")
    }
    File::create(path).await.map_err(anyhow::Error::from)
}

async fn read_io_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path).await?)
        .read_to_end(&mut bytes)
        .await?;
    Ok(bytes)
}
