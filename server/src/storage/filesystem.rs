use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::fs;

use super::{dotted_extension, relative_path, MediaStorage, StorageError, StorageResult, Upload};

const PROBE_FILE: &str = ".write_probe";
const SUFFIX_LEN: usize = 7;

/// Old storage names that now live in a subdirectory.
const LEGACY_NAMES: [(&str, &str); 2] = [
    ("default.jpg", "profile_pics/default.jpg"),
    ("event_default.jpg", "event_pics/event_default.png"),
];

/// The directory media is written to, chosen once at startup, plus every
/// other candidate directory that reads may still find files in.
#[derive(Debug, Clone)]
pub struct MediaRoot {
    root: PathBuf,
    search: Vec<PathBuf>,
}

impl MediaRoot {
    /// Picks the first candidate that can be created, written to and cleaned
    /// up. Later candidates are kept for lookups only.
    pub async fn resolve(candidates: &[PathBuf]) -> StorageResult<Self> {
        let mut root = None;
        for candidate in candidates {
            match probe(candidate).await {
                Ok(()) => {
                    tracing::info!(root = %candidate.display(), "Media root resolved");
                    root = Some(candidate.clone());
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        root = %candidate.display(),
                        error = %e,
                        "Media root not writable, trying next candidate"
                    );
                }
            }
        }

        let root = root.ok_or_else(|| {
            let tried: Vec<String> = candidates.iter().map(|c| c.display().to_string()).collect();
            StorageError::NoWritableRoot(tried.join(", "))
        })?;

        Ok(Self::with_fallbacks(root, candidates.to_vec()))
    }

    pub fn with_fallbacks(root: PathBuf, candidates: Vec<PathBuf>) -> Self {
        let mut search = vec![root.clone()];
        for candidate in candidates {
            if !search.contains(&candidate) {
                search.push(candidate);
            }
        }
        Self { root, search }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Location of `name` under the writable root.
    pub fn join(&self, name: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join(relative_path(name)?))
    }

    /// First existing regular file for `name` across all roots.
    pub async fn find(&self, name: &str) -> Option<PathBuf> {
        let relative = relative_path(name).ok()?;
        for root in &self.search {
            let candidate = root.join(&relative);
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Resolves a request path, trying the current location of a legacy name
    /// before the name as given.
    pub async fn find_served(&self, requested: &str) -> Option<PathBuf> {
        let requested = requested.trim_start_matches('/');
        if let Some((_, current)) = LEGACY_NAMES.iter().find(|(old, _)| *old == requested) {
            if let Some(found) = self.find(current).await {
                return Some(found);
            }
        }
        self.find(requested).await
    }
}

async fn probe(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;
    let probe = dir.join(PROBE_FILE);
    fs::write(&probe, b"ok").await?;
    fs::remove_file(&probe).await
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

/// `dir/stem_XXXXXXX.ext` for `dir/stem.ext`.
fn suffixed(name: &str) -> String {
    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };
    let ext = dotted_extension(file).unwrap_or_default();
    let stem = file.strip_suffix(ext.as_str()).unwrap_or(file);
    let file = format!("{stem}_{}{ext}", random_suffix());
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

pub struct FileSystemStorage {
    root: Arc<MediaRoot>,
    base_url: String,
}

impl FileSystemStorage {
    pub fn new(root: Arc<MediaRoot>, base_url: impl Into<String>) -> Self {
        Self {
            root,
            base_url: base_url.into(),
        }
    }

    fn normalized(name: &str) -> StorageResult<String> {
        let path = relative_path(name)?;
        let parts: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }
}

#[async_trait]
impl MediaStorage for FileSystemStorage {
    async fn open(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.root.join(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, name: &str, upload: Upload) -> StorageResult<String> {
        let name = self.available_name(name).await?;
        let path = self.root.join(&name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &upload.data).await?;
        tracing::debug!(name = %name, bytes = upload.data.len(), "Stored media file on disk");
        Ok(name)
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.root.join(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting a missing file is a no-op.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(is_file(&self.root.join(name)?).await)
    }

    async fn size(&self, name: &str) -> StorageResult<u64> {
        let path = self.root.join(name)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name.trim_start_matches('/'))
    }

    async fn available_name(&self, name: &str) -> StorageResult<String> {
        let name = Self::normalized(name)?;
        if !self.exists(&name).await? {
            return Ok(name);
        }
        loop {
            let candidate = suffixed(&name);
            if !self.exists(&candidate).await? {
                return Ok(candidate);
            }
        }
    }
}
