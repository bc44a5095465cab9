//! Per-user API key storage.

use crate::error::AppError;
use crate::types::ProviderKind;
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Source of per-user API keys, keyed by an opaque user id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The user's key for `provider`, if one is stored.
    async fn api_key(&self, user_id: &str, provider: ProviderKind) -> Result<Option<String>, AppError>;
}

/// Store with no keys; every lookup falls through to environment defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialStore for NoCredentials {
    async fn api_key(&self, _user_id: &str, _provider: ProviderKind) -> Result<Option<String>, AppError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    keys: HashMap<(String, ProviderKind), String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, user_id: &str, provider: ProviderKind, key: &str) -> Self {
        self.keys.insert((user_id.to_string(), provider), key.to_string());
        self
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn api_key(&self, user_id: &str, provider: ProviderKind) -> Result<Option<String>, AppError> {
        Ok(self.keys.get(&(user_id.to_string(), provider)).cloned())
    }
}

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("credential store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::warn!(error = %err, "credential store failure");
        AppError::configuration(format!("Credential store unavailable: {err}"))
    }
}

/// On-disk layout: `{"users": {"<userId>": {"<provider>": "<key>"}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub users: BTreeMap<String, BTreeMap<ProviderKind, String>>,
}

/// JSON-file backed store.
///
/// Reads take a shared lock and writes an exclusive lock on a sibling
/// `.json.lock` file; writes go to a temp file that is renamed into place.
/// On Unix the directory is `0700` and the file `0600`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/sambung-ai/credentials.json`, when a config dir exists.
    pub fn default_path(config_dir: &Path) -> PathBuf {
        config_dir.join("sambung-ai").join("credentials.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<CredentialsFile, AppError> {
        let path = self.path.clone();
        blocking(move || load_locked(&path)).await
    }

    pub async fn set_key(&self, user_id: &str, provider: ProviderKind, key: &str) -> Result<(), AppError> {
        let (path, user_id, key) = (self.path.clone(), user_id.to_string(), key.to_string());
        blocking(move || {
            update_locked(&path, |file| {
                file.users.entry(user_id).or_default().insert(provider, key);
            })
        })
        .await
    }

    pub async fn remove_key(&self, user_id: &str, provider: ProviderKind) -> Result<bool, AppError> {
        let (path, user_id) = (self.path.clone(), user_id.to_string());
        blocking(move || {
            update_locked(&path, |file| {
                let Some(keys) = file.users.get_mut(&user_id) else {
                    return false;
                };
                let removed = keys.remove(&provider).is_some();
                if keys.is_empty() {
                    file.users.remove(&user_id);
                }
                removed
            })
        })
        .await
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn api_key(&self, user_id: &str, provider: ProviderKind) -> Result<Option<String>, AppError> {
        let file = self.load().await?;
        Ok(file
            .users
            .get(user_id)
            .and_then(|keys| keys.get(&provider))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty()))
    }
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, AppError> {
    let out = tokio::task::spawn_blocking(f).await.map_err(StoreError::from)?;
    Ok(out?)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("json.lock")
}

fn open_lock(path: &Path) -> Result<fs::File, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }
    let lock = lock_path(path);
    fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock)
        .map_err(io_err(&lock))
}

fn read_unlocked(path: &Path) -> Result<CredentialsFile, StoreError> {
    if !path.exists() {
        return Ok(CredentialsFile::default());
    }
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    if content.trim().is_empty() {
        return Ok(CredentialsFile::default());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_unlocked(path: &Path, file: &CredentialsFile) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(file).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        tmp.write_all(json.as_bytes()).map_err(io_err(&tmp_path))?;
        tmp.sync_all().map_err(io_err(&tmp_path))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }
    fs::rename(&tmp_path, path).map_err(io_err(path))
}

fn load_locked(path: &Path) -> Result<CredentialsFile, StoreError> {
    let lock = open_lock(path)?;
    lock.lock_shared().map_err(io_err(path))?;
    let out = read_unlocked(path);
    let _ = FileExt::unlock(&lock);
    out
}

fn update_locked<T>(path: &Path, f: impl FnOnce(&mut CredentialsFile) -> T) -> Result<T, StoreError> {
    let lock = open_lock(path)?;
    lock.lock_exclusive().map_err(io_err(path))?;
    let out = read_unlocked(path).and_then(|mut file| {
        let value = f(&mut file);
        write_unlocked(path, &file).map(|_| value)
    });
    let _ = FileExt::unlock(&lock);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_is_scoped_per_user_and_provider() {
        let store = MemoryCredentialStore::new().with_key("u1", ProviderKind::Anthropic, "sk-ant");
        assert_eq!(
            store.api_key("u1", ProviderKind::Anthropic).await.unwrap().as_deref(),
            Some("sk-ant")
        );
        assert_eq!(store.api_key("u2", ProviderKind::Anthropic).await.unwrap(), None);
        assert_eq!(store.api_key("u1", ProviderKind::OpenAi).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds.json"));
        assert_eq!(store.api_key("u1", ProviderKind::OpenAi).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_and_remove_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("creds.json");
        let store = FileCredentialStore::new(&path);

        store.set_key("u1", ProviderKind::Groq, "gsk-1").await.unwrap();
        store.set_key("u1", ProviderKind::OpenAi, "sk-2").await.unwrap();

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(
            reopened.api_key("u1", ProviderKind::Groq).await.unwrap().as_deref(),
            Some("gsk-1")
        );

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["users"]["u1"]["openai"], "sk-2");

        assert!(store.remove_key("u1", ProviderKind::Groq).await.unwrap());
        assert!(!store.remove_key("u1", ProviderKind::Groq).await.unwrap());
        assert_eq!(store.api_key("u1", ProviderKind::Groq).await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileCredentialStore::new(&path);
        store.set_key("u1", ProviderKind::OpenAi, "sk-1").await.unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileCredentialStore::new(&path)
            .api_key("u1", ProviderKind::OpenAi)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Configuration);
    }
}
