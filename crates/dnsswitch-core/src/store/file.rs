// # File Profile Store
//
// File-based implementation of ProfileStore with crash safety.
//
// ## Purpose
//
// Keeps the profile set in a single JSON document that survives restarts,
// crashes in the middle of a write, and several processes using the same
// file at once.
//
// ## Crash Safety
//
// - Atomic writes: every mutation writes a uniquely named temporary file,
//   syncs it, and renames it over the store
// - Serialized mutations: read-modify-write cycles in one process hold an
//   async mutex for their whole duration
// - Automatic backup: keeps `.backup` of the last good document
// - Recovery: falls back to the backup if the main document is corrupt
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "updated_at": "2025-01-09T12:00:00Z",
//   "profiles": {
//     "cloudflare": { "ipv4": ["1.1.1.1", "1.0.0.1"] },
//     "quad9": { "ipv4": "9.9.9.9" }
//   }
// }
// ```
//
// `ipv4` may be a list or a single string. Entries of any other shape are
// skipped on read. Profile order in the document is preserved.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::profile::{Profile, normalize_servers};
use crate::traits::profile_store::{ProfileStore, validate_add};

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// Distinguishes temp files of concurrent writes within one process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File-based profile store
///
/// Nothing is cached: every read goes to disk and every mutation is a
/// read-modify-write against the current file, so other processes' changes
/// are always seen.
///
/// # Example
///
/// ```rust,no_run
/// use dnsswitch_core::store::FileProfileStore;
/// use dnsswitch_core::traits::ProfileStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileProfileStore::new("/var/lib/dns-switcher/profiles.json").await?;
///
///     store.add("quad9", &["9.9.9.9".to_string()]).await?;
///     let profile = store.find("quad9").await?;
///     assert!(profile.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Result of reading the store document
#[derive(Debug)]
enum Loaded {
    /// No file at the path
    Missing,
    /// File exists but is not a usable document
    Corrupt(String),
    /// Raw profile entries in document order
    Profiles(Map<String, Value>),
}

impl FileProfileStore {
    /// Create a file profile store
    ///
    /// Creates the parent directory if needed. The file itself is only
    /// created by the first mutation.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the store document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document at `path`
    async fn read_document(path: &Path) -> Result<Loaded, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Profile store does not exist: {}", path.display());
                return Ok(Loaded::Missing);
            }
            Err(e) => {
                return Err(Error::persistence(format!(
                    "Failed to read profile store {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let document: Value = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => return Ok(Loaded::Corrupt(e.to_string())),
        };

        let Value::Object(mut root) = document else {
            return Ok(Loaded::Corrupt("document root is not an object".to_string()));
        };

        if let Some(version) = root.get("version").and_then(Value::as_str)
            && version != STORE_FILE_VERSION
        {
            tracing::warn!(
                "Profile store version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                version
            );
        }

        match root.remove("profiles") {
            Some(Value::Object(profiles)) => Ok(Loaded::Profiles(profiles)),
            Some(_) => {
                tracing::warn!("'profiles' in {} is not a mapping, ignoring it", path.display());
                Ok(Loaded::Profiles(Map::new()))
            }
            None => Ok(Loaded::Profiles(Map::new())),
        }
    }

    /// Load raw profile entries with fallback to the backup document
    ///
    /// Recovery strategy:
    /// 1. Missing main file is an empty store
    /// 2. Corrupt main file: try the backup
    /// 3. Backup missing or corrupt too: empty store
    ///
    /// The flag is true when the main document was intact (or absent) and
    /// may therefore serve as the next backup.
    async fn load_with_recovery(path: &Path) -> Result<(Map<String, Value>, bool), Error> {
        match Self::read_document(path).await? {
            Loaded::Profiles(profiles) => {
                tracing::debug!("Loaded {} profile entries from {}", profiles.len(), path.display());
                Ok((profiles, true))
            }
            Loaded::Missing => Ok((Map::new(), true)),
            Loaded::Corrupt(reason) => {
                tracing::warn!(
                    "Profile store {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    reason
                );

                let recovered = match Self::read_document(&Self::backup_path(path)).await {
                    Ok(Loaded::Profiles(profiles)) => {
                        tracing::info!("Recovered {} profile entries from backup", profiles.len());
                        profiles
                    }
                    Ok(Loaded::Missing) => {
                        tracing::warn!("No backup file found. Treating store as empty.");
                        Map::new()
                    }
                    Ok(Loaded::Corrupt(backup_reason)) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Treating store as empty.",
                            backup_reason
                        );
                        Map::new()
                    }
                    Err(e) => {
                        tracing::error!("Backup unreadable: {}. Treating store as empty.", e);
                        Map::new()
                    }
                };
                Ok((recovered, false))
            }
        }
    }

    /// Turn raw entries into profiles, skipping malformed ones
    fn profiles_from_entries(entries: Map<String, Value>) -> Vec<Profile> {
        let mut profiles = Vec::with_capacity(entries.len());

        for (name, entry) in entries {
            if name.is_empty() {
                tracing::warn!("Skipping profile with empty name");
                continue;
            }

            let raw_servers: Vec<String> = match entry.get("ipv4") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                Some(Value::String(single)) => vec![single.clone()],
                _ => {
                    tracing::warn!("Skipping profile '{}': expected {{ipv4: [...]}}", name);
                    continue;
                }
            };

            let servers = normalize_servers(&raw_servers);
            if servers.len() != raw_servers.len() {
                tracing::debug!(
                    "Profile '{}': dropped {} invalid or repeated server entries",
                    name,
                    raw_servers.len() - servers.len()
                );
            }

            profiles.push(Profile::new(name, servers));
        }

        profiles
    }

    /// Write the document atomically
    ///
    /// With `backup_current`, the file being replaced is first copied to
    /// the backup path. A corrupt file is never promoted to backup.
    async fn write_document(
        &self,
        profiles: &Map<String, Value>,
        backup_current: bool,
    ) -> Result<(), Error> {
        let document = serde_json::json!({
            "version": STORE_FILE_VERSION,
            "updated_at": chrono::Utc::now(),
            "profiles": profiles,
        });

        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::persistence(format!("Failed to serialize profiles: {}", e)))?;

        // Write to a temporary file no other writer uses
        let temp_path = self.temp_path();
        if let Err(e) = Self::write_synced(&temp_path, json.as_bytes()).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        // Create backup of current file (if it exists and is intact)
        if backup_current && self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        tracing::trace!("Profile store written: {}", self.path.display());
        Ok(())
    }

    /// Write `bytes` to a new file and sync it to disk
    async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            Error::persistence(format!("Failed to create temp file {}: {}", path.display(), e))
        })?;

        file.write_all(bytes).await.map_err(|e| {
            Error::persistence(format!("Failed to write temp file {}: {}", path.display(), e))
        })?;

        file.flush().await.map_err(|e| {
            Error::persistence(format!("Failed to flush temp file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            Error::persistence(format!("Failed to sync temp file {}: {}", path.display(), e))
        })
    }

    /// Run one serialized read-modify-write cycle
    ///
    /// The document is only written when `change` succeeds.
    async fn mutate<T, F>(&self, change: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Map<String, Value>) -> Result<T, Error> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;

        let (mut profiles, intact) = Self::load_with_recovery(&self.path).await?;
        let out = change(&mut profiles)?;
        self.write_document(&profiles, intact).await?;

        Ok(out)
    }

    /// Get a temporary path unique to this process and write
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "profiles".to_string());
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq))
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn load_all(&self) -> Result<Vec<Profile>, Error> {
        let (entries, _) = Self::load_with_recovery(&self.path).await?;
        Ok(Self::profiles_from_entries(entries))
    }

    async fn add(&self, name: &str, servers: &[String]) -> Result<Profile, Error> {
        let servers = validate_add(name, servers)?;
        let stored: Vec<String> = servers.iter().map(ToString::to_string).collect();

        self.mutate(|profiles| {
            profiles.insert(name.to_string(), serde_json::json!({ "ipv4": stored }));
            Ok(())
        })
        .await?;

        tracing::info!("Saved profile '{}' with {} server(s)", name, servers.len());
        Ok(Profile::new(name, servers))
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        self.mutate(|profiles| {
            profiles
                .shift_remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found(format!("Profile '{}' not found", name)))
        })
        .await?;

        tracing::info!("Deleted profile '{}'", name);
        Ok(())
    }
}
