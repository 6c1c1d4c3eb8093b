//! Command file storage.
//!
//! Layout under the data directory:
//!
//! ```text
//! temp/<user_id>.txt              scratch file, one per user
//! saves/<user_id>/<uid>.txt       saved file content
//! saves/<user_id>/<uid>.json      saved file metadata
//! ```
//!
//! Files are partitioned per user and UID, so concurrent sessions never touch
//! the same file. All I/O goes through `tokio::fs`.

use crate::{
    core::tier::Tier,
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Where a command file lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactRef {
    /// The user's scratch file
    Ephemeral {
        /// Discord user ID
        user_id: u64,
    },
    /// One of the user's saved files
    Saved {
        /// Discord user ID
        user_id: u64,
        /// File UID
        uid: String,
    },
    /// Another user's saved file, reached through the market
    Market {
        /// Discord user ID of the listing owner
        owner_id: u64,
        /// File UID
        uid: String,
    },
}

impl ArtifactRef {
    /// File name shown to users.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Ephemeral { user_id } => format!("{user_id}.txt"),
            Self::Saved { uid, .. } | Self::Market { uid, .. } => format!("{uid}.txt"),
        }
    }

    /// UID of a saved file, if this refers to one.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::Ephemeral { .. } => None,
            Self::Saved { uid, .. } | Self::Market { uid, .. } => Some(uid),
        }
    }
}

/// Metadata stored next to every saved file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Display name chosen by the user
    pub file_name: String,
    /// Free-text description
    pub description: String,
    /// Times this file was saved by others through the market
    pub saves: i64,
    /// Tier name recorded at creation; never changes afterwards
    pub tier_used: String,
    /// Unix epoch seconds
    pub date_created: f64,
    /// File UID
    pub uid: String,
}

/// Metadata as found on disk. Every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    file_name: Option<String>,
    description: Option<String>,
    saves: Option<i64>,
    tier_used: Option<String>,
    date_created: Option<f64>,
    uid: Option<String>,
}

impl RawMetadata {
    fn repair(self, stem: &str) -> ArtifactMetadata {
        ArtifactMetadata {
            file_name: self
                .file_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| stem.to_string()),
            description: self.description.unwrap_or_default(),
            saves: self.saves.unwrap_or(0),
            tier_used: self.tier_used.unwrap_or_default(),
            date_created: self.date_created.unwrap_or_else(now_epoch_secs),
            uid: self
                .uid
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| stem.to_string()),
        }
    }
}

/// Current time as fractional Unix epoch seconds.
#[must_use]
pub fn now_epoch_secs() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = chrono::Utc::now().timestamp_millis() as f64;
    millis / 1000.0
}

/// Filesystem-backed store for command files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    /// Serializes metadata read-modify-write cycles across clones.
    metadata_lock: Arc<Mutex<()>>,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of a user's scratch file.
    #[must_use]
    pub fn ephemeral_path(&self, user_id: u64) -> PathBuf {
        self.root.join("temp").join(format!("{user_id}.txt"))
    }

    fn saves_dir(&self, user_id: u64) -> PathBuf {
        self.root.join("saves").join(user_id.to_string())
    }

    /// Path of a saved file's content.
    #[must_use]
    pub fn content_path(&self, user_id: u64, uid: &str) -> PathBuf {
        self.saves_dir(user_id).join(format!("{uid}.txt"))
    }

    /// Path of a saved file's metadata.
    #[must_use]
    pub fn metadata_path(&self, user_id: u64, uid: &str) -> PathBuf {
        self.saves_dir(user_id).join(format!("{uid}.json"))
    }

    /// Path backing an artifact reference.
    #[must_use]
    pub fn path_of(&self, artifact: &ArtifactRef) -> PathBuf {
        match artifact {
            ArtifactRef::Ephemeral { user_id } => self.ephemeral_path(*user_id),
            ArtifactRef::Saved { user_id, uid } => self.content_path(*user_id, uid),
            ArtifactRef::Market { owner_id, uid } => self.content_path(*owner_id, uid),
        }
    }

    /// Reads an artifact's content.
    ///
    /// # Errors
    /// Missing, unreadable, binary and empty files each map to their own error.
    pub async fn read(&self, artifact: &ArtifactRef) -> Result<String> {
        let name = artifact.display_name();
        if let Some(uid) = artifact.uid() {
            check_uid(uid, &name)?;
        }
        let bytes = tokio::fs::read(self.path_of(artifact))
            .await
            .map_err(|e| map_io_error(e, &name))?;

        let text = String::from_utf8(bytes).map_err(|_| Error::ArtifactNotText {
            name: name.clone(),
        })?;
        if text.trim().is_empty() {
            return Err(Error::ArtifactEmpty { name });
        }
        Ok(text)
    }

    /// Replaces an artifact's content wholesale.
    pub async fn write(&self, artifact: &ArtifactRef, content: &str) -> Result<()> {
        let path = self.path_of(artifact);
        write_file(&path, content, &artifact.display_name()).await
    }

    /// Replaces the user's scratch file.
    pub async fn write_ephemeral(&self, user_id: u64, content: &str) -> Result<()> {
        self.write(&ArtifactRef::Ephemeral { user_id }, content)
            .await
    }

    /// Persists a new saved file under a fresh UID.
    ///
    /// The content is written first, then the metadata. If the metadata write
    /// fails the content file is removed so no half-saved file is left behind.
    pub async fn create_saved(
        &self,
        user_id: u64,
        content: &str,
        file_name: &str,
        description: &str,
        tier: Tier,
    ) -> Result<ArtifactMetadata> {
        let uid = Uuid::new_v4().to_string();
        let content_path = self.content_path(user_id, &uid);
        write_file(&content_path, content, &format!("{uid}.txt")).await?;

        let metadata = ArtifactMetadata {
            file_name: file_name.to_string(),
            description: description.to_string(),
            saves: 0,
            tier_used: tier.name().to_string(),
            date_created: now_epoch_secs(),
            uid: uid.clone(),
        };

        if let Err(e) = self.write_metadata(user_id, &metadata).await {
            if let Err(cleanup) = tokio::fs::remove_file(&content_path).await {
                tracing::warn!("Failed to remove orphaned content {content_path:?}: {cleanup}");
            }
            return Err(e);
        }

        tracing::info!(user_id, uid, "Saved file '{file_name}'");
        Ok(metadata)
    }

    async fn write_metadata(&self, user_id: u64, metadata: &ArtifactMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        let path = self.metadata_path(user_id, &metadata.uid);
        write_file(&path, &json, &format!("{}.json", metadata.uid)).await
    }

    /// Reads a saved file's metadata, repairing missing fields in memory.
    ///
    /// # Errors
    /// Returns an error if the file is missing or is not a JSON object.
    pub async fn read_metadata(&self, user_id: u64, uid: &str) -> Result<ArtifactMetadata> {
        check_uid(uid, &format!("{uid}.json"))?;
        let path = self.metadata_path(user_id, uid);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| map_io_error(e, &format!("{uid}.json")))?;
        let raw: RawMetadata = serde_json::from_str(&text)?;
        Ok(raw.repair(uid))
    }

    /// Adds one to a saved file's market save counter and returns the
    /// updated metadata.
    pub async fn record_market_save(&self, owner_id: u64, uid: &str) -> Result<ArtifactMetadata> {
        let _guard = self.metadata_lock.lock().await;
        let mut metadata = self.read_metadata(owner_id, uid).await?;
        metadata.saves += 1;
        self.write_metadata(owner_id, &metadata).await?;
        Ok(metadata)
    }

    /// Lists a user's saved files, newest first.
    ///
    /// Files whose metadata cannot be read are logged and left out.
    pub async fn list_saved(&self, user_id: u64) -> Result<Vec<ArtifactMetadata>> {
        let dir = self.saves_dir(user_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut saves = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.read_metadata(user_id, stem).await {
                Ok(meta) => saves.push(meta),
                Err(e) => tracing::warn!(user_id, "Skipping unreadable metadata {path:?}: {e}"),
            }
        }

        saves.sort_by(|a, b| b.date_created.total_cmp(&a.date_created));
        Ok(saves)
    }
}

/// UIDs become file names, so only a conservative character set is accepted.
fn check_uid(uid: &str, name: &str) -> Result<()> {
    let valid = !uid.is_empty()
        && uid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::ArtifactNotFound {
            name: name.to_string(),
        })
    }
}

fn map_io_error(e: std::io::Error, name: &str) -> Error {
    let name = name.to_string();
    match e.kind() {
        ErrorKind::NotFound => Error::ArtifactNotFound { name },
        ErrorKind::PermissionDenied => Error::ArtifactPermission { name },
        ErrorKind::InvalidData => Error::ArtifactNotText { name },
        _ => Error::Io(e),
    }
}

async fn write_file(path: &Path, content: &str, name: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| map_io_error(e, name))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| map_io_error(e, name))
}
