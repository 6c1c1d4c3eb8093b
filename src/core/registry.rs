//! Command registry and loader.
//!
//! Handlers are compiled in and registered under a name. Whether a handler is
//! available, and in which set (open or restricted), is decided by manifest files
//! on disk:
//!
//! ```text
//! commands/
//!   open/role_create_command.toml
//!   restricted/message_send_command.toml
//! ```
//!
//! A manifest names the compiled-in entry point it binds to. Manifests are
//! re-read on every [`CommandRegistry::resolve`], so moving a file between the
//! two directories or editing it takes effect without a restart.

use crate::core::{parser::Arguments, tier::Classification};
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

const MANIFEST_SUFFIX: &str = "_command.toml";

/// Failure reported by a handler. Every variant fails only the current statement.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A required argument was not supplied
    #[error("missing required argument `{name}`")]
    MissingArgument {
        /// Argument name
        name: String,
    },
    /// An argument could not be interpreted
    #[error("invalid value for `{name}`: {reason}")]
    InvalidArgument {
        /// Argument name
        name: String,
        /// Why the value was rejected
        reason: String,
    },
    /// A referenced Discord object does not exist
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing object
        what: String,
    },
    /// Discord rejected the request
    #[error("Discord error: {0}")]
    Discord(String),
    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl Arguments {
    /// Returns the value for `key` or a [`HandlerError::MissingArgument`].
    pub fn require(&self, key: &str) -> Result<&str, HandlerError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| HandlerError::MissingArgument {
                name: key.to_string(),
            })
    }
}

/// A pluggable unit of executable logic bound to one command name.
///
/// `C` is the execution context: caller identity plus whatever the handler needs
/// to act on the outside world.
#[async_trait]
pub trait CommandHandler<C>: Send + Sync {
    /// Runs the command. Side effects are the handler's own business.
    async fn execute(&self, ctx: &C, args: &Arguments) -> Result<(), HandlerError>;
}

/// Why a command name could not be resolved.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No manifest in either set
    #[error("Command '{name}' not found.")]
    NotFound {
        /// Normalized name
        name: String,
    },
    /// A manifest exists but does not parse
    #[error("Command '{name}' has an invalid manifest.")]
    InvalidManifest {
        /// Normalized name
        name: String,
        /// Manifest file
        path: PathBuf,
        /// Parse or read error
        reason: String,
    },
    /// The manifest binds to an entry point that is not compiled in
    #[error("Command '{name}' has no usable entry point.")]
    NoEntryPoint {
        /// Normalized name
        name: String,
        /// Entry point the manifest asked for
        entry: String,
    },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    entry: Option<String>,
    #[serde(default)]
    description: String,
}

struct CatalogEntry<C> {
    handler: Arc<dyn CommandHandler<C>>,
    default_set: Classification,
    description: String,
}

/// A handler found by [`CommandRegistry::resolve`].
pub struct ResolvedCommand<C> {
    /// Normalized command name
    pub name: String,
    /// Set the manifest was found in
    pub classification: Classification,
    /// Manifest description
    pub description: String,
    /// The handler itself
    pub handler: Arc<dyn CommandHandler<C>>,
}

impl<C> Clone for ResolvedCommand<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            classification: self.classification,
            description: self.description.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Keyed collection of command handlers backed by manifest directories.
pub struct CommandRegistry<C> {
    root: PathBuf,
    catalog: HashMap<String, CatalogEntry<C>>,
    loaded: RwLock<HashMap<String, ResolvedCommand<C>>>,
}

/// Lower-cases a command name and strips everything but ASCII letters, digits
/// and underscores.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Whether normalizing did more than lowercase the name.
fn strips_characters(name: &str, normalized: &str) -> bool {
    normalized != name.to_lowercase()
}

impl<C> CommandRegistry<C> {
    /// Creates an empty registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            catalog: HashMap::new(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a compiled-in handler. `default_set` is where
    /// [`seed_manifests`](Self::seed_manifests) places its manifest.
    pub fn register(
        &mut self,
        name: &str,
        default_set: Classification,
        description: &str,
        handler: Arc<dyn CommandHandler<C>>,
    ) {
        self.catalog.insert(
            normalize_name(name),
            CatalogEntry {
                handler,
                default_set,
                description: description.to_string(),
            },
        );
    }

    fn set_dir(&self, set: Classification) -> PathBuf {
        self.root.join(set.dir_name())
    }

    fn manifest_path(&self, set: Classification, name: &str) -> PathBuf {
        self.set_dir(set).join(format!("{name}{MANIFEST_SUFFIX}"))
    }

    async fn ensure_dirs(&self) -> std::io::Result<()> {
        for set in [Classification::Open, Classification::Restricted] {
            tokio::fs::create_dir_all(self.set_dir(set)).await?;
        }
        Ok(())
    }

    /// Resolves a command name to its handler and classification.
    ///
    /// The open set is searched before the restricted set. A successful lookup
    /// replaces any cached entry for the name.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedCommand<C>, ResolveError> {
        let normalized = normalize_name(name);
        if strips_characters(name, &normalized) {
            tracing::info!("Normalized command name '{name}' to '{normalized}'");
        }

        if let Err(e) = self.ensure_dirs().await {
            tracing::error!("Failed to create command directories under {:?}: {e}", self.root);
        }

        for set in [Classification::Open, Classification::Restricted] {
            let path = self.manifest_path(set, &normalized);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }

            let resolved = self.load(&normalized, set, &path).await.inspect_err(|e| {
                tracing::error!("Failed to load command '{normalized}' from {path:?}: {e:?}");
            })?;
            self.cache(resolved.clone());
            return Ok(resolved);
        }

        tracing::debug!("Command '{normalized}' not found in any handler set");
        Err(ResolveError::NotFound { name: normalized })
    }

    async fn load(
        &self,
        name: &str,
        set: Classification,
        path: &Path,
    ) -> Result<ResolvedCommand<C>, ResolveError> {
        let invalid = |reason: String| ResolveError::InvalidManifest {
            name: name.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| invalid(e.to_string()))?;
        let manifest: Manifest = toml::from_str(&text).map_err(|e| invalid(e.to_string()))?;

        let entry = manifest
            .entry
            .as_deref()
            .map_or_else(|| name.to_string(), normalize_name);
        let catalog = self
            .catalog
            .get(&entry)
            .ok_or_else(|| ResolveError::NoEntryPoint {
                name: name.to_string(),
                entry: entry.clone(),
            })?;

        let description = if manifest.description.is_empty() {
            catalog.description.clone()
        } else {
            manifest.description
        };

        Ok(ResolvedCommand {
            name: name.to_string(),
            classification: set,
            description,
            handler: Arc::clone(&catalog.handler),
        })
    }

    fn cache(&self, resolved: ResolvedCommand<C>) {
        match self.loaded.write() {
            Ok(mut loaded) => {
                loaded.insert(resolved.name.clone(), resolved);
            }
            Err(e) => tracing::error!("Command cache lock poisoned: {e}"),
        }
    }

    /// Clears the cache and loads every manifest in both sets.
    ///
    /// Returns how many commands loaded. Broken manifests are logged and skipped.
    /// When a name exists in both sets the open one wins, matching `resolve`.
    pub async fn reload(&self) -> std::io::Result<usize> {
        self.ensure_dirs().await?;
        if let Ok(mut loaded) = self.loaded.write() {
            loaded.clear();
        }

        let mut count = 0;
        for set in [Classification::Open, Classification::Restricted] {
            let mut entries = tokio::fs::read_dir(self.set_dir(set)).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name();
                let Some(name) = file_name
                    .to_str()
                    .and_then(|n| n.strip_suffix(MANIFEST_SUFFIX))
                else {
                    continue;
                };
                match self.resolve(name).await {
                    Ok(resolved) if resolved.classification == set => count += 1,
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping command '{name}' during reload: {e}"),
                }
            }
        }

        tracing::info!("Loaded {count} commands from {:?}", self.root);
        Ok(count)
    }

    /// Writes a manifest into its default set for every compiled-in handler that
    /// has none in either set. Returns the names seeded.
    pub async fn seed_manifests(&self) -> std::io::Result<Vec<String>> {
        self.ensure_dirs().await?;

        let mut seeded = Vec::new();
        for (name, entry) in &self.catalog {
            let paths = [Classification::Open, Classification::Restricted]
                .map(|set| self.manifest_path(set, name));
            let mut present = false;
            for path in paths {
                present |= tokio::fs::try_exists(&path).await?;
            }
            if present {
                continue;
            }

            let manifest = format!(
                "entry = {:?}\ndescription = {:?}\n",
                name, entry.description
            );
            tokio::fs::write(self.manifest_path(entry.default_set, name), manifest).await?;
            seeded.push(name.clone());
        }

        seeded.sort();
        if !seeded.is_empty() {
            tracing::info!("Seeded command manifests: {}", seeded.join(", "));
        }
        Ok(seeded)
    }

    /// Commands loaded so far, sorted by name.
    #[must_use]
    pub fn available(&self) -> Vec<(String, Classification, String)> {
        let Ok(loaded) = self.loaded.read() else {
            return Vec::new();
        };
        let mut list: Vec<_> = loaded
            .values()
            .map(|r| (r.name.clone(), r.classification, r.description.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }
}
