//! Layered configuration for the audio repository.
//!
//! Values merge lowest-to-highest precedence: built-in defaults, a TOML
//! file (an explicit path, or the platform config directory), then
//! `RESOUND_*` environment variables (`__` separates nesting, e.g.
//! `RESOUND_GC__MAX_BYTES`). The merged result is validated before use so
//! tier roots can never silently overlap.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use resound_store::gc::{GcBudget, GcFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cache budget: 256 MiB.
const DEFAULT_GC_MAX_BYTES: u64 = 256 * 1024 * 1024;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "literacybridge", "resound")
}

/// Garbage collector settings for the local cache tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcSettings {
    /// Size the local cache is trimmed back towards.
    pub max_bytes: u64,
    /// When set, only files with these extensions are eviction candidates.
    pub extensions: Option<Vec<String>>,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_GC_MAX_BYTES, extensions: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root of the disposable local cache tier.
    pub local_cache_root: PathBuf,
    /// Root of the shared durable store.
    pub shared_root: PathBuf,
    /// Root of the sandbox overlay; absent means no sandboxing.
    pub sandbox_root: Option<PathBuf>,
    /// Explicit converter binary; absent means discover from `PATH`.
    pub converter: Option<PathBuf>,
    #[serde(default)]
    pub gc: GcSettings,
    /// Metadata sidecar location; defaults to a file beside the local cache
    /// content.
    pub metadata_path: Option<PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let (cache, data) = match project_dirs() {
            Some(dirs) => (dirs.cache_dir().to_path_buf(), dirs.data_dir().to_path_buf()),
            // Headless environments without a home directory.
            None => {
                let base = std::env::temp_dir().join("resound");
                (base.join("cache"), base.join("data"))
            },
        };
        Self {
            local_cache_root: cache.join("content"),
            shared_root: data.join("shared"),
            sandbox_root: None,
            converter: None,
            gc: GcSettings::default(),
            metadata_path: None,
        }
    }
}

impl RepositoryConfig {
    /// Where the metadata sidecar lives (explicit, or derived from the
    /// local cache root).
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_path.clone().unwrap_or_else(|| self.local_cache_root.join("metadata.json"))
    }

    /// The GC budget these settings describe.
    pub fn gc_budget(&self) -> GcBudget {
        let budget = GcBudget::new(self.gc.max_bytes);
        match &self.gc.extensions {
            Some(extensions) => budget.with_filter(GcFilter::Extensions(extensions.clone())),
            None => budget,
        }
    }

    /// Tier roots must be absolute and mutually disjoint: every tier owns
    /// its files outright, so no root may contain another.
    fn validate(&self) -> Result<()> {
        let mut roots = vec![("local_cache_root", &self.local_cache_root), ("shared_root", &self.shared_root)];
        if let Some(sandbox) = &self.sandbox_root {
            roots.push(("sandbox_root", sandbox));
        }
        for (name, root) in &roots {
            if !root.is_absolute() {
                exn::bail!(ErrorKind::Invalid(format!("{name} must be an absolute path")));
            }
        }
        for (a_name, a) in &roots {
            for (b_name, b) in &roots {
                if a_name != b_name && a.starts_with(b) {
                    exn::bail!(ErrorKind::Invalid(format!(
                        "tier roots must be disjoint: {a_name} lies inside {b_name}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The default config file location for this platform.
fn default_config_file() -> Option<PathBuf> {
    Some(project_dirs()?.config_dir().join("config.toml"))
}

/// Load, merge, and validate configuration.
///
/// With an explicit `path` the file must exist; otherwise the platform
/// config file is merged only when present.
pub fn load(path: Option<&Path>) -> Result<RepositoryConfig> {
    let mut figment = Figment::from(Serialized::defaults(RepositoryConfig::default()));
    match path {
        Some(path) => figment = figment.merge(Toml::file_exact(path)),
        None => {
            if let Some(path) = default_config_file() {
                tracing::debug!(path = %path.display(), "Merging platform config file if present");
                figment = figment.merge(Toml::file(path));
            }
        },
    }
    let config: RepositoryConfig =
        figment.merge(Env::prefixed("RESOUND_").split("__")).extract().map_err(ErrorKind::Figment)?;
    config.validate()?;
    Ok(config)
}
