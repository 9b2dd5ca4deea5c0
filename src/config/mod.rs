//! Named configuration profiles.
//!
//! Profiles are persisted as a single JSON object mapping profile name to
//! configuration, stored at a user-chosen path (default `~/.gabble.json`).
//! Writes go through a temp file and an atomic rename; the file is
//! user-readable only.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default UDP listen spec when none is configured.
pub const DEFAULT_LISTEN: &str = ":4000";

/// The profile name reserved for the implicit base configuration.
const DEFAULT_PROFILE: &str = "default";

/// Errors from the profile store.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Profile names must be non-empty.
    #[error("config name cannot be empty")]
    EmptyName,

    /// "default" is written through [`Store::save_default`] only.
    #[error("config name \"default\" is reserved")]
    ReservedName,

    /// The requested profile does not exist.
    #[error("unknown config {0:?}")]
    UnknownProfile(String),

    /// The store file could not be read or written.
    #[error("config store: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not valid JSON.
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Chat runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Display name shown to peers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// UDP listen spec, e.g. `":4000"` or `"127.0.0.1:4000"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub listen: String,
    /// Shared secret; empty disables encryption.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    /// Bootstrap peer specs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<String>,
}

/// Access to persisted configurations.
pub trait Store: Send + Sync {
    /// The implicit base profile, if one has been saved.
    fn default_profile(&self) -> Option<Config>;

    /// A named profile, if present.
    fn load(&self, name: &str) -> Option<Config>;

    /// Persist a named profile. Rejects empty and reserved names.
    fn save(&self, name: &str, cfg: Config) -> Result<(), ConfigError>;

    /// Persist the implicit base profile.
    fn save_default(&self, cfg: Config) -> Result<(), ConfigError>;
}

/// JSON-file-backed profile store.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, Config>>,
}

impl FileStore {
    /// Open or create a store at the given path. A missing file is an
    /// empty store; a malformed one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut data = HashMap::new();
        match fs::read(&path) {
            Ok(bytes) => data = serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ConfigError::Io(err)),
        }
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// The path this store persists to.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn persist(&self, data: &HashMap<String, Config>) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::DirBuilderExt;
                    fs::DirBuilder::new()
                        .recursive(true)
                        .mode(0o755)
                        .create(dir)?;
                }
                #[cfg(not(unix))]
                fs::create_dir_all(dir)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(data)?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, &bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&tmp)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp, perms)?;
        }

        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(ConfigError::Io(err));
        }
        Ok(())
    }
}

impl Store for FileStore {
    fn default_profile(&self) -> Option<Config> {
        let data = self.data.lock().expect("config store lock poisoned");
        data.get(DEFAULT_PROFILE).cloned()
    }

    fn load(&self, name: &str) -> Option<Config> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        let data = self.data.lock().expect("config store lock poisoned");
        data.get(trimmed).cloned()
    }

    fn save(&self, name: &str, cfg: Config) -> Result<(), ConfigError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if trimmed.eq_ignore_ascii_case(DEFAULT_PROFILE) {
            return Err(ConfigError::ReservedName);
        }
        let mut data = self.data.lock().expect("config store lock poisoned");
        data.insert(trimmed.to_string(), clean(cfg));
        self.persist(&data)
    }

    fn save_default(&self, cfg: Config) -> Result<(), ConfigError> {
        let mut data = self.data.lock().expect("config store lock poisoned");
        data.insert(DEFAULT_PROFILE.to_string(), clean(cfg));
        self.persist(&data)
    }
}

fn clean(mut cfg: Config) -> Config {
    cfg.peers = merge_peers(&[std::mem::take(&mut cfg.peers)]);
    cfg
}

/// Merge the default profile with a named one.
///
/// An empty name (or "default") resolves to the base profile alone. A
/// missing store only resolves the empty name.
pub fn resolve_profile(store: Option<&dyn Store>, name: &str) -> Result<Config, ConfigError> {
    let mut merged = Config::default();
    let trimmed = name.trim();

    match store {
        Some(store) => {
            if let Some(base) = store.default_profile() {
                merged = merge(merged, base);
            }
            if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(DEFAULT_PROFILE) {
                let cfg = store
                    .load(trimmed)
                    .ok_or_else(|| ConfigError::UnknownProfile(trimmed.to_string()))?;
                merged = merge(merged, cfg);
            }
        }
        None if !trimmed.is_empty() => {
            return Err(ConfigError::UnknownProfile(trimmed.to_string()));
        }
        None => {}
    }

    Ok(normalize(merged))
}

/// Overlay non-empty fields from `overlay` onto `base`, merging peers.
pub fn merge(base: Config, overlay: Config) -> Config {
    let peers = merge_peers(&[base.peers.clone(), overlay.peers]);
    Config {
        name: if overlay.name.is_empty() {
            base.name
        } else {
            overlay.name
        },
        listen: if overlay.listen.is_empty() {
            base.listen
        } else {
            overlay.listen
        },
        secret: if overlay.secret.is_empty() {
            base.secret
        } else {
            overlay.secret
        },
        peers,
    }
}

/// Fill in default values and deduplicate peers.
pub fn normalize(cfg: Config) -> Config {
    let mut cfg = cfg;
    if cfg.listen.is_empty() {
        cfg.listen = DEFAULT_LISTEN.to_string();
    }
    if cfg.name.is_empty() {
        cfg.name = default_name();
    }
    cfg.peers = merge_peers(&[cfg.peers]);
    cfg
}

/// Merge peer lists, dropping blanks and duplicates while keeping order.
pub fn merge_peers(lists: &[Vec<String>]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for peer in list {
            let peer = peer.trim();
            if peer.is_empty() || !seen.insert(peer.to_string()) {
                continue;
            }
            merged.push(peer.to_string());
        }
    }
    merged
}

/// Build a [`Config`] from runtime state.
pub fn snapshot(name: &str, listen: &str, secret: &str, lists: &[Vec<String>]) -> Config {
    Config {
        name: name.to_string(),
        listen: listen.to_string(),
        secret: secret.to_string(),
        peers: merge_peers(lists),
    }
}

/// Human-friendly summary lines for display.
pub fn summary(cfg: &Config) -> Vec<String> {
    let mut lines = vec![
        format!("  name: {}", cfg.name),
        format!("  listen: {}", cfg.listen),
    ];
    if cfg.secret.is_empty() {
        lines.push("  encryption: disabled".to_string());
    } else {
        lines.push("  encryption: enabled".to_string());
    }
    if cfg.peers.is_empty() {
        lines.push("  peers: none configured yet".to_string());
    } else {
        lines.push(format!("  peers: {}", cfg.peers.join(", ")));
    }
    lines
}

/// The default store path in the user's home directory.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".gabble.json")
}

fn default_name() -> String {
    if let Ok(user) = env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("anon-{}", now % 1000)
}
