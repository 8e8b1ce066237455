//! Connection profile management.
//!
//! Profiles are stored in `~/.kvsweep/config.yaml`, kubectl style: a map of
//! named contexts plus the name of the current one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kvsweep_session::{ConnectionIntent, Credential, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Default configuration directory name under the home directory.
pub const DEFAULT_BASE_DIR: &str = ".kvsweep";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Profile configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Name of the currently active context.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_context: String,

    /// Named connection profiles.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contexts: BTreeMap<String, Profile>,

    #[serde(skip)]
    config_path: PathBuf,
}

/// How to reach one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Context name. Not stored; filled in from the map key on load.
    #[serde(skip)]
    pub name: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub db: u32,

    /// ACL username (optional).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    #[serde(default)]
    pub tls: bool,

    /// Verify the server certificate and hostname. Only used with `tls`.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// PEM bundle of trusted CAs. Empty means the bundled public roots.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_bundle_path: String,

    /// Speak RESP2 without `HELLO`.
    #[serde(default)]
    pub legacy_protocol: bool,

    /// Command timeout in seconds. Zero waits indefinitely.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            db: 0,
            username: String::new(),
            password: String::new(),
            tls: false,
            tls_verify: true,
            ca_bundle_path: String::new(),
            legacy_protocol: false,
            timeout: 0,
        }
    }
}

impl Profile {
    /// Name shown to the operator, and typed back to confirm a flush.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Custom ({}:{})", self.host, self.port)
        } else {
            self.name.to_uppercase()
        }
    }

    /// Build the connection intent this profile describes.
    pub fn to_intent(&self) -> ConnectionIntent {
        let mut intent = ConnectionIntent::new(self.host.clone(), self.port)
            .with_db(self.db)
            .with_tls(self.tls)
            .with_tls_verify(self.tls_verify)
            .with_legacy_protocol(self.legacy_protocol);

        if !self.password.is_empty() {
            let mut credential = Credential::password(self.password.clone());
            if !self.username.is_empty() {
                credential = credential.with_username(self.username.clone());
            }
            intent = intent.with_credential(credential);
        }
        if !self.ca_bundle_path.is_empty() {
            intent = intent.with_ca_bundle(&self.ca_bundle_path);
        }
        if self.timeout > 0 {
            intent = intent.with_command_timeout(Some(Duration::from_secs(self.timeout)));
        }
        intent
    }

    /// Copy with the password masked, for display.
    pub fn masked(&self) -> Self {
        Self {
            password: mask_secret(&self.password),
            ..self.clone()
        }
    }
}

impl Config {
    /// Gets the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Saves the configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Adds or replaces a context.
    pub fn add_context(&mut self, name: &str, mut profile: Profile) -> anyhow::Result<()> {
        if name.is_empty() {
            anyhow::bail!("context name must not be empty");
        }
        profile.name = name.to_string();
        self.contexts.insert(name.to_string(), profile);
        if self.current_context.is_empty() {
            self.current_context = name.to_string();
        }
        self.save()
    }

    /// Deletes a context.
    pub fn delete_context(&mut self, name: &str) -> anyhow::Result<()> {
        if self.contexts.remove(name).is_none() {
            anyhow::bail!("context '{}' not found", name);
        }
        if self.current_context == name {
            self.current_context.clear();
        }
        self.save()
    }

    /// Sets the current context.
    pub fn use_context(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.contexts.contains_key(name) {
            anyhow::bail!("context '{}' not found", name);
        }
        self.current_context = name.to_string();
        self.save()
    }

    /// Gets a specific context.
    pub fn get_context(&self, name: &str) -> Option<&Profile> {
        self.contexts.get(name)
    }

    /// Gets the current context.
    pub fn get_current_context(&self) -> Option<&Profile> {
        if self.current_context.is_empty() {
            return None;
        }
        self.contexts.get(&self.current_context)
    }

    /// Resolves the context by name, or the current context if no name is given.
    pub fn resolve_context(&self, name: Option<&str>) -> Option<&Profile> {
        match name {
            Some(n) if !n.is_empty() => self.get_context(n),
            _ => self.get_current_context(),
        }
    }

    /// Lists all context names in order.
    pub fn list_contexts(&self) -> Vec<&str> {
        self.contexts.keys().map(String::as_str).collect()
    }
}

/// Loads the configuration from `custom_path` or the default location.
///
/// A missing file yields an empty configuration; nothing is written until
/// the first change.
pub fn load_config(custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path()
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    let mut cfg: Config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                anyhow::anyhow!("invalid config {}: {}", config_path.display(), e)
            })?
        }
    } else {
        Config::default()
    };

    for (name, profile) in cfg.contexts.iter_mut() {
        profile.name = name.clone();
    }
    cfg.config_path = config_path;

    Ok(cfg)
}

/// Masks a secret for display.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
    }
}
