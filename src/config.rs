// NetStorage Configuration Module
// Persistent connection settings with environment overrides

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::providers::{NetStorageConfig, StoreKind};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "NETSTORAGE_";

/// Stored NetStorage connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetStorageSettings {
    /// Upload host, e.g. example-nsu.akamaihd.net
    #[serde(default)]
    pub host: String,
    /// Account cp-code
    #[serde(default)]
    pub cp_code: String,
    /// Upload account key name
    #[serde(default)]
    pub key_name: String,
    /// Upload account key. Prefer NETSTORAGE_KEY over storing it here
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    /// Virtual root below the cp-code
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub store_kind: StoreKind,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_use_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for NetStorageSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            cp_code: String::new(),
            key_name: String::new(),
            key: String::new(),
            path_prefix: None,
            store_kind: StoreKind::default(),
            use_tls: default_use_tls(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NetStorageSettings {
    /// Apply `NETSTORAGE_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(cp_code) = var("CP_CODE") {
            self.cp_code = cp_code;
        }
        if let Some(key_name) = var("KEY_NAME") {
            self.key_name = key_name;
        }
        if let Some(key) = var("KEY") {
            self.key = key;
        }
        if let Some(prefix) = var("PATH_PREFIX") {
            self.path_prefix = Some(prefix);
        }
        if let Some(kind) = var("STORE_KIND") {
            self.store_kind = StoreKind::parse(&kind)
                .ok_or_else(|| format!("{}STORE_KIND: unknown store kind '{}'", ENV_PREFIX, kind))?;
        }
        if let Some(tls) = var("USE_TLS") {
            self.use_tls = match tls.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => return Err(format!("{}USE_TLS: expected a boolean, got '{}'", ENV_PREFIX, other)),
            };
        }
        if let Some(timeout) = var("TIMEOUT_SECS") {
            self.timeout_secs = timeout
                .parse()
                .map_err(|e| format!("{}TIMEOUT_SECS: {}", ENV_PREFIX, e))?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), String> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Copy safe to print: the key is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.key.is_empty() {
            copy.key = "********".to_string();
        }
        copy
    }
}

/// Get the path to the settings file
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("netstorage").join("config.json")
}

/// Load settings from a file, falling back to defaults
pub fn load_settings_from(path: &Path) -> NetStorageSettings {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => return settings,
                Err(e) => {
                    tracing::warn!("Failed to parse NetStorage config {:?}: {}", path, e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read NetStorage config {:?}: {}", path, e);
            }
        }
    }

    NetStorageSettings::default()
}

/// Load settings from the default location and apply environment overrides
pub fn load_settings() -> Result<NetStorageSettings, String> {
    let mut settings = load_settings_from(&config_path());
    settings.apply_env()?;
    Ok(settings)
}

/// Save settings to a file
pub fn save_settings_to(settings: &NetStorageSettings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, content)
        .map_err(|e| format!("Failed to write config: {}", e))?;

    // the file may hold the upload key
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| format!("Failed to restrict config permissions: {}", e))?;
    }

    tracing::info!("NetStorage config saved to {:?}", path);
    Ok(())
}

/// Save settings to the default location
pub fn save_settings(settings: &NetStorageSettings) -> Result<(), String> {
    save_settings_to(settings, &config_path())
}

/// Validate settings before building a provider
pub fn validate_settings(settings: &NetStorageSettings) -> Result<(), String> {
    if settings.host.trim().is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    let cp_code = settings.cp_code.trim_matches('/');
    if cp_code.is_empty() {
        return Err("cp_code cannot be empty".to_string());
    }
    if !cp_code.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("cp_code must be numeric, got '{}'", settings.cp_code));
    }

    if settings.key_name.is_empty() {
        return Err("Key name cannot be empty".to_string());
    }
    if settings.key.is_empty() {
        return Err(format!("Upload key is missing (set it in the config or {}KEY)", ENV_PREFIX));
    }

    if let Some(prefix) = &settings.path_prefix {
        if prefix.split(|c| c == '/' || c == '\\').any(|segment| segment == "..") {
            return Err("Path prefix cannot contain '..'".to_string());
        }
    }

    if settings.timeout_secs == 0 {
        return Err("Timeout must be at least one second".to_string());
    }

    Ok(())
}

impl NetStorageConfig {
    /// Validate settings and turn them into the runtime configuration
    pub fn from_settings(settings: &NetStorageSettings) -> Result<Self, String> {
        validate_settings(settings)?;
        Ok(Self {
            host: settings.host.trim().to_string(),
            cp_code: settings.cp_code.trim_matches('/').to_string(),
            key_name: settings.key_name.clone(),
            key: secrecy::SecretString::from(settings.key.clone()),
            path_prefix: settings.path_prefix.clone().filter(|p| !p.trim_matches('/').is_empty()),
            store_kind: settings.store_kind,
            use_tls: settings.use_tls,
            timeout_secs: settings.timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn complete() -> NetStorageSettings {
        NetStorageSettings {
            host: "example-nsu.akamaihd.net".to_string(),
            cp_code: "123456".to_string(),
            key_name: "key-name".to_string(),
            key: "secret".to_string(),
            path_prefix: Some("/test".to_string()),
            store_kind: StoreKind::FileStore,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = NetStorageSettings::default();
        assert!(settings.use_tls);
        assert_eq!(settings.timeout_secs, 120);
        assert_eq!(settings.store_kind, StoreKind::ObjectStore);
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_validate_settings() {
        assert!(validate_settings(&complete()).is_ok());

        let mut bad = complete();
        bad.cp_code = "abc".to_string();
        assert!(validate_settings(&bad).is_err());

        let mut bad = complete();
        bad.key = String::new();
        assert!(validate_settings(&bad).unwrap_err().contains("NETSTORAGE_KEY"));

        let mut bad = complete();
        bad.path_prefix = Some("a/../b".to_string());
        assert!(validate_settings(&bad).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        save_settings_to(&complete(), &path).unwrap();
        assert_eq!(load_settings_from(&path), complete());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings_from(&dir.path().join("missing.json")), NetStorageSettings::default());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(load_settings_from(&broken), NetStorageSettings::default());
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let json = r#"{"host": "h.example.net", "cp_code": "1", "key_name": "k", "store_kind": "filestore"}"#;
        let settings: NetStorageSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.store_kind, StoreKind::FileStore);
        assert!(settings.use_tls);
        assert_eq!(settings.timeout_secs, 120);
        assert!(settings.key.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NETSTORAGE_KEY", "from-env"),
            ("NETSTORAGE_STORE_KIND", "file-store"),
            ("NETSTORAGE_USE_TLS", "no"),
            ("NETSTORAGE_TIMEOUT_SECS", "15"),
            ("NETSTORAGE_HOST", ""),
        ]
        .into_iter()
        .collect();

        let mut settings = complete();
        settings.store_kind = StoreKind::ObjectStore;
        settings
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.key, "from-env");
        assert_eq!(settings.store_kind, StoreKind::FileStore);
        assert!(!settings.use_tls);
        assert_eq!(settings.timeout_secs, 15);
        // empty values do not clobber the file
        assert_eq!(settings.host, "example-nsu.akamaihd.net");

        let mut settings = complete();
        assert!(settings
            .apply_overrides(|name| (name == "NETSTORAGE_STORE_KIND").then(|| "ftp".to_string()))
            .is_err());
    }

    #[test]
    fn test_key_is_not_serialized_when_empty_and_redacted_for_display() {
        let mut settings = complete();
        assert_eq!(settings.redacted().key, "********");

        settings.key = String::new();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("\"key\""));
    }

    #[test]
    fn test_runtime_config_from_settings() {
        let config = NetStorageConfig::from_settings(&complete()).unwrap();
        assert_eq!(config.cp_code, "123456");
        assert_eq!(config.key.expose_secret(), "secret");
        assert_eq!(config.path_prefix.as_deref(), Some("/test"));

        let mut root_only = complete();
        root_only.path_prefix = Some("/".to_string());
        assert!(NetStorageConfig::from_settings(&root_only).unwrap().path_prefix.is_none());

        let mut bad = complete();
        bad.host = " ".to_string();
        assert!(NetStorageConfig::from_settings(&bad).is_err());
    }
}
