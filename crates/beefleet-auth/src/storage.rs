use beefleet_core::CredentialError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Environment variable consulted when nothing is stored.
pub const API_KEY_ENV_VAR: &str = "BEE_API_KEY";

const HINT_PREFIX: &str = "...";
const HINT_LEN: usize = 4;

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Saved through the settings endpoint
    Stored,
    /// `BEE_API_KEY` supplied at startup
    Environment,
}

/// Resolution order: a stored value always wins over the environment.
const RESOLUTION_CHAIN: [CredentialSource; 2] =
    [CredentialSource::Stored, CredentialSource::Environment];

/// On-disk settings document. Keys we don't know about are kept on rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// File-backed store for the single Bee Maps API key.
///
/// The file is read once, on first lookup, and kept in memory; `set` writes
/// the file and then refreshes the in-memory copy. Saves replace the whole
/// file through a uniquely named temp file, so overlapping saves never fail
/// and the last one wins.
#[derive(Debug)]
pub struct CredentialStore {
    settings_path: PathBuf,
    fallback: Option<String>,
    settings: RwLock<Option<SettingsFile>>,
}

impl CredentialStore {
    /// Create a store persisting to `settings_path`, with an optional fallback
    /// used when nothing is stored.
    pub fn new(settings_path: impl Into<PathBuf>, fallback: Option<String>) -> Self {
        let fallback = fallback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        Self {
            settings_path: settings_path.into(),
            fallback,
            settings: RwLock::new(None),
        }
    }

    /// Create a store whose fallback is read from `BEE_API_KEY`
    pub fn from_env(settings_path: impl Into<PathBuf>) -> Self {
        Self::new(settings_path, std::env::var(API_KEY_ENV_VAR).ok())
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Walk the resolution chain and return the first non-empty credential.
    pub fn resolve(&self) -> Option<(CredentialSource, String)> {
        RESOLUTION_CHAIN.iter().find_map(|source| {
            let value = match source {
                CredentialSource::Stored => self.stored(),
                CredentialSource::Environment => self.fallback.clone(),
            };
            value
                .filter(|v| !v.is_empty())
                .map(|v| (*source, v))
        })
    }

    /// The active credential, or an empty string when none is configured.
    pub fn get(&self) -> String {
        self.resolve().map(|(_, key)| key).unwrap_or_default()
    }

    pub fn has_key(&self) -> bool {
        self.resolve().is_some()
    }

    /// Persist `value` (trimmed), replacing whatever was stored before.
    ///
    /// # Errors
    /// `InvalidInput` when the value is blank, `Storage` when the file cannot be written.
    pub fn set(&self, value: &str) -> Result<(), CredentialError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::InvalidInput("apiKey is required".to_string()));
        }

        // Held across the write so concurrent saves don't lose each other's extra keys.
        let mut cached = self.settings.write();
        let mut settings = match cached.as_ref() {
            Some(settings) => settings.clone(),
            None => self.load(),
        };
        settings.api_key = Some(trimmed.to_string());
        self.save(&settings)?;
        *cached = Some(settings);

        tracing::info!("Stored API key in {}", self.settings_path.display());
        Ok(())
    }

    /// Masked form of the active credential, e.g. `"...wxyz"`; empty when unset.
    pub fn hint(&self) -> String {
        let key = self.get();
        if key.is_empty() {
            return String::new();
        }
        format!("{}{}", HINT_PREFIX, last_chars(&key, HINT_LEN))
    }

    fn stored(&self) -> Option<String> {
        if let Some(settings) = self.settings.read().as_ref() {
            return settings.api_key.clone();
        }

        self.settings
            .write()
            .get_or_insert_with(|| self.load())
            .api_key
            .clone()
    }

    fn load(&self) -> SettingsFile {
        let json = match fs::read_to_string(&self.settings_path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SettingsFile::default(),
            Err(e) => {
                tracing::warn!(
                    "Failed to read settings file {}: {}",
                    self.settings_path.display(),
                    e
                );
                return SettingsFile::default();
            }
        };

        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed settings file {}: {}",
                    self.settings_path.display(),
                    e
                );
                SettingsFile::default()
            }
        }
    }

    fn save(&self, settings: &SettingsFile) -> Result<(), CredentialError> {
        let dir = self
            .settings_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        fs::create_dir_all(dir).map_err(|e| {
            CredentialError::Storage(format!("failed to create {}: {}", dir.display(), e))
        })?;

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| CredentialError::Storage(format!("failed to serialize settings: {}", e)))?;

        // Full-file replace: write a private temp file, then rename it over the old one.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
            CredentialError::Storage(format!("failed to create temp file in {}: {}", dir.display(), e))
        })?;
        tmp.write_all(json.as_bytes()).map_err(|e| {
            CredentialError::Storage(format!("failed to write {}: {}", tmp.path().display(), e))
        })?;
        tmp.persist(&self.settings_path).map_err(|e| {
            CredentialError::Storage(format!(
                "failed to replace {}: {}",
                self.settings_path.display(),
                e.error
            ))
        })?;

        Ok(())
    }
}

fn last_chars(s: &str, n: usize) -> &str {
    let start = s
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, fallback: Option<&str>) -> CredentialStore {
        CredentialStore::new(
            dir.path().join("data").join("settings.json"),
            fallback.map(String::from),
        )
    }

    #[test]
    fn test_empty_when_nothing_configured() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        assert_eq!(store.get(), "");
        assert_eq!(store.hint(), "");
        assert!(!store.has_key());
        assert!(store.resolve().is_none());
    }

    #[test]
    fn test_set_trims_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store.set("  secret-key-1234 ").unwrap();
        assert_eq!(store.get(), "secret-key-1234");

        // A fresh instance (as after a restart) sees the same value.
        let reopened = store_in(&dir, None);
        assert_eq!(reopened.get(), "secret-key-1234");
    }

    #[test]
    fn test_directory_created_lazily() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        assert!(!dir.path().join("data").exists());
        let _ = store.get();
        assert!(!dir.path().join("data").exists());
        store.set("abcd").unwrap();
        assert!(store.settings_path().exists());
    }

    #[test]
    fn test_blank_values_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        assert!(matches!(store.set(""), Err(CredentialError::InvalidInput(_))));
        assert!(matches!(store.set("   "), Err(CredentialError::InvalidInput(_))));
        assert!(!store.settings_path().exists());
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store.set("first-key").unwrap();
        store.set("second-key").unwrap();
        assert_eq!(store.get(), "second-key");
    }

    #[test]
    fn test_stored_value_wins_over_environment() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Some("env-key-9999"));
        assert_eq!(
            store.resolve(),
            Some((CredentialSource::Environment, "env-key-9999".to_string()))
        );

        store.set("stored-key-0000").unwrap();
        assert_eq!(
            store.resolve(),
            Some((CredentialSource::Stored, "stored-key-0000".to_string()))
        );
    }

    #[test]
    fn test_blank_fallback_is_unset() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Some("  "));
        assert!(!store.has_key());
    }

    #[test]
    fn test_empty_stored_value_falls_through() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Some("env-key"));
        fs::create_dir_all(store.settings_path().parent().unwrap()).unwrap();
        fs::write(store.settings_path(), r#"{"apiKey": ""}"#).unwrap();
        assert_eq!(store.get(), "env-key");
    }

    #[test]
    fn test_hint_masks_all_but_last_four() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store.set("sk_live_abcdefWXYZ").unwrap();
        assert_eq!(store.hint(), "...WXYZ");
    }

    #[test]
    fn test_hint_for_short_key() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store.set(" abc ").unwrap();
        assert_eq!(store.get(), "abc");
        assert_eq!(store.hint(), "...abc");
    }

    #[test]
    fn test_hint_counts_characters_not_bytes() {
        assert_eq!(last_chars("clé-ünï", 4), "-ünï");
        assert_eq!(last_chars("ab", 4), "ab");
    }

    #[test]
    fn test_unknown_settings_keys_preserved() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        fs::create_dir_all(store.settings_path().parent().unwrap()).unwrap();
        fs::write(store.settings_path(), r#"{"theme": "dark"}"#).unwrap();

        store.set("new-key").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.settings_path()).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["apiKey"], "new-key");
    }

    #[test]
    fn test_concurrent_saves_all_succeed() {
        let dir = TempDir::new().unwrap();
        let store = &store_in(&dir, None);
        let keys: Vec<String> = (0..8).map(|i| format!("key-{:04}", i)).collect();

        for _ in 0..20 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = keys
                    .iter()
                    .map(|key| scope.spawn(move || store.set(key)))
                    .collect();
                for handle in handles {
                    assert!(handle.join().unwrap().is_ok());
                }
            });
            assert!(keys.contains(&store.get()));
        }

        let on_disk = store_in(&dir, None);
        assert!(keys.contains(&on_disk.get()));
    }

    #[test]
    fn test_saves_from_separate_stores_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let stores: Vec<CredentialStore> = (0..6).map(|_| store_in(&dir, None)).collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = stores
                .iter()
                .enumerate()
                .map(|(i, store)| scope.spawn(move || store.set(&format!("store-{}", i))))
                .collect();
            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });

        let reopened = store_in(&dir, None);
        assert!(reopened.get().starts_with("store-"));
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("settings.json")]);
    }

    #[test]
    fn test_settings_file_read_once() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        fs::create_dir_all(store.settings_path().parent().unwrap()).unwrap();
        fs::write(store.settings_path(), r#"{"apiKey": "from-disk"}"#).unwrap();
        assert_eq!(store.get(), "from-disk");

        // Later lookups are served from memory.
        fs::remove_file(store.settings_path()).unwrap();
        assert_eq!(store.get(), "from-disk");

        store.set("replaced").unwrap();
        assert_eq!(store.get(), "replaced");
        assert!(store.settings_path().exists());
    }

    #[test]
    fn test_malformed_settings_treated_as_empty_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        fs::create_dir_all(store.settings_path().parent().unwrap()).unwrap();
        fs::write(store.settings_path(), "{not json").unwrap();

        assert_eq!(store.get(), "");
        store.set("recovered").unwrap();
        assert_eq!(store.get(), "recovered");
    }
}
