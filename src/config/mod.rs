//! Credential and token persistence
//!
//! State lives in an env-style `KEY=value` text file so it stays
//! interoperable with the platform's own tooling. The whole file is
//! read at startup; writes rewrite single keys in place and preserve
//! unrelated lines and comments.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{CloudError, Result};

pub const KEY_BASE_URL: &str = "TUYA_BASE_URL";
pub const KEY_ACCESS_ID: &str = "TUYA_ACCESS_ID";
pub const KEY_ACCESS_KEY: &str = "TUYA_ACCESS_KEY";
pub const KEY_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const KEY_REFRESH_TOKEN: &str = "REFRESH_TOKEN";
pub const KEY_TIMESTAMP: &str = "TIMESTAMP";
pub const KEY_SIGNATURE: &str = "SIGNATURE";
pub const KEY_SIGN_METHOD: &str = "SIGN_METHOD";
pub const KEY_NONCE: &str = "NONCE";
pub const KEY_TOKEN_EXPIRY_TIME: &str = "TOKEN_EXPIRY_TIME";
pub const KEY_DEVICE_ID: &str = "DEVICE_ID";

/// Override for the store location (useful for tests and scripts).
const ENV_FILE_VAR: &str = "TUYA_ENV_FILE";

/// One line of the backing file, kept verbatim so a rewrite does not
/// disturb comments or ordering.
#[derive(Debug, Clone)]
enum Line {
    Pair { key: String, value: String },
    Raw(String),
}

/// Env-style key-value store backed by a text file.
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
    lines: Vec<Line>,
}

impl EnvStore {
    /// Resolve the store path: `TUYA_ENV_FILE` override, then a local
    /// `.env`, then the per-user config directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(ENV_FILE_VAR) {
            return Ok(PathBuf::from(path));
        }
        let local = PathBuf::from(".env");
        if local.exists() {
            return Ok(local);
        }
        let proj_dirs = ProjectDirs::from("com", "tuya-cli", "tuya-cli")
            .ok_or_else(|| CloudError::Config("could not determine config directory".into()))?;
        Ok(proj_dirs.config_dir().join("credentials.env"))
    }

    /// Load the store from the default path.
    pub fn load() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Load the store from an explicit path. A missing file yields an
    /// empty store; it is created on first save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                lines: Vec::new(),
            });
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| CloudError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let lines = content.lines().map(parse_line).collect();
        Ok(Self { path, lines })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a key. Empty values read as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Pair { key: k, value } if k == key && !value.is_empty() => Some(value.as_str()),
            _ => None,
        })
    }

    /// Look up a key and parse it as f64 (used for the expiry stamp).
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Set a key in memory, replacing the existing line in place or
    /// appending a new one. Call `save` to persist.
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Pair { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
        }
        self.lines.push(Line::Pair {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Remove a key from the store (token clearing on logout).
    pub fn unset(&mut self, key: &str) {
        self.lines
            .retain(|line| !matches!(line, Line::Pair { key: k, .. } if k == key));
    }

    /// Write the store back to disk, preserving comments and line
    /// order. The file holds credentials, so permissions are
    /// restricted on Unix.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| {
                    CloudError::Config(format!("failed to create {}: {}", dir.display(), e))
                })?;
            }
        }
        let mut content = String::new();
        for line in &self.lines {
            match line {
                Line::Pair { key, value } => {
                    content.push_str(key);
                    content.push('=');
                    content.push_str(value);
                }
                Line::Raw(raw) => content.push_str(raw),
            }
            content.push('\n');
        }
        fs::write(&self.path, content).map_err(|e| {
            CloudError::Config(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .map_err(|e| CloudError::Config(format!("failed to set permissions: {}", e)))?;
        }

        Ok(())
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Raw(raw.to_string());
    }
    match raw.split_once('=') {
        Some((key, value)) => Line::Pair {
            key: key.trim().to_string(),
            value: unquote(value.trim()).to_string(),
        },
        None => Line::Raw(raw.to_string()),
    }
}

/// python-dotenv quotes values on write; accept both forms on read.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> EnvStore {
        EnvStore::open(dir.path().join("creds.env")).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.get(KEY_ACCESS_TOKEN).is_none());
    }

    #[test]
    fn test_set_save_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set(KEY_ACCESS_ID, "client123");
        store.set(KEY_TOKEN_EXPIRY_TIME, "1700000000.5");
        store.save().unwrap();

        let reloaded = EnvStore::open(store.path()).unwrap();
        assert_eq!(reloaded.get(KEY_ACCESS_ID), Some("client123"));
        assert_eq!(reloaded.get_f64(KEY_TOKEN_EXPIRY_TIME), Some(1700000000.5));
    }

    #[test]
    fn test_rewrite_preserves_comments_and_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.env");
        std::fs::write(
            &path,
            "# cloud credentials\nTUYA_ACCESS_ID=abc\n\nACCESS_TOKEN=old\n",
        )
        .unwrap();

        let mut store = EnvStore::open(&path).unwrap();
        store.set(KEY_ACCESS_TOKEN, "new");
        store.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# cloud credentials\nTUYA_ACCESS_ID=abc\n\nACCESS_TOKEN=new\n"
        );
    }

    #[test]
    fn test_quoted_values_read_unquoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.env");
        std::fs::write(&path, "ACCESS_TOKEN='tok'\nNONCE=\"abc\"\n").unwrap();

        let store = EnvStore::open(&path).unwrap();
        assert_eq!(store.get(KEY_ACCESS_TOKEN), Some("tok"));
        assert_eq!(store.get(KEY_NONCE), Some("abc"));
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.env");
        std::fs::write(&path, "REFRESH_TOKEN=\n").unwrap();

        let store = EnvStore::open(&path).unwrap();
        assert!(store.get(KEY_REFRESH_TOKEN).is_none());
    }

    #[test]
    fn test_unset_removes_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set(KEY_ACCESS_TOKEN, "tok");
        store.unset(KEY_ACCESS_TOKEN);
        assert!(store.get(KEY_ACCESS_TOKEN).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set(KEY_ACCESS_KEY, "secret");
        store.save().unwrap();

        let mode = std::fs::metadata(store.path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
