//! CLI settings loaded from a TOML file.
//!
//! Everything here has a working default except the secret key, which must
//! come from the file (inline or as a path to a key file) or from the command
//! line. Example:
//!
//! ```toml
//! key_file = "/etc/thumbtoken/secret.key"
//! quality = 92
//! background = [255, 255, 255]
//! optimizers = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no secret key configured (set `key` or `key_file`)")]
    MissingKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Inline secret key. Takes precedence over `key_file`.
    pub key: Option<String>,
    /// Path to a file whose (trimmed) contents are the secret key.
    pub key_file: Option<PathBuf>,
    /// Default encoding quality for new tokens.
    pub quality: u8,
    /// Background color JPEG output flattens alpha onto.
    pub background: [u8; 3],
    /// Run external optimizers after rendering.
    pub optimizers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key: None,
            key_file: None,
            quality: 95,
            background: [255, 255, 255],
            optimizers: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the secret key bytes: inline value first, then the key file.
    pub fn secret_key(&self) -> Result<Vec<u8>, ConfigError> {
        if let Some(key) = &self.key {
            return Ok(key.as_bytes().to_vec());
        }
        if let Some(path) = &self.key_file {
            let contents = std::fs::read(path).map_err(|source| ConfigError::KeyFile {
                path: path.clone(),
                source,
            })?;
            // Trim trailing newlines editors leave in key files.
            let end = contents
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
                .map_or(0, |i| i + 1);
            return Ok(contents[..end].to_vec());
        }
        Err(ConfigError::MissingKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let settings: Settings = toml::from_str("key = \"abc\"").unwrap();
        assert_eq!(settings.quality, 95);
        assert_eq!(settings.background, [255, 255, 255]);
        assert!(!settings.optimizers);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Settings>("keyy = \"typo\"").is_err());
    }

    #[test]
    fn inline_key_wins_over_key_file() {
        let settings: Settings =
            toml::from_str("key = \"inline\"\nkey_file = \"/nonexistent\"").unwrap();
        assert_eq!(settings.secret_key().unwrap(), b"inline");
    }

    #[test]
    fn key_file_contents_are_trimmed() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("secret.key");
        std::fs::write(&key_path, b"s3cret\n").unwrap();
        let settings = Settings {
            key_file: Some(key_path),
            ..Settings::default()
        };
        assert_eq!(settings.secret_key().unwrap(), b"s3cret");
    }

    #[test]
    fn missing_key_is_a_typed_error() {
        let err = Settings::default().secret_key().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey));
    }

    #[test]
    fn load_reports_parse_errors_with_the_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("thumbtoken.toml");
        std::fs::write(&path, "quality = \"not a number\"").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
