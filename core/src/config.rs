//! Client configuration and API key files.
//!
//! # Design
//! `ApiConfig` names the API root and version the client talks to and is
//! validated before anything touches the network. Key files map API version
//! strings to API keys and are plain data: either a JSON object
//! (`{"v2": "abc"}`) or TOML `version = "key"` lines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ApiError, Result};

pub const ETSY_V2_URL: &str = "https://openapi.etsy.com/v2";
pub const ETSY_V2_VERSION: &str = "v2";

/// Root URL and version of the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL without a trailing slash, e.g. `https://openapi.etsy.com/v2`.
    pub api_url: String,
    pub api_version: String,
    /// Directory holding key files and the method-table cache. Defaults to
    /// `~/.etsy`.
    pub etsy_home: Option<PathBuf>,
}

impl ApiConfig {
    pub fn new(api_url: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_version: api_version.into(),
            etsy_home: None,
        }
    }

    pub fn etsy_v2() -> Self {
        Self::new(ETSY_V2_URL, ETSY_V2_VERSION)
    }

    pub fn with_etsy_home(mut self, dir: impl Into<PathBuf>) -> Self {
        self.etsy_home = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(ApiError::Configuration("No api_url configured.".to_string()));
        }
        if self.api_url.ends_with('/') {
            return Err(ApiError::Configuration("api_url should not end with a slash.".to_string()));
        }
        if self.api_version.is_empty() {
            return Err(ApiError::Configuration("API config should define api_version".to_string()));
        }
        Ok(())
    }

    pub fn etsy_home(&self) -> PathBuf {
        self.etsy_home.clone().unwrap_or_else(default_etsy_home)
    }

    pub fn default_key_file(&self) -> PathBuf {
        self.etsy_home().join("keys")
    }
}

/// `~/.etsy`, or `./.etsy` when no home directory is known.
pub fn default_etsy_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".etsy")
}

/// Read the API key for `api_version` from a key file.
pub fn read_key(path: &Path, api_version: &str) -> Result<String> {
    if !path.is_file() {
        return Err(ApiError::Configuration(format!(
            "The key file '{}' does not exist. Create a key file or pass an API key explicitly.",
            path.display()
        )));
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ApiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let keys = parse_key_file(&contents)?;
    keys.get(api_version).cloned().ok_or_else(|| {
        ApiError::Configuration(format!(
            "The key file '{}' has no key for API version {api_version}.",
            path.display()
        ))
    })
}

/// Parse key-file contents into a version → key map.
pub fn parse_key_file(contents: &str) -> Result<HashMap<String, String>> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ApiError::Configuration(format!("invalid JSON key file: {e}")));
    }

    toml::from_str(contents)
        .map_err(|e| ApiError::Configuration(format!("invalid key file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etsy_v2_preset_is_valid() {
        let config = ApiConfig::etsy_v2();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_url, "https://openapi.etsy.com/v2");
    }

    #[test]
    fn validate_rejects_bad_urls_and_versions() {
        for config in [
            ApiConfig::new("", "v2"),
            ApiConfig::new("https://api.example.com/", "v2"),
            ApiConfig::new("https://api.example.com", ""),
        ] {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ApiError::Configuration(_)), "{config:?}");
        }
    }

    #[test]
    fn key_file_lines() {
        let keys = parse_key_file("# keys\nv2 = 'abc123'\nv3=\"def\"\n\n").unwrap();
        assert_eq!(keys["v2"], "abc123");
        assert_eq!(keys["v3"], "def");
    }

    #[test]
    fn key_file_trailing_comment_is_not_part_of_the_key() {
        let keys = parse_key_file("# my keys\nv2 = 'abc123' # production key\n").unwrap();
        assert_eq!(keys["v2"], "abc123");
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn key_file_json() {
        let keys = parse_key_file(r#" {"v2": "abc"} "#).unwrap();
        assert_eq!(keys["v2"], "abc");
    }

    #[test]
    fn key_file_rejects_garbage() {
        assert!(parse_key_file("import os").is_err());
        assert!(parse_key_file("v2 = unquoted").is_err());
        assert!(parse_key_file("{not json").is_err());
    }

    #[test]
    fn read_key_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys");
        std::fs::write(&path, "v2 = 'k2'\n").unwrap();
        assert_eq!(read_key(&path, "v2").unwrap(), "k2");

        let err = read_key(&path, "v3").unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));

        let err = read_key(&dir.path().join("missing"), "v2").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn default_key_file_lives_in_etsy_home() {
        let config = ApiConfig::etsy_v2().with_etsy_home("/tmp/etsy-home");
        assert_eq!(config.default_key_file(), PathBuf::from("/tmp/etsy-home/keys"));
    }
}
