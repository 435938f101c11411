//! On-disk cache of the server's method table.
//!
//! # Design
//! The cache is advisory: a missing, stale, unreadable or unparsable file is
//! a miss, and a failed write only costs the next client a network fetch.
//! The file's modification time is the cache timestamp, so touching the file
//! externally refreshes it.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::ApiConfig;
use crate::error::Result;
use crate::log::LogSink;
use crate::types::MethodSpec;

/// Default maximum age of a cache file: 24 hours.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24);

/// Where the method table is cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheLocation {
    /// `methods.<version>.json` in the Etsy home directory if it exists,
    /// otherwise in the system temp directory.
    #[default]
    Default,
    Path(PathBuf),
    /// Never read or write a cache file.
    Disabled,
}

#[derive(Debug)]
pub struct MethodTableCache {
    path: Option<PathBuf>,
    max_age: Duration,
    used_cache: bool,
    wrote_cache: bool,
    log: LogSink,
}

impl MethodTableCache {
    pub fn new(location: CacheLocation, config: &ApiConfig, log: LogSink) -> Self {
        let path = match location {
            CacheLocation::Default => Some(default_file(config)),
            CacheLocation::Path(p) => Some(p),
            CacheLocation::Disabled => None,
        };
        Self {
            path,
            max_age: DEFAULT_MAX_AGE,
            used_cache: false,
            wrote_cache: false,
            log,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Resolved cache file, `None` when caching is disabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Whether the last `get` was served from the cache file.
    pub fn used_cache(&self) -> bool {
        self.used_cache
    }

    /// Whether the last `get` wrote a fresh cache file.
    pub fn wrote_cache(&self) -> bool {
        self.wrote_cache
    }

    pub fn get<F>(&mut self, fetch: F) -> Result<Vec<MethodSpec>>
    where
        F: FnOnce() -> Result<Vec<MethodSpec>>,
    {
        self.get_at(SystemTime::now(), fetch)
    }

    /// Like `get`, judging freshness as of `now`.
    pub fn get_at<F>(&mut self, now: SystemTime, fetch: F) -> Result<Vec<MethodSpec>>
    where
        F: FnOnce() -> Result<Vec<MethodSpec>>,
    {
        self.used_cache = false;
        self.wrote_cache = false;

        if let Some(methods) = self.read_cached(now) {
            return Ok(methods);
        }
        let methods = fetch()?;
        self.write(&methods);
        Ok(methods)
    }

    fn read_cached(&mut self, now: SystemTime) -> Option<Vec<MethodSpec>> {
        let path = match &self.path {
            Some(p) if p.is_file() => p.clone(),
            _ => {
                self.log.debug("Not using cached method table.");
                return None;
            }
        };

        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                let path = path.display();
                self.log.warn(&format!("Could not stat method table cache {path}: {e}"));
                return None;
            }
        };
        // A timestamp in the future counts as age zero.
        let age = now.duration_since(modified).unwrap_or_default();
        if age > self.max_age {
            self.log.info("Method table too old.");
            return None;
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                let path = path.display();
                self.log.warn(&format!("Could not read method table cache {path}: {e}"));
                return None;
            }
        };
        match serde_json::from_str::<Vec<MethodSpec>>(&contents) {
            Ok(methods) if !methods.is_empty() => {
                self.used_cache = true;
                self.log.info(&format!("Reading method table cache: {}", path.display()));
                Some(methods)
            }
            Ok(_) => {
                self.log.info("Method table cache is empty.");
                None
            }
            Err(e) => {
                self.log.warn(&format!("Corrupt method table cache {}: {e}", path.display()));
                None
            }
        }
    }

    fn write(&mut self, methods: &[MethodSpec]) {
        let Some(path) = &self.path else {
            self.log.debug("Method table caching disabled, not writing new cache.");
            return;
        };
        let json = match serde_json::to_string(methods) {
            Ok(j) => j,
            Err(e) => {
                self.log.warn(&format!("Could not serialize method table: {e}"));
                return;
            }
        };
        match std::fs::write(path, json) {
            Ok(()) => {
                self.wrote_cache = true;
                self.log.info(&format!("Wrote method table cache: {}", path.display()));
            }
            Err(e) => {
                let path = path.display();
                self.log.warn(&format!("Could not write method table cache {path}: {e}"));
            }
        }
    }
}

fn default_file(config: &ApiConfig) -> PathBuf {
    let home = config.etsy_home();
    let dir = if home.is_dir() { home } else { std::env::temp_dir() };
    dir.join(format!("methods.{}.json", config.api_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::http::HttpMethod;
    use std::cell::Cell;

    fn table() -> Vec<MethodSpec> {
        vec![MethodSpec::new("ping", "/ping", HttpMethod::Get)]
    }

    fn config(home: &Path) -> ApiConfig {
        ApiConfig::new("http://localhost", "v9").with_etsy_home(home)
    }

    fn cache_in(location: CacheLocation, home: &Path) -> MethodTableCache {
        MethodTableCache::new(location, &config(home), LogSink::default())
    }

    fn read_table(path: &Path) -> Vec<MethodSpec> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn default_location_uses_existing_etsy_home() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(CacheLocation::Default, dir.path());
        assert_eq!(cache.path(), Some(dir.path().join("methods.v9.json").as_path()));
    }

    #[test]
    fn default_location_falls_back_to_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-home");
        let cache = cache_in(CacheLocation::Default, &missing);
        assert_eq!(cache.path(), Some(std::env::temp_dir().join("methods.v9.json").as_path()));
    }

    #[test]
    fn miss_fetches_and_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methods.json");
        let mut cache = cache_in(CacheLocation::Path(path.clone()), dir.path());

        let methods = cache.get(|| Ok(table())).unwrap();
        assert_eq!(methods, table());
        assert!(!cache.used_cache());
        assert!(cache.wrote_cache());

        assert_eq!(read_table(&path), table());
    }

    #[test]
    fn fresh_file_is_used_without_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methods.json");
        std::fs::write(&path, serde_json::to_string(&table()).unwrap()).unwrap();
        let mut cache = cache_in(CacheLocation::Path(path), dir.path());

        let fetched = Cell::new(false);
        let methods = cache
            .get(|| {
                fetched.set(true);
                Ok(Vec::new())
            })
            .unwrap();
        assert!(!fetched.get());
        assert_eq!(methods, table());
        assert!(cache.used_cache());
        assert!(!cache.wrote_cache());
    }

    #[test]
    fn stale_file_is_refetched_and_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methods.json");
        std::fs::write(&path, serde_json::to_string(&table()).unwrap()).unwrap();
        let mut cache = cache_in(CacheLocation::Path(path.clone()), dir.path());

        let later = SystemTime::now() + DEFAULT_MAX_AGE + Duration::from_secs(60);
        let fresh = vec![MethodSpec::new("findAllShops", "/shops", HttpMethod::Get)];
        let methods = cache.get_at(later, || Ok(fresh.clone())).unwrap();

        assert_eq!(methods, fresh);
        assert!(!cache.used_cache());
        assert!(cache.wrote_cache());
        assert_eq!(read_table(&path), fresh);
    }

    #[test]
    fn max_age_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methods.json");
        std::fs::write(&path, serde_json::to_string(&table()).unwrap()).unwrap();
        let mut cache = cache_in(CacheLocation::Path(path), dir.path())
            .with_max_age(Duration::from_secs(10));

        let later = SystemTime::now() + Duration::from_secs(3600);
        cache.get_at(later, || Ok(table())).unwrap();
        assert!(!cache.used_cache());
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methods.json");
        std::fs::write(&path, "{ not json").unwrap();
        let mut cache = cache_in(CacheLocation::Path(path), dir.path());
        assert_eq!(cache.get(|| Ok(table())).unwrap(), table());
        assert!(cache.wrote_cache());
    }

    #[test]
    fn disabled_cache_always_fetches_and_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache_in(CacheLocation::Disabled, dir.path());
        assert!(cache.path().is_none());
        let calls = Cell::new(0);
        for _ in 0..2 {
            cache
                .get(|| {
                    calls.set(calls.get() + 1);
                    Ok(table())
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 2);
        assert!(!cache.wrote_cache());
    }

    #[test]
    fn unwritable_path_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("methods.json");
        let mut cache = cache_in(CacheLocation::Path(path), dir.path());
        assert_eq!(cache.get(|| Ok(table())).unwrap(), table());
        assert!(!cache.wrote_cache());
    }

    #[test]
    fn fetch_failure_propagates_without_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("methods.json");
        let mut cache = cache_in(CacheLocation::Path(path.clone()), dir.path());
        let err = cache
            .get(|| Err(ApiError::Transport("connection refused".into())))
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert!(!path.exists());
    }
}
