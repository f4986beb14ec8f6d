//! Incremental compilation cache.
//!
//! Generated programs keyed by input path and guarded by a content hash of
//! the source; an unchanged input is served from disk instead of recompiled.
//! Corrupt entries are invalidated silently.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub output: String,
}

pub struct IncrementalCache {
    cache_dir: PathBuf,
}

impl IncrementalCache {
    pub fn new() -> Self {
        Self::with_dir(PathBuf::from(".rwc/cache"))
    }

    pub fn with_dir(cache_dir: PathBuf) -> Self {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).ok();
        }
        Self { cache_dir }
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, file_path: &str) -> PathBuf {
        let safe_name = file_path
            .replace('/', "_")
            .replace('\\', "_")
            .replace(':', "_");
        self.cache_dir.join(format!("{}.json", safe_name))
    }

    /// Cached output for this path, when the source hash still matches.
    pub fn get(&self, file_path: &str, source: &str) -> Option<String> {
        let entry_path = self.entry_path(file_path);
        if !entry_path.exists() {
            return None;
        }

        let data = match fs::read_to_string(&entry_path) {
            Ok(data) => data,
            Err(_) => return None,
        };

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("[rwc] cache entry unreadable for {}: {}", file_path, e);
                fs::remove_file(entry_path).ok();
                return None;
            }
        };

        if entry.hash == Self::compute_hash(source) {
            Some(entry.output)
        } else {
            None
        }
    }

    pub fn set(&self, file_path: &str, source: &str, output: &str) {
        let entry = CacheEntry {
            hash: Self::compute_hash(source),
            output: output.to_string(),
        };
        if let Ok(data) = serde_json::to_string(&entry) {
            fs::write(self.entry_path(file_path), data).ok();
        }
    }
}

impl Default for IncrementalCache {
    fn default() -> Self {
        Self::new()
    }
}
