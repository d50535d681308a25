//! Cache store for persisting upstream responses to disk
//!
//! Provides a `CacheStore` that keeps one JSON record per `(kind, identifier)`
//! with the time it was captured. Reads come in two flavours: `get_fresh`
//! honours the TTL, `get_stale` ignores it so callers can degrade gracefully
//! when an upstream is unavailable.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// Extension used for persisted records
const RECORD_EXTENSION: &str = "json";

/// Extension of the partial file a record is written to before the rename
const TMP_EXTENSION: &str = "tmp";

/// The kind of data stored under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Price,
    News,
    Insight,
    Related,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Price => "price",
            CacheKind::News => "news",
            CacheKind::Insight => "insight",
            CacheKind::Related => "related",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addresses exactly one cache slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub identifier: String,
}

impl CacheKey {
    pub fn new(kind: CacheKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn price(ticker: &str) -> Self {
        Self::new(CacheKind::Price, ticker)
    }

    pub fn news(ticker: &str) -> Self {
        Self::new(CacheKind::News, ticker)
    }

    pub fn insight(ticker: &str) -> Self {
        Self::new(CacheKind::Insight, ticker)
    }

    pub fn related(ticker: &str) -> Self {
        Self::new(CacheKind::Related, ticker)
    }

    /// File name of the record backing this key, e.g. `price_NFLX.json`
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced so an identifier can
    /// never escape the cache directory.
    pub fn file_name(&self) -> String {
        let identifier: String = self
            .identifier
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}.{}", self.kind, identifier, RECORD_EXTENSION)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.identifier)
    }
}

/// Where an entry handed to a caller came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Written straight from a successful upstream call
    #[serde(rename = "api")]
    Live,
    /// Served regardless of age as a stand-in for live data
    #[serde(rename = "fallback")]
    Fallback,
}

/// On-disk layout of a single record
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord<T> {
    data: T,
    timestamp: DateTime<Utc>,
    source: Origin,
}

/// Only the timestamp, used by the sweep so it does not need the payload type
#[derive(Debug, Deserialize)]
struct RecordStamp {
    timestamp: DateTime<Utc>,
}

/// A cached payload together with its capture metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub captured_at: DateTime<Utc>,
    pub origin: Origin,
}

impl<T> CacheEntry<T> {
    /// Age of the entry relative to `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.captured_at
    }
}

/// Reads and writes timestamped records in a single directory
///
/// Each `(kind, identifier)` maps to one file. Writes replace the whole file
/// through a rename, so a concurrent reader sees either the previous record or
/// the new one. Every write also sweeps the directory for records older than
/// the retention window.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
    ttl: Duration,
    max_age: Duration,
}

impl CacheStore {
    /// Creates a store rooted at `cache_dir`
    ///
    /// # Arguments
    /// * `ttl` - Maximum age at which `get_fresh` still returns an entry
    /// * `max_age` - Retention window enforced by the sweep
    pub fn new(cache_dir: PathBuf, ttl: Duration, max_age: Duration) -> Self {
        Self {
            cache_dir,
            ttl,
            max_age,
        }
    }

    /// XDG-compliant default directory (`~/.cache/findash/` on Linux)
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn default_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "findash")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::Io {
            path: self.cache_dir.clone(),
            source,
        })
    }

    /// Reads the record for `key`; `Ok(None)` when there is no file
    fn read_record<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<CacheRecord<T>>, CacheError> {
        let path = self.record_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { path, source })
    }

    /// Like `read_record` but a broken record is logged and treated as absent
    fn read_or_miss<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheRecord<T>> {
        match self.read_record(key) {
            Ok(record) => record,
            Err(err) => {
                warn!(key = %key, error = %err, "cache record unreadable, treating as miss");
                None
            }
        }
    }

    /// Returns the entry only while it is within the TTL
    pub fn get_fresh<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let Some(record) = self.read_or_miss::<T>(key) else {
            debug!(key = %key, "cache miss (not found)");
            return None;
        };

        let age = Utc::now() - record.timestamp;
        if age <= self.ttl {
            debug!(key = %key, age_secs = age.num_seconds(), "cache hit");
            Some(CacheEntry {
                payload: record.data,
                captured_at: record.timestamp,
                origin: Origin::Live,
            })
        } else {
            debug!(
                key = %key,
                age_secs = age.num_seconds(),
                ttl_secs = self.ttl.num_seconds(),
                "cache miss (stale)"
            );
            None
        }
    }

    /// Returns the entry regardless of age, tagged as a fallback
    pub fn get_stale<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let record = self.read_or_miss::<T>(key)?;
        info!(
            key = %key,
            age = %format_age(Utc::now() - record.timestamp),
            "cache fallback used"
        );
        Some(CacheEntry {
            payload: record.data,
            captured_at: record.timestamp,
            origin: Origin::Fallback,
        })
    }

    /// Elapsed time since the entry for `key` was captured
    pub fn age_of(&self, key: &CacheKey) -> Option<Duration> {
        let path = self.record_path(key);
        let content = fs::read_to_string(path).ok()?;
        let stamp: RecordStamp = serde_json::from_str(&content).ok()?;
        Some(Utc::now() - stamp.timestamp)
    }

    /// Writes `payload` as the live entry for `key`, then sweeps old records
    ///
    /// # Returns
    /// * `Ok(())` once the record is in place; sweep problems are only logged
    /// * `Err(CacheError)` if the directory or the record cannot be written
    pub fn set<T: Serialize>(&self, key: &CacheKey, payload: &T) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let record = CacheRecord {
            data: payload,
            timestamp: Utc::now(),
            source: Origin::Live,
        };
        let json = serde_json::to_string_pretty(&record).map_err(CacheError::Serialize)?;

        let path = self.record_path(key);
        let tmp_path = path.with_extension(format!("{RECORD_EXTENSION}.{TMP_EXTENSION}"));
        fs::write(&tmp_path, json).map_err(|source| CacheError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(key = %key, "cache write");

        self.sweep();
        Ok(())
    }

    /// Deletes records older than the retention window and any record that
    /// cannot be parsed, plus partial writes left behind for longer than the
    /// same window. Returns the number of files removed.
    pub fn sweep(&self) -> usize {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    dir = %self.cache_dir.display(),
                    error = %err,
                    "cache sweep could not list directory"
                );
                return 0;
            }
        };

        let cutoff = Utc::now() - self.max_age;
        let mut deleted = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let expired = match path.extension().and_then(|ext| ext.to_str()) {
                Some(RECORD_EXTENSION) => record_expired(&path, cutoff),
                Some(TMP_EXTENSION) => partial_write_expired(&entry, cutoff),
                _ => continue,
            };

            if expired {
                match fs::remove_file(&path) {
                    Ok(()) => deleted += 1,
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "cache sweep failed to delete record"
                        );
                    }
                }
            }
        }

        if deleted > 0 {
            info!(deleted, "cache cleanup removed stale records");
        }
        deleted
    }

    /// Number of records currently on disk
    pub fn len(&self) -> usize {
        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| {
                        e.path().extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Formats an age as a short human-readable string ("5m ago", "2h ago")
fn record_expired(path: &Path, cutoff: DateTime<Utc>) -> bool {
    match fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<RecordStamp>(&content).ok())
    {
        Some(stamp) => stamp.timestamp < cutoff,
        // Unreadable or malformed records are always dropped
        None => true,
    }
}

/// A partial write is judged by its modification time; if that is unknown
/// the file may belong to a write in progress and is kept
fn partial_write_expired(entry: &fs::DirEntry, cutoff: DateTime<Utc>) -> bool {
    entry
        .metadata()
        .and_then(|meta| meta.modified())
        .map(|modified| DateTime::<Utc>::from(modified) < cutoff)
        .unwrap_or(false)
}

pub fn format_age(age: Duration) -> String {
    let total_seconds = age.num_seconds().max(0);

    if total_seconds < 60 {
        format!("{}s ago", total_seconds)
    } else if total_seconds < 3600 {
        format!("{}m ago", total_seconds / 60)
    } else if total_seconds < 86400 {
        format!("{}h ago", total_seconds / 3600)
    } else {
        format!("{}d ago", total_seconds / 86400)
    }
}
