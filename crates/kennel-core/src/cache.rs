//! Durable description and score cache.
//!
//! One JSON document holds two namespaces:
//!
//! ```text
//! {
//!   "descriptions": { "<url>": { "text": ..., "name": ..., "updated_at": ... } },
//!   "scores":       { "<url>": { "<prompt fingerprint>": { "score": ..., ... } } }
//! }
//! ```
//!
//! The whole document lives in memory. Every write rewrites the file through
//! a temp file in the same directory followed by a rename, so a crash never
//! leaves a half-written cache behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::models::{DescriptionEntry, ScoreEntry};

/// On-disk layout. Missing top-level keys load as empty maps.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    descriptions: BTreeMap<String, DescriptionEntry>,
    #[serde(default)]
    scores: BTreeMap<String, BTreeMap<String, ScoreEntry>>,
}

#[derive(Debug, Default)]
struct CacheState {
    doc: CacheDocument,
    /// Bumped on every mutation; identifies the snapshot being persisted.
    generation: u64,
}

/// Hit/miss counters and sizes, for end-of-run reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub description_entries: usize,
    pub description_hits: u64,
    pub description_misses: u64,
    pub score_entries: usize,
    pub score_hits: u64,
    pub score_misses: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "descriptions: {} entries, {} hits, {} misses; scores: {} entries, {} hits, {} misses",
            self.description_entries,
            self.description_hits,
            self.description_misses,
            self.score_entries,
            self.score_hits,
            self.score_misses
        )
    }
}

/// Thread-safe, crash-atomic cache shared by collectors and the scoring pass.
#[derive(Debug)]
pub struct ListingCache {
    path: Option<PathBuf>,
    state: Mutex<CacheState>,
    /// Serialises disk writes; holds the generation last written.
    persisted: Arc<Mutex<u64>>,
    description_hits: AtomicU64,
    description_misses: AtomicU64,
    score_hits: AtomicU64,
    score_misses: AtomicU64,
}

impl ListingCache {
    /// Load the cache from `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or corrupt file is
    /// logged and also yields an empty cache; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheDocument>(&raw) {
                Ok(doc) => {
                    tracing::info!(
                        path = %path.display(),
                        descriptions = doc.descriptions.len(),
                        scores = doc.scores.values().map(BTreeMap::len).sum::<usize>(),
                        "Loaded cache"
                    );
                    doc
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt cache file, starting empty");
                    CacheDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No cache file yet, starting empty");
                CacheDocument::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable cache file, starting empty");
                CacheDocument::default()
            }
        };
        Self::build(Some(path), doc)
    }

    /// Cache that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::build(None, CacheDocument::default())
    }

    fn build(path: Option<PathBuf>, doc: CacheDocument) -> Self {
        Self {
            path,
            state: Mutex::new(CacheState { doc, generation: 0 }),
            persisted: Arc::new(Mutex::new(0)),
            description_hits: AtomicU64::new(0),
            description_misses: AtomicU64::new(0),
            score_hits: AtomicU64::new(0),
            score_misses: AtomicU64::new(0),
        }
    }

    /// Acquires the state lock, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned cache mutex");
            poisoned.into_inner()
        })
    }

    pub fn get_description(&self, url: &str) -> Option<DescriptionEntry> {
        let entry = self.lock_state().doc.descriptions.get(url).cloned();
        let counter = if entry.is_some() {
            &self.description_hits
        } else {
            &self.description_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Store a description. Blank text is ignored so a failed fetch never
    /// evicts a previously good entry; a missing name keeps the stored one.
    pub async fn set_description(
        &self,
        url: &str,
        text: &str,
        name: Option<&str>,
    ) -> Result<(), AppError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.mutate(|doc| {
            let previous_name = doc
                .descriptions
                .get(url)
                .map(|e| e.name.clone())
                .unwrap_or_default();
            let name = name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or(previous_name);
            doc.descriptions.insert(
                url.to_string(),
                DescriptionEntry {
                    text: text.to_string(),
                    name,
                    updated_at: Utc::now(),
                },
            );
        })
        .await
    }

    pub fn get_score(&self, url: &str, fingerprint: &str) -> Option<ScoreEntry> {
        let entry = self
            .lock_state()
            .doc
            .scores
            .get(url)
            .and_then(|by_prompt| by_prompt.get(fingerprint))
            .cloned();
        let counter = if entry.is_some() {
            &self.score_hits
        } else {
            &self.score_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Store a score under `(url, fingerprint)`. Entries for other
    /// fingerprints of the same URL are kept.
    pub async fn set_score(
        &self,
        url: &str,
        fingerprint: &str,
        score: i64,
        details: &[String],
    ) -> Result<(), AppError> {
        self.mutate(|doc| {
            doc.scores.entry(url.to_string()).or_default().insert(
                fingerprint.to_string(),
                ScoreEntry {
                    score,
                    score_details: details.to_vec(),
                    updated_at: Utc::now(),
                },
            );
        })
        .await
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock_state();
        CacheStats {
            description_entries: state.doc.descriptions.len(),
            description_hits: self.description_hits.load(Ordering::Relaxed),
            description_misses: self.description_misses.load(Ordering::Relaxed),
            score_entries: state.doc.scores.values().map(BTreeMap::len).sum(),
            score_hits: self.score_hits.load(Ordering::Relaxed),
            score_misses: self.score_misses.load(Ordering::Relaxed),
        }
    }

    /// Write the current document to disk even if nothing changed.
    pub async fn flush(&self) -> Result<(), AppError> {
        let snapshot = {
            let mut state = self.lock_state();
            state.generation += 1;
            (state.generation, serde_json::to_vec_pretty(&state.doc)?)
        };
        self.persist(snapshot).await
    }

    /// Apply `f` under the state lock, then persist the resulting snapshot
    /// without holding it.
    async fn mutate(&self, f: impl FnOnce(&mut CacheDocument)) -> Result<(), AppError> {
        let snapshot = {
            let mut state = self.lock_state();
            f(&mut state.doc);
            state.generation += 1;
            if self.path.is_none() {
                return Ok(());
            }
            (state.generation, serde_json::to_vec_pretty(&state.doc)?)
        };
        self.persist(snapshot).await
    }

    /// Disk writes run on the blocking pool so a slow fsync never holds up
    /// a runtime worker.
    async fn persist(&self, (generation, bytes): (u64, Vec<u8>)) -> Result<(), AppError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let persisted = Arc::clone(&self.persisted);

        tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            let mut written = persisted.lock().unwrap_or_else(|poisoned| {
                tracing::warn!("Recovered from poisoned cache persist mutex");
                poisoned.into_inner()
            });
            // A newer snapshot already reached the disk.
            if *written >= generation {
                return Ok(());
            }

            write_atomic(&path, &bytes)?;
            *written = generation;
            tracing::debug!(path = %path.display(), generation, "Cache persisted");
            Ok(())
        })
        .await
        .map_err(|e| AppError::CacheError(format!("persist task failed: {e}")))?
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| AppError::CacheError(format!("rename to {}: {}", path.display(), e.error)))?;
    Ok(())
}
