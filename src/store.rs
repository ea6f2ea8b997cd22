//! Snapshot persistence.
//!
//! The recorder depends only on the [`SessionStore`] contract; the host picks
//! where snapshots live. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps the serialized snapshot in memory
//! - [`JsonFileStore`] writes it to a JSON file, replacing it atomically

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use log::debug;
use thiserror::Error;

use crate::TrackSession;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable home for the current [`TrackSession`].
pub trait SessionStore: Send + Sync {
    /// Persist `session`, replacing any previous snapshot.
    fn save(&self, session: &TrackSession) -> Result<(), StorageError>;

    /// Load the last saved snapshot, if there is one.
    fn load(&self) -> Result<Option<TrackSession>, StorageError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Keeps the JSON snapshot in memory.
///
/// Snapshots go through the same serialization as [`JsonFileStore`], so a
/// round trip through this store exercises the on-disk format.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<String>>,
    saves: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing snapshot.
    pub fn with_snapshot(session: &TrackSession) -> Result<Self, StorageError> {
        let store = Self::new();
        store.save(session)?;
        store.saves.store(0, Ordering::SeqCst);
        Ok(store)
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// The raw JSON of the last snapshot.
    pub fn raw_snapshot(&self) -> Option<String> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every subsequent save fail (simulates a full or revoked storage).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, session: &TrackSession) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store disabled".to_string()));
        }
        let json = serde_json::to_string(session)?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<TrackSession>, StorageError> {
        let guard = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Stores the snapshot as a JSON file.
///
/// Saves write a sibling temp file and rename it over the target, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for JsonFileStore {
    fn save(&self, session: &TrackSession) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec(session)?;
        let temp = self.temp_path();
        fs::write(&temp, &json)?;
        fs::rename(&temp, &self.path)?;

        debug!(
            "[JsonFileStore] saved {} points ({} bytes) to {}",
            session.points.len(),
            json.len(),
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<TrackSession>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::accumulate;
    use crate::GeoSample;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn sample_session() -> TrackSession {
        let mut session = TrackSession::new();
        session.active_start_time_millis = Some(1_700_000_000_000);
        session.elapsed_offset_millis = 42_000;
        for i in 0..5 {
            let sample = GeoSample::new(46.5580 + i as f64 * 0.0003, 7.8350, 1_700_000_000_000 + i * 5_000)
                .with_accuracy(3.5 + i as f64)
                .with_altitude(1000.0 + i as f64 * 2.25);
            accumulate(&mut session, sample.into(), if i == 0 { 0.0 } else { 33.4 });
        }
        // Unaltituded point in the middle of the log
        accumulate(&mut session, GeoSample::new(46.5600, 7.8351, 1_700_000_030_000).into(), 20.0);
        session.last_raw_sample = Some(GeoSample::new(46.56001, 7.8351, 1_700_000_031_000).with_accuracy(60.0));
        session
    }

    fn temp_file(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir()
            .join(format!("trail-recorder-{}-{}", std::process::id(), nanos))
            .join(name)
    }

    #[test]
    fn test_memory_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());

        let session = sample_session();
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_memory_store_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.save(&sample_session()),
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.load().unwrap().is_none());

        store.set_unavailable(false);
        store.save(&sample_session()).unwrap();
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn test_memory_store_with_snapshot() {
        let store = MemoryStore::with_snapshot(&sample_session()).unwrap();
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.load().unwrap(), Some(sample_session()));
    }

    #[test]
    fn test_file_round_trip() {
        let path = temp_file("trail.json");
        let store = JsonFileStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let session = sample_session();
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session.clone()));
        assert!(!store.temp_path().exists());

        // Overwrite with a cleared session
        store.save(&TrackSession::new()).unwrap();
        assert_eq!(store.load().unwrap(), Some(TrackSession::new()));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_corrupt_snapshot() {
        let path = temp_file("corrupt.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StorageError::Serialization(_))));

        fs::write(&path, b"  \n").unwrap();
        assert!(store.load().unwrap().is_none());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
