//! WAL and snapshot persistence for the local store.
//!
//! Each commit appends one length-prefixed MessagePack frame holding the
//! whole batch of entries, so a transaction is either fully replayed or not
//! at all. A truncated trailing frame is treated as end-of-log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{AppError, Post, Result, User};
use crate::storage::store::StoreState;

const CHECKPOINT_THRESHOLD: usize = 256;

pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join("liveboard.snapshot")
}

pub fn wal_path(data_dir: &Path) -> PathBuf {
    data_dir.join("liveboard.wal")
}

/// One logical mutation, as staged by a transaction and replayed on recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    InsertUser { user: User },
    InsertPost { post: Post },
    UpdatePost { id: u64, content: String },
    DeletePost { id: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    state: StoreState,
}

struct WalManager {
    wal_path: PathBuf,
    wal_file: BufWriter<File>,
    frames_since_checkpoint: usize,
}

impl WalManager {
    fn open(wal_path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .map_err(|e| AppError::Io(format!("failed to open WAL file: {e}")))?;
        Ok(Self {
            wal_path,
            wal_file: BufWriter::new(file),
            frames_since_checkpoint: 0,
        })
    }

    /// Appends one commit batch as a single frame and syncs it to disk.
    fn append(&mut self, entries: &[WalEntry]) -> Result<()> {
        let serialized = rmp_serde::to_vec(entries)?;
        let len = serialized.len() as u32;
        self.wal_file
            .write_all(&len.to_le_bytes())
            .and_then(|()| self.wal_file.write_all(&serialized))
            .and_then(|()| self.wal_file.flush())
            .and_then(|()| self.wal_file.get_mut().sync_all())
            .map_err(|e| AppError::Io(format!("failed to write WAL: {e}")))?;
        self.frames_since_checkpoint += 1;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<WalEntry>> {
        if !self.wal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| AppError::Io(format!("failed to open WAL for reading: {e}")))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(AppError::Io(format!("failed to read WAL frame: {e}"))),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Torn tail frame from an interrupted write; the commit it
                    // belonged to never applied.
                    warn!("discarding truncated WAL tail frame");
                    break;
                }
                Err(e) => return Err(AppError::Io(format!("failed to read WAL frame: {e}"))),
            }
            let batch: Vec<WalEntry> = rmp_serde::from_slice(&data)?;
            entries.extend(batch);
        }
        Ok(entries)
    }

    fn clear(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| AppError::Io(format!("failed to truncate WAL: {e}")))?;
        self.wal_file = BufWriter::new(file);
        self.frames_since_checkpoint = 0;
        Ok(())
    }

    fn needs_checkpoint(&self) -> bool {
        self.frames_since_checkpoint >= CHECKPOINT_THRESHOLD
    }
}

struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    fn new(snapshot_path: PathBuf) -> Self {
        Self { snapshot_path }
    }

    /// Writes the snapshot atomically: temp file, flush, sync, rename.
    fn save(&self, state: &StoreState) -> Result<()> {
        let snapshot = StoreSnapshot {
            version: 1,
            state: state.clone(),
        };
        let temp_path = self.snapshot_path.with_extension("tmp");
        let temp_file = File::create(&temp_path)
            .map_err(|e| AppError::Io(format!("failed to create temp snapshot: {e}")))?;
        let mut writer = BufWriter::new(temp_file);
        let serialized = rmp_serde::to_vec(&snapshot)?;
        writer
            .write_all(&serialized)
            .and_then(|()| writer.flush())
            .and_then(|()| writer.get_mut().sync_all())
            .map_err(|e| AppError::Io(format!("failed to write snapshot: {e}")))?;
        fs::rename(&temp_path, &self.snapshot_path)
            .map_err(|e| AppError::Io(format!("failed to rename snapshot: {e}")))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<StoreState>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| AppError::Io(format!("failed to open snapshot: {e}")))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| AppError::Io(format!("failed to read snapshot: {e}")))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data)?;
        Ok(Some(snapshot.state))
    }

    fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

/// Owns the WAL/snapshot pair under one data directory. Callers serialize
/// access; the store's commit path holds the table write lock while logging.
pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
}

impl PersistenceManager {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Io(format!("failed to create data directory: {e}")))?;
        Ok(Self {
            wal: WalManager::open(wal_path(data_dir))?,
            snapshot: SnapshotManager::new(snapshot_path(data_dir)),
        })
    }

    pub fn log(&mut self, entries: &[WalEntry]) -> Result<()> {
        self.wal.append(entries)
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    /// Persists the full state and clears the WAL.
    pub fn checkpoint(&mut self, state: &StoreState) -> Result<()> {
        self.snapshot.save(state)?;
        self.wal.clear()
    }

    pub fn snapshot_exists(&self) -> bool {
        self.snapshot.exists()
    }

    /// Loads the snapshot (if any) and replays WAL frames on top. `None`
    /// means a genuinely fresh store: no snapshot and an empty log.
    pub fn recover(&self) -> Result<Option<StoreState>> {
        let snapshot = self.snapshot.load()?;
        let entries = self.wal.read_all()?;
        if snapshot.is_none() && entries.is_empty() {
            return Ok(None);
        }
        let mut state = snapshot.unwrap_or_default();
        for entry in &entries {
            state.apply(entry);
        }
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn user(id: u64, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    fn post(id: u64, user_id: u64, content: &str) -> Post {
        Post {
            id,
            user_id,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wal_append_and_read_frames() {
        let dir = TempDir::new().unwrap();
        let mut persistence = PersistenceManager::open(dir.path()).unwrap();

        persistence
            .log(&[
                WalEntry::InsertUser {
                    user: user(1, "alice"),
                },
                WalEntry::InsertPost {
                    post: post(1, 1, "hi"),
                },
            ])
            .unwrap();
        persistence
            .log(&[WalEntry::DeletePost { id: 1 }])
            .unwrap();

        let entries = persistence.wal.read_all().unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn recover_replays_wal_over_snapshot() {
        let dir = TempDir::new().unwrap();
        {
            let mut persistence = PersistenceManager::open(dir.path()).unwrap();
            let mut state = StoreState::default();
            state.apply(&WalEntry::InsertUser {
                user: user(1, "alice"),
            });
            persistence.checkpoint(&state).unwrap();
            persistence
                .log(&[WalEntry::InsertPost {
                    post: post(1, 1, "after checkpoint"),
                }])
                .unwrap();
        }

        let persistence = PersistenceManager::open(dir.path()).unwrap();
        let state = persistence.recover().unwrap().expect("state should exist");
        assert_eq!(state.user_count(), 1);
        assert_eq!(state.post_count(), 1);
    }

    #[test]
    fn recover_fresh_directory_is_none() {
        let dir = TempDir::new().unwrap();
        let persistence = PersistenceManager::open(dir.path()).unwrap();
        assert!(persistence.recover().unwrap().is_none());
    }

    #[test]
    fn truncated_tail_frame_is_discarded() {
        let dir = TempDir::new().unwrap();
        {
            let mut persistence = PersistenceManager::open(dir.path()).unwrap();
            persistence
                .log(&[WalEntry::InsertUser {
                    user: user(1, "alice"),
                }])
                .unwrap();
        }
        // Append a frame header that promises more bytes than exist.
        let mut file = OpenOptions::new()
            .append(true)
            .open(wal_path(dir.path()))
            .unwrap();
        file.write_all(&64u32.to_le_bytes()).unwrap();
        file.write_all(&[0u8; 8]).unwrap();

        let persistence = PersistenceManager::open(dir.path()).unwrap();
        let state = persistence.recover().unwrap().expect("state should exist");
        assert_eq!(state.user_count(), 1);
    }

    #[test]
    fn checkpoint_clears_wal() {
        let dir = TempDir::new().unwrap();
        let mut persistence = PersistenceManager::open(dir.path()).unwrap();
        persistence
            .log(&[WalEntry::InsertUser {
                user: user(1, "alice"),
            }])
            .unwrap();
        assert_eq!(persistence.wal.frames_since_checkpoint, 1);

        let mut state = StoreState::default();
        state.apply(&WalEntry::InsertUser {
            user: user(1, "alice"),
        });
        persistence.checkpoint(&state).unwrap();
        assert_eq!(persistence.wal.frames_since_checkpoint, 0);
        assert!(persistence.wal.read_all().unwrap().is_empty());
    }
}
