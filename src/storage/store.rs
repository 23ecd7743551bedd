//! The local embedded store: `users` and `posts` tables behind scoped,
//! single-writer transactions.
//!
//! A transaction holds the table write lock for its whole lifetime, so
//! transactions are serializable by construction. Mutations stage against a
//! copy-on-write working state; `commit` logs the batch and publishes the
//! working state, and dropping a transaction without committing discards it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use im::{HashMap, OrdMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::warn;

use crate::core::{AppError, Post, PostView, Result, User};
use crate::storage::persistence::{self, PersistenceManager, WalEntry};

/// Both tables plus id allocators. Cloning is cheap (persistent maps), which
/// is what makes the transaction staging copy affordable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    users: OrdMap<u64, User>,
    users_by_name: HashMap<String, u64>,
    posts: OrdMap<u64, Post>,
    next_user_id: u64,
    next_post_id: u64,
}

impl StoreState {
    pub fn apply(&mut self, entry: &WalEntry) {
        match entry {
            WalEntry::InsertUser { user } => {
                self.users_by_name.insert(user.name.clone(), user.id);
                self.users.insert(user.id, user.clone());
                self.next_user_id = self.next_user_id.max(user.id + 1);
            }
            WalEntry::InsertPost { post } => {
                self.posts.insert(post.id, post.clone());
                self.next_post_id = self.next_post_id.max(post.id + 1);
            }
            WalEntry::UpdatePost { id, content } => {
                if let Some(post) = self.posts.get(id).cloned() {
                    self.posts.insert(
                        *id,
                        Post {
                            content: content.clone(),
                            ..post
                        },
                    );
                }
            }
            WalEntry::DeletePost { id } => {
                self.posts.remove(id);
            }
        }
    }

    pub fn user_count(&self) -> u64 {
        self.users.len() as u64
    }

    pub fn post_count(&self) -> u64 {
        self.posts.len() as u64
    }

    fn author_name(&self, user_id: u64) -> String {
        self.users
            .get(&user_id)
            .map(|user| user.name.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: u64,
    pub posts: u64,
}

/// Handle to the open store. Reads take the read lock; all mutations go
/// through [`Store::begin`].
pub struct Store {
    state: Arc<RwLock<StoreState>>,
    persistence: Arc<Mutex<PersistenceManager>>,
    data_dir: PathBuf,
}

impl Store {
    /// Opens (and on first open, creates) the store under `data_dir`,
    /// recovering the snapshot + WAL pair left by a previous run or by a
    /// replica restore.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let mut persistence = PersistenceManager::open(data_dir)?;
        let state = persistence.recover()?.unwrap_or_default();
        if !persistence.snapshot_exists() {
            persistence.checkpoint(&state)?;
        }
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            persistence: Arc::new(Mutex::new(persistence)),
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// Begins a transaction. The returned handle owns the table write lock
    /// until it commits or drops.
    pub async fn begin(&self) -> StoreTx<'_> {
        let guard = self.state.write().await;
        let working = guard.clone();
        StoreTx {
            guard,
            persistence: &self.persistence,
            working,
            staged: Vec::new(),
        }
    }

    /// The latest `limit` posts, newest first, each joined with its author.
    pub async fn recent_posts(&self, limit: usize) -> Vec<PostView> {
        let state = self.state.read().await;
        state
            .posts
            .iter()
            .rev()
            .take(limit)
            .map(|(_, post)| PostView::new(post, &state.author_name(post.user_id)))
            .collect()
    }

    /// Case-insensitive substring match over post content and author name,
    /// newest first. An empty result is an empty list, never an error.
    pub async fn search_posts(&self, query: &str) -> Vec<PostView> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        state
            .posts
            .iter()
            .rev()
            .filter_map(|(_, post)| {
                let author = state.author_name(post.user_id);
                let matches = post.content.to_lowercase().contains(&needle)
                    || author.to_lowercase().contains(&needle);
                matches.then(|| PostView::new(post, &author))
            })
            .collect()
    }

    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.read().await;
        StoreCounts {
            users: state.user_count(),
            posts: state.post_count(),
        }
    }

    /// A uniformly random existing user, or `None` while the table is empty.
    pub async fn sample_user(&self) -> Option<User> {
        let state = self.state.read().await;
        let len = state.users.len();
        if len == 0 {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..len);
        state.users.iter().nth(idx).map(|(_, user)| user.clone())
    }

    /// Combined byte size of the on-disk snapshot and WAL, or `None` when
    /// neither is currently readable (e.g. mid-replication).
    pub async fn artifact_size(&self) -> Option<u64> {
        let snapshot = tokio::fs::metadata(persistence::snapshot_path(&self.data_dir)).await;
        let wal = tokio::fs::metadata(persistence::wal_path(&self.data_dir)).await;
        match (snapshot, wal) {
            (Err(_), Err(_)) => None,
            (snapshot, wal) => Some(
                snapshot.map(|m| m.len()).unwrap_or(0) + wal.map(|m| m.len()).unwrap_or(0),
            ),
        }
    }
}

/// An open transaction. All statements apply to the working copy in program
/// order; nothing is observable outside until `commit` returns `Ok`.
pub struct StoreTx<'a> {
    guard: RwLockWriteGuard<'a, StoreState>,
    persistence: &'a Mutex<PersistenceManager>,
    working: StoreState,
    staged: Vec<WalEntry>,
}

impl StoreTx<'_> {
    fn stage(&mut self, entry: WalEntry) {
        self.working.apply(&entry);
        self.staged.push(entry);
    }

    /// Insert-or-ignore on `name`, then read back within this transaction.
    /// Returns the row and whether this transaction inserted it. Two racing
    /// callers with the same name serialize on the store lock, so the second
    /// always observes the first's row.
    pub fn user_by_name_or_insert(&mut self, name: &str) -> (User, bool) {
        if let Some(id) = self.working.users_by_name.get(name)
            && let Some(existing) = self.working.users.get(id)
        {
            return (existing.clone(), false);
        }
        let user = User {
            id: self.working.next_user_id.max(1),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.stage(WalEntry::InsertUser { user: user.clone() });
        (user, true)
    }

    pub fn insert_post(&mut self, user_id: u64, content: &str) -> Result<Post> {
        if !self.working.users.contains_key(&user_id) {
            return Err(AppError::store(format!(
                "post references missing user {user_id}"
            )));
        }
        let post = Post {
            id: self.working.next_post_id.max(1),
            user_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.stage(WalEntry::InsertPost { post: post.clone() });
        Ok(post)
    }

    /// A uniformly random post from the current working state, or `None`
    /// when the table is empty.
    pub fn sample_post(&self) -> Option<Post> {
        let len = self.working.posts.len();
        if len == 0 {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..len);
        self.working.posts.iter().nth(idx).map(|(_, p)| p.clone())
    }

    pub fn update_post(&mut self, id: u64, content: &str) -> Result<Post> {
        if !self.working.posts.contains_key(&id) {
            return Err(AppError::store(format!("post {id} does not exist")));
        }
        self.stage(WalEntry::UpdatePost {
            id,
            content: content.to_string(),
        });
        self.working
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::store(format!("post {id} disappeared during update")))
    }

    pub fn delete_post(&mut self, id: u64) -> Result<()> {
        if !self.working.posts.contains_key(&id) {
            return Err(AppError::store(format!("post {id} does not exist")));
        }
        self.stage(WalEntry::DeletePost { id });
        Ok(())
    }

    pub fn author_name(&self, user_id: u64) -> String {
        self.working.author_name(user_id)
    }

    /// Logs the staged batch and publishes the working state. On any failure
    /// nothing becomes visible and the store is unchanged.
    pub async fn commit(self) -> Result<()> {
        let StoreTx {
            mut guard,
            persistence,
            working,
            staged,
        } = self;
        if staged.is_empty() {
            return Ok(());
        }
        let mut persistence = persistence.lock().await;
        persistence.log(&staged)?;
        *guard = working;
        if persistence.needs_checkpoint()
            && let Err(err) = persistence.checkpoint(&guard)
        {
            // The WAL still holds everything the snapshot missed.
            warn!(error = %err, "checkpoint failed, retaining WAL");
        }
        Ok(())
    }
}
