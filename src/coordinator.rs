//! The single write path. Every mutation is one scoped store transaction;
//! on success the matching session counter is bumped and at most one change
//! event is published. The store's transaction lock is the only
//! serialization point, so all four operations are safe to call
//! concurrently.

use std::sync::Arc;

use crate::core::{AppError, ChangeEvent, PostView, Result, SessionStats, User};
use crate::hub::EventHub;
use crate::storage::Store;
use crate::workload::synthetic_content;

pub struct WriteCoordinator {
    store: Arc<Store>,
    hub: Arc<EventHub>,
    stats: Arc<SessionStats>,
}

impl WriteCoordinator {
    pub fn new(store: Arc<Store>, hub: Arc<EventHub>, stats: Arc<SessionStats>) -> Self {
        Self { store, hub, stats }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Resolves or creates the author, inserts the post, commits, and emits
    /// a `Created` event.
    pub async fn create_post(&self, name: &str, content: &str) -> Result<PostView> {
        let name = name.trim();
        let content = content.trim();
        if name.is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }
        if content.is_empty() {
            return Err(AppError::validation("content must not be empty"));
        }

        let mut tx = self.store.begin().await;
        let (user, _) = tx.user_by_name_or_insert(name);
        let post = tx.insert_post(user.id, content)?;
        tx.commit().await?;

        self.stats.record_post_created();
        let view = PostView::new(&post, &user.name);
        self.hub.publish(ChangeEvent::Created(view.clone())).await;
        Ok(view)
    }

    /// Insert-or-ignore on `name`. A duplicate name is not an error: the
    /// existing row comes back, the session counter stays untouched, and
    /// nothing is published.
    pub async fn create_user(&self, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }

        let mut tx = self.store.begin().await;
        let (user, inserted) = tx.user_by_name_or_insert(name);
        tx.commit().await?;

        if inserted {
            self.stats.record_user_created();
        }
        Ok(user)
    }

    /// Rewrites a uniformly random post's content to a generated value.
    /// Returns `None` (and emits nothing) while no posts exist.
    pub async fn update_post(&self) -> Result<Option<PostView>> {
        let mut tx = self.store.begin().await;
        let Some(target) = tx.sample_post() else {
            return Ok(None);
        };
        let post = tx.update_post(target.id, &synthetic_content())?;
        let author = tx.author_name(post.user_id);
        tx.commit().await?;

        self.stats.record_post_updated();
        let view = PostView::new(&post, &author);
        self.hub.publish(ChangeEvent::Updated(view.clone())).await;
        Ok(Some(view))
    }

    /// Deletes a uniformly random post. Returns `None` (and emits nothing)
    /// while no posts exist.
    pub async fn delete_post(&self) -> Result<Option<u64>> {
        let mut tx = self.store.begin().await;
        let Some(target) = tx.sample_post() else {
            return Ok(None);
        };
        tx.delete_post(target.id)?;
        tx.commit().await?;

        self.stats.record_post_deleted();
        self.hub.publish(ChangeEvent::Deleted { id: target.id }).await;
        Ok(Some(target.id))
    }
}
