use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row in the `users` table. Users are created implicitly by the first post
/// under a name, or explicitly by the workload generator; they are never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A row in the `posts` table. `user_id` references an existing user at
/// commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub user_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A post joined with its author's name, as served over HTTP and carried in
/// change events. Observers can render it without a follow-up query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
}

impl PostView {
    pub fn new(post: &Post, author: &str) -> Self {
        Self {
            id: post.id,
            content: post.content.clone(),
            created_at: post.created_at,
            name: author.to_string(),
        }
    }
}

/// One committed mutation, as delivered to real-time observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ChangeEvent {
    #[serde(rename = "NEW_POST")]
    Created(PostView),
    #[serde(rename = "UPDATED_POST")]
    Updated(PostView),
    #[serde(rename = "DELETED_POST")]
    Deleted { id: u64 },
}

/// Monotonic counters scoped to the current process lifetime. Reset on
/// restart; reconciled against store-of-record totals by the status
/// aggregator.
#[derive(Debug, Default)]
pub struct SessionStats {
    users_created: AtomicU64,
    posts_created: AtomicU64,
    posts_updated: AtomicU64,
    posts_deleted: AtomicU64,
    workload_errors: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_user_created(&self) {
        self.users_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_created(&self) {
        self.posts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_updated(&self) {
        self.posts_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_deleted(&self) {
        self.posts_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workload_error(&self) {
        self.workload_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            users_created: self.users_created.load(Ordering::Relaxed),
            posts_created: self.posts_created.load(Ordering::Relaxed),
            posts_updated: self.posts_updated.load(Ordering::Relaxed),
            posts_deleted: self.posts_deleted.load(Ordering::Relaxed),
            workload_errors: self.workload_errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub users_created: u64,
    pub posts_created: u64,
    pub posts_updated: u64,
    pub posts_deleted: u64,
    pub workload_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_event_wire_format() {
        let view = PostView {
            id: 7,
            content: "hello".to_string(),
            created_at: Utc::now(),
            name: "alice".to_string(),
        };

        let json = serde_json::to_value(ChangeEvent::Created(view)).unwrap();
        assert_eq!(json["type"], "NEW_POST");
        assert_eq!(json["payload"]["name"], "alice");
        assert_eq!(json["payload"]["content"], "hello");

        let json = serde_json::to_value(ChangeEvent::Deleted { id: 7 }).unwrap();
        assert_eq!(json["type"], "DELETED_POST");
        assert_eq!(json["payload"]["id"], 7);
    }

    #[test]
    fn session_counters_accumulate() {
        let stats = SessionStats::new();
        stats.record_post_created();
        stats.record_post_created();
        stats.record_user_created();

        let counters = stats.counters();
        assert_eq!(counters.posts_created, 2);
        assert_eq!(counters.users_created, 1);
        assert_eq!(counters.posts_deleted, 0);
    }
}
