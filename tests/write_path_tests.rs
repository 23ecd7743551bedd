/// Write path tests
///
/// Atomicity, event emission, and counter reconciliation through the
/// write coordinator.
/// Run with: cargo test --test write_path_tests
use std::sync::Arc;

use liveboard::{AppState, Store};
use tempfile::TempDir;
use tokio::sync::mpsc::error::TryRecvError;

async fn state_in(dir: &TempDir) -> AppState {
    let store = Store::open(dir.path()).await.unwrap();
    AppState::new(Arc::new(store))
}

#[tokio::test]
async fn concurrent_posts_with_same_new_name_create_one_user() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    let mut handles = Vec::new();
    for n in 0..8 {
        let coordinator = state.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .create_post("alice", &format!("post {n}"))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        let view = handle.await.unwrap();
        assert_eq!(view.name, "alice");
    }

    let counts = state.store.counts().await;
    assert_eq!(counts.users, 1);
    assert_eq!(counts.posts, 8);
}

#[tokio::test]
async fn duplicate_create_user_emits_nothing_and_keeps_counter() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    let first = state.coordinator.create_user("bob").await.unwrap();

    let (_id, mut events) = state.hub.subscribe().await;
    let second = state.coordinator.create_user("bob").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(state.coordinator.stats().counters().users_created, 1);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn update_and_delete_on_empty_table_return_nothing() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;
    let (_id, mut events) = state.hub.subscribe().await;

    assert!(state.coordinator.update_post().await.unwrap().is_none());
    assert!(state.coordinator.delete_post().await.unwrap().is_none());

    let counters = state.coordinator.stats().counters();
    assert_eq!(counters.posts_updated, 0);
    assert_eq!(counters.posts_deleted, 0);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn successful_mutations_emit_one_event_each() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;
    let (_id, mut events) = state.hub.subscribe().await;

    state.coordinator.create_post("carol", "hi").await.unwrap();
    state.coordinator.update_post().await.unwrap().unwrap();
    state.coordinator.delete_post().await.unwrap().unwrap();

    let created = events.recv().await.unwrap();
    let updated = events.recv().await.unwrap();
    let deleted = events.recv().await.unwrap();
    assert!(matches!(created, liveboard::ChangeEvent::Created(_)));
    assert!(matches!(updated, liveboard::ChangeEvent::Updated(_)));
    assert!(matches!(deleted, liveboard::ChangeEvent::Deleted { .. }));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn validation_rejects_blank_input() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    assert!(matches!(
        state.coordinator.create_post("", "hi").await,
        Err(liveboard::AppError::Validation(_))
    ));
    assert!(matches!(
        state.coordinator.create_post("alice", "   ").await,
        Err(liveboard::AppError::Validation(_))
    ));
    assert!(matches!(
        state.coordinator.create_user("").await,
        Err(liveboard::AppError::Validation(_))
    ));
}

#[tokio::test]
async fn snapshot_reconciles_session_counters_with_store_totals() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    for n in 0..5 {
        let author = if n % 2 == 0 { "alice" } else { "bob" };
        state
            .coordinator
            .create_post(author, &format!("post {n}"))
            .await
            .unwrap();
    }

    let snapshot = state.aggregator.snapshot().await;
    assert!(snapshot.total_posts >= 5);
    assert!(snapshot.total_users >= 2);
    assert_eq!(snapshot.posts_created_this_session, 5);
    assert!(!snapshot.is_running);
    assert!(snapshot.replica_artifact_size.unwrap_or(0) > 0);
}
