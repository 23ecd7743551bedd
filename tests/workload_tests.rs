/// Workload generator tests
///
/// State-machine guards and deterministic stop behavior.
/// Run with: cargo test --test workload_tests
use std::sync::Arc;
use std::time::Duration;

use liveboard::{AppError, AppState, Store};
use tempfile::TempDir;
use tokio::time::sleep;

async fn state_in(dir: &TempDir) -> AppState {
    let store = Store::open(dir.path()).await.unwrap();
    AppState::new(Arc::new(store))
}

#[tokio::test]
async fn start_twice_fails_the_second_time() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    state.workload.start(5.0).await.unwrap();
    assert!(matches!(
        state.workload.start(5.0).await,
        Err(AppError::InvalidState(_))
    ));
    state.workload.stop().await.unwrap();
}

#[tokio::test]
async fn stop_while_idle_fails() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    assert!(matches!(
        state.workload.stop().await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn stop_start_stop_each_succeed() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    state.workload.start(5.0).await.unwrap();
    state.workload.stop().await.unwrap();
    state.workload.start(5.0).await.unwrap();
    state.workload.stop().await.unwrap();
}

#[tokio::test]
async fn start_rejects_non_positive_rates() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    for rate in [0.0, -3.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            state.workload.start(rate).await,
            Err(AppError::Validation(_))
        ));
    }
    assert!(!state.workload.status().await.running);
}

#[tokio::test]
async fn status_reflects_running_state_and_rate() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    assert!(!state.workload.status().await.running);

    state.workload.start(25.0).await.unwrap();
    let status = state.workload.status().await;
    assert!(status.running);
    assert_eq!(status.rate, Some(25.0));

    state.workload.stop().await.unwrap();
    assert!(!state.workload.status().await.running);
}

#[tokio::test]
async fn running_workload_generates_writes() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    // Seed one author so create-post ticks have someone to write as.
    state.coordinator.create_user("seed").await.unwrap();

    state.workload.start(200.0).await.unwrap();
    sleep(Duration::from_millis(400)).await;
    state.workload.stop().await.unwrap();

    let counters = state.coordinator.stats().counters();
    let total =
        counters.posts_created + counters.posts_updated + counters.posts_deleted + counters.users_created;
    assert!(total > 1, "expected workload activity, got {counters:?}");
}

#[tokio::test]
async fn stop_halts_scheduling_of_new_operations() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    state.coordinator.create_user("seed").await.unwrap();
    state.workload.start(500.0).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    state.workload.stop().await.unwrap();

    // Let any operation that was already in flight at stop time settle.
    sleep(Duration::from_millis(100)).await;
    let settled = state.coordinator.stats().counters();

    sleep(Duration::from_millis(300)).await;
    let later = state.coordinator.stats().counters();
    assert_eq!(settled, later);
}

#[tokio::test]
async fn empty_store_ticks_never_halt_the_generator() {
    let dir = TempDir::new().unwrap();
    let state = state_in(&dir).await;

    // With no users and no posts every tick is either a skip or a no-op;
    // none of them may kill the generator.
    state.workload.start(200.0).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(state.workload.status().await.running);
    state.workload.stop().await.unwrap();
}
