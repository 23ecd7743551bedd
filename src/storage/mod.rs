pub mod persistence;
pub mod store;

pub use persistence::{PersistenceManager, WalEntry, snapshot_path, wal_path};
pub use store::{Store, StoreCounts, StoreTx};
