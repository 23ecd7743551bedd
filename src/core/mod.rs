pub mod error;
pub mod types;

pub use error::{AppError, Result};
pub use types::{ChangeEvent, Post, PostView, SessionCounters, SessionStats, User};
