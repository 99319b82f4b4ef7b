#![forbid(unsafe_code)]

pub mod cache;
pub mod durable;
pub mod repository;
pub mod schema;
pub mod sqlite;

pub use cache::{CacheError, FileCache, MemoryCache, ProgressCache};
pub use durable::DurableStore;
pub use repository::{ExerciseProgress, Storage, StorageError};
pub use schema::{LoadOutcome, PROGRESS_CACHE_KEY, SchemaError};
