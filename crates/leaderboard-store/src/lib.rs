pub mod database;
pub mod error;
pub mod memory;
pub mod row_helpers;
pub mod schema;
pub mod scores;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryScoreStore;
pub use scores::{PutOutcome, ScoreStore, ScoreRepo};
