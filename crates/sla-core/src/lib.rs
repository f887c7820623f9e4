pub mod breach;
pub mod config;
pub mod error;
pub mod io;
pub mod store;
pub mod tracker;
pub mod types;

pub use breach::{classify, BreachState};
pub use error::{Result, SlaError};
pub use store::{MemoryTrackerStore, TrackerDb, TrackerRepository};
pub use tracker::{HistoryEntry, SlaTracker};
pub use types::TrackerStatus;
