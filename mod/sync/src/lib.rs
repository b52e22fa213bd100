pub mod engine;
pub mod report;

pub use engine::SyncEngine;
pub use report::{SyncOptions, SyncReport};
