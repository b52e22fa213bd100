pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{StorageConfig, TimeCampConfig};
pub use error::SyncError;
pub use types::{DesiredUser, Person, Role, SourceFile, UserStatus};
