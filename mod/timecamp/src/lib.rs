pub mod api;
pub mod http;
pub mod model;
pub mod tree;

pub use api::{TimeCamp, TimeCampApi};
pub use model::{LiveGroup, LiveUser, RoleAssignment, UserPatch};
pub use tree::GroupTree;
