pub mod logs;

pub use logs::{ActivityEntry, ActivityLevel, ActivityLog};
