pub mod error;
pub mod loader;
pub mod settings;
pub mod source;
pub mod status;

pub use error::{LoadFailure, ResolverError};
pub use loader::{LoadGate, LoadPlan};
pub use settings::{ResolverSettings, SettingsManager};
pub use source::{ModelSource, SourceConfig};
pub use status::{status_router, StatusState};
