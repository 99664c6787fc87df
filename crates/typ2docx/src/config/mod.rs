pub mod loader;
pub mod schema;

pub use loader::{load_settings, load_settings_with};
pub use schema::{EngineKind, RetryPolicy, Settings, WorkerFlavor};
