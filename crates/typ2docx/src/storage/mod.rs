pub mod filesystem;
pub mod temp_file;
pub mod workspace;

pub use filesystem::move_file;
pub use temp_file::{scoped_temp_file, ScopedFile};
pub use workspace::{Artifact, Workspace, DEBUG_DIR_NAME};
