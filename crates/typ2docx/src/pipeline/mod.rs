//! Two-branch conversion pipeline.
//!
//! ```text
//!          ┌─ compile ─ export ──────┐
//! input ───┤                         ├── merge ── output
//!          └─ extract ─ pandoc ──────┘
//! ```

pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use context::{default_output, ConversionJob};
pub use error::{Branch, PipelineError, Stage};
pub use progress::{JobState, NoopProgress, ProgressEvent, ProgressReporter, TracingProgress};
pub use runner::{ConversionReport, Pipeline};
