pub mod callback;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod processor;
pub mod runner;
pub mod secrets;
pub mod storage;

pub use callback::{CallbackListener, CallbackMessage};
pub use config::{load_settings, EngineKind, RetryPolicy, Settings, WorkerFlavor};
pub use error::{ConfigError, ConvertError, Result};
pub use export::{install_acrobat, select_exporter, WordExporter};
pub use pipeline::{
    ConversionJob, ConversionReport, NoopProgress, Pipeline, PipelineError, ProgressEvent,
    ProgressReporter, TracingProgress,
};
pub use processor::{extract_equations, math_document};
pub use secrets::Credentials;
pub use storage::{Workspace, DEBUG_DIR_NAME};
