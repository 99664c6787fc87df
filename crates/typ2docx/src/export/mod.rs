//! The "render to Word" step of the full-fidelity branch.
//!
//! Two mutually exclusive backends implement [`WordExporter`]: the cloud
//! API ([`cloud::CloudExport`]) and desktop automation
//! ([`desktop::DesktopExport`]). [`select_exporter`] maps the configured
//! [`EngineKind`] to one of them.

pub mod cloud;
pub mod desktop;
pub mod inject;
pub mod install;
pub mod launcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineKind, Settings};
use crate::error::Result;

pub use cloud::{CloudExport, HttpPdfServices, JobStatus, PdfServicesApi};
pub use desktop::DesktopExport;
pub use install::install_acrobat;
pub use launcher::{platform_launcher, AppLauncher, Platform};

#[async_trait]
pub trait WordExporter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks everything that can be known before the job starts
    /// (credentials, platform support). Never touches the network.
    fn preflight(&self) -> Result<()>;

    /// Produces `a.docx` in `workdir` from the compiled `pdf`.
    async fn render_to_word(
        &self,
        pdf: &Path,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

/// Builds the backend for `kind`.
pub fn select_exporter(kind: EngineKind, settings: &Settings) -> Arc<dyn WordExporter> {
    match kind {
        EngineKind::Cloud => Arc::new(CloudExport::from_settings(settings)),
        EngineKind::Desktop => Arc::new(DesktopExport::new(platform_launcher(), settings)),
    }
}
