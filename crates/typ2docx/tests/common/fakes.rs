//! Test doubles for the export backends, the cloud API and the desktop
//! application.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use typ2docx::callback::CallbackMessage;
use typ2docx::export::inject::read_injected_script;
use typ2docx::export::{AppLauncher, JobStatus, PdfServicesApi};
use typ2docx::pipeline::JobState;
use typ2docx::secrets::Credentials;
use typ2docx::{ConvertError, ProgressEvent, ProgressReporter, Result, WordExporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportBehavior {
    /// Writes `a.docx` containing "A\n".
    Succeed,
    /// Fails with an export service error.
    Fail,
    /// Never finishes on its own; returns `Cancelled` once cancelled.
    Hang,
}

/// Export backend that never leaves the process.
pub struct FakeExporter {
    behavior: ExportBehavior,
    calls: AtomicUsize,
}

impl FakeExporter {
    pub fn new(behavior: ExportBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WordExporter for FakeExporter {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    async fn render_to_word(
        &self,
        pdf: &Path,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(pdf.exists(), "export started before the PDF exists");

        match self.behavior {
            ExportBehavior::Succeed => {
                let target = workdir.join("a.docx");
                std::fs::write(&target, "A\n").map_err(|e| ConvertError::io(&target, e))?;
                Ok(target)
            }
            ExportBehavior::Fail => Err(ConvertError::ExportServiceError {
                detail: "quota exceeded".to_string(),
            }),
            ExportBehavior::Hang => {
                cancel.cancelled().await;
                Err(ConvertError::Cancelled)
            }
        }
    }
}

/// Records every progress event.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<JobState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Transition(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Cloud API double that only counts how often it was reached.
#[derive(Default)]
pub struct CountingPdfServices {
    calls: AtomicUsize,
}

impl CountingPdfServices {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConvertError::ExportServiceError {
            detail: "network disabled in tests".to_string(),
        })
    }
}

#[async_trait]
impl PdfServicesApi for CountingPdfServices {
    async fn access_token(&self, _credentials: &Credentials) -> Result<SecretString> {
        self.hit()
    }

    async fn upload(
        &self,
        _credentials: &Credentials,
        _token: &SecretString,
        _pdf: Vec<u8>,
    ) -> Result<String> {
        self.hit()
    }

    async fn submit(
        &self,
        _credentials: &Credentials,
        _token: &SecretString,
        _asset_id: &str,
    ) -> Result<String> {
        self.hit()
    }

    async fn status(
        &self,
        _credentials: &Credentials,
        _token: &SecretString,
        _location: &str,
    ) -> Result<JobStatus> {
        self.hit()
    }

    async fn download(&self, _download_uri: &str) -> Result<Vec<u8>> {
        self.hit()
    }
}

/// Plays the desktop application: reads the callback port from the
/// injected script, saves a result file and reports it.
pub struct FakeDesktopApp {
    pub save_dir: PathBuf,
    pub opened: AtomicUsize,
}

impl FakeDesktopApp {
    pub fn new(save_dir: &Path) -> Self {
        Self {
            save_dir: save_dir.to_path_buf(),
            opened: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AppLauncher for FakeDesktopApp {
    async fn launch_or_focus(&self, _cancel: &CancellationToken) -> Result<bool> {
        Ok(false)
    }

    async fn open(&self, document: &Path, _cancel: &CancellationToken) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let script = read_injected_script(document)?;
        let port: u16 = regex::Regex::new(r"const PORT = (\d+);")
            .unwrap()
            .captures(&script)
            .expect("injected script carries the port")[1]
            .parse()
            .unwrap();

        let saved = self.save_dir.join(format!("typ2docx-{}.docx", port));
        std::fs::write(&saved, "A\n").unwrap();

        tokio::spawn(async move {
            let body = serde_json::to_string(&CallbackMessage::Ok { path: saved }).unwrap();
            let _ = reqwest::Client::new()
                .post(format!("http://127.0.0.1:{}/", port))
                .body(body)
                .send()
                .await;
        });
        Ok(())
    }
}
