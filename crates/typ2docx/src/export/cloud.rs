//! Export through the Adobe PDF Services REST API.
//!
//! The flow is: exchange credentials for an access token, register an
//! upload asset, PUT the PDF to the pre-signed URI, submit an export job,
//! poll the job location until it is done, then download the result.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::WordExporter;
use crate::config::Settings;
use crate::error::{one_line, ConvertError, Result};
use crate::secrets::Credentials;
use crate::storage::Artifact;

const MAX_ERROR_BODY_LENGTH: usize = 200;

/// State of a submitted export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Done { download_uri: String },
    Failed { detail: String },
}

/// The network calls of the export flow, one method per request.
#[async_trait]
pub trait PdfServicesApi: Send + Sync {
    async fn access_token(&self, credentials: &Credentials) -> Result<SecretString>;

    /// Uploads the PDF and returns its asset id.
    async fn upload(&self, credentials: &Credentials, token: &SecretString, pdf: Vec<u8>)
        -> Result<String>;

    /// Submits the export job and returns the job location to poll.
    async fn submit(&self, credentials: &Credentials, token: &SecretString, asset_id: &str)
        -> Result<String>;

    async fn status(&self, credentials: &Credentials, token: &SecretString, location: &str)
        -> Result<JobStatus>;

    async fn download(&self, download_uri: &str) -> Result<Vec<u8>>;
}

type CredentialLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Cloud variant of the Word export.
pub struct CloudExport {
    api: Arc<dyn PdfServicesApi>,
    lookup: CredentialLookup,
    poll_interval: Duration,
    export_timeout: Duration,
}

impl CloudExport {
    /// Uses the HTTP client and reads credentials from the environment.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(HttpPdfServices::new(settings.cloud_base_url.clone())),
            settings,
        )
    }

    pub fn new(api: Arc<dyn PdfServicesApi>, settings: &Settings) -> Self {
        Self {
            api,
            lookup: Arc::new(|name| std::env::var(name).ok()),
            poll_interval: settings.poll_interval,
            export_timeout: settings.export_timeout,
        }
    }

    /// Replaces the environment as the credential source.
    pub fn with_credential_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    fn credentials(&self) -> Result<Credentials> {
        let lookup = self.lookup.as_ref();
        Credentials::from_lookup(|name| lookup(name))
    }

    async fn wait_for_job(
        &self,
        credentials: &Credentials,
        token: &SecretString,
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let started = Instant::now();
        loop {
            match cancellable(cancel, self.api.status(credentials, token, location)).await? {
                JobStatus::Done { download_uri } => return Ok(download_uri),
                JobStatus::Failed { detail } => {
                    return Err(ConvertError::ExportServiceError { detail })
                }
                JobStatus::InProgress => {}
            }

            if started.elapsed() >= self.export_timeout {
                return Err(ConvertError::Timeout {
                    tool: "pdfservices".to_string(),
                    after: self.export_timeout,
                });
            }
            debug!("Export job still in progress");
            cancellable(cancel, async {
                tokio::time::sleep(self.poll_interval).await;
                Ok(())
            })
            .await?;
        }
    }
}

#[async_trait]
impl WordExporter for CloudExport {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn preflight(&self) -> Result<()> {
        self.credentials().map(drop)
    }

    async fn render_to_word(
        &self,
        pdf: &Path,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let credentials = self.credentials()?;
        let span = tracing::info_span!("export.cloud", pdf = %pdf.display());

        async {
            let bytes = tokio::fs::read(pdf)
                .await
                .map_err(|e| ConvertError::io(pdf, e))?;

            let token = cancellable(cancel, self.api.access_token(&credentials)).await?;
            let asset_id = cancellable(cancel, self.api.upload(&credentials, &token, bytes)).await?;
            let location = cancellable(cancel, self.api.submit(&credentials, &token, &asset_id)).await?;
            info!("Export job submitted");

            let download_uri = self.wait_for_job(&credentials, &token, &location, cancel).await?;
            let docx = cancellable(cancel, self.api.download(&download_uri)).await?;

            let target = workdir.join(Artifact::ExportedDocx.file_name());
            tokio::fs::write(&target, docx)
                .await
                .map_err(|e| ConvertError::io(&target, e))?;
            Ok::<_, ConvertError>(target)
        }
        .instrument(span)
        .await
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        outcome = call => outcome,
        _ = cancel.cancelled() => Err(ConvertError::Cancelled),
    }
}

/// Flattens and truncates service responses before they end up in
/// diagnostics.
fn sanitize_body(body: &str) -> String {
    let body = one_line(body);
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body;
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", body[..end].trim_end())
}

fn service_error(step: &str, e: impl std::fmt::Display) -> ConvertError {
    ConvertError::ExportServiceError {
        detail: format!("{} failed: {}", step, e),
    }
}

async fn ensure_success(step: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConvertError::ExportServiceError {
        detail: format!("{} returned HTTP {}: {}", step, status, sanitize_body(&body)),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(rename = "assetID")]
    asset_id: String,
    upload_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    asset: Option<ResultAsset>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultAsset {
    download_uri: String,
}

impl StatusResponse {
    fn into_status(self) -> Result<JobStatus> {
        match self.status.as_str() {
            "done" => self
                .asset
                .map(|asset| JobStatus::Done {
                    download_uri: asset.download_uri,
                })
                .ok_or_else(|| ConvertError::ExportServiceError {
                    detail: "job finished without a result asset".to_string(),
                }),
            "failed" => Ok(JobStatus::Failed {
                detail: self
                    .error
                    .map(|e| sanitize_body(&e.to_string()))
                    .unwrap_or_else(|| "export job failed".to_string()),
            }),
            _ => Ok(JobStatus::InProgress),
        }
    }
}

/// [`PdfServicesApi`] over HTTPS.
pub struct HttpPdfServices {
    client: Client,
    base_url: String,
}

impl HttpPdfServices {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorized(credentials: &Credentials, token: &SecretString) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = credentials.client_id.parse() {
            headers.insert("x-api-key", value);
        }
        if let Ok(value) = format!("Bearer {}", token.expose_secret()).parse() {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers
    }
}

#[async_trait]
impl PdfServicesApi for HttpPdfServices {
    async fn access_token(&self, credentials: &Credentials) -> Result<SecretString> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose_secret()),
        ];
        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .form(&params)
            .send()
            .await
            .map_err(|e| service_error("Token request", e))?;
        let token: TokenResponse = ensure_success("Token request", response)
            .await?
            .json()
            .await
            .map_err(|e| service_error("Parsing token response", e))?;
        Ok(SecretString::from(token.access_token))
    }

    async fn upload(
        &self,
        credentials: &Credentials,
        token: &SecretString,
        pdf: Vec<u8>,
    ) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/assets", self.base_url))
            .headers(Self::authorized(credentials, token))
            .json(&json!({ "mediaType": "application/pdf" }))
            .send()
            .await
            .map_err(|e| service_error("Asset registration", e))?;
        let asset: UploadResponse = ensure_success("Asset registration", response)
            .await?
            .json()
            .await
            .map_err(|e| service_error("Parsing asset response", e))?;

        let response = self
            .client
            .put(&asset.upload_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf)
            .send()
            .await
            .map_err(|e| service_error("Upload", e))?;
        ensure_success("Upload", response).await?;

        debug!("Uploaded asset {}", asset.asset_id);
        Ok(asset.asset_id)
    }

    async fn submit(
        &self,
        credentials: &Credentials,
        token: &SecretString,
        asset_id: &str,
    ) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/operation/exportpdf", self.base_url))
            .headers(Self::authorized(credentials, token))
            .json(&json!({ "assetID": asset_id, "targetFormat": "docx" }))
            .send()
            .await
            .map_err(|e| service_error("Job submission", e))?;
        let response = ensure_success("Job submission", response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ConvertError::ExportServiceError {
                detail: "job submission returned no location".to_string(),
            })
    }

    async fn status(
        &self,
        credentials: &Credentials,
        token: &SecretString,
        location: &str,
    ) -> Result<JobStatus> {
        let response = self
            .client
            .get(location)
            .headers(Self::authorized(credentials, token))
            .send()
            .await
            .map_err(|e| service_error("Status poll", e))?;
        let status: StatusResponse = ensure_success("Status poll", response)
            .await?
            .json()
            .await
            .map_err(|e| service_error("Parsing job status", e))?;
        status.into_status()
    }

    async fn download(&self, download_uri: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(download_uri)
            .send()
            .await
            .map_err(|e| service_error("Download", e))?;
        let bytes = ensure_success("Download", response)
            .await?
            .bytes()
            .await
            .map_err(|e| service_error("Download", e))?;
        Ok(bytes.to_vec())
    }
}
