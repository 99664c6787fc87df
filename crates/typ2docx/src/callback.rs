//! One-shot loopback listener for completion callbacks.
//!
//! The desktop export application offers no synchronous return value. The
//! injected script instead POSTs a small JSON document to
//! `http://localhost:<port>` once the export finishes. [`CallbackListener`]
//! accepts exactly one such delivery; later deliveries are answered with
//! `409 Conflict` and the server stops accepting connections as soon as the
//! first message is in. The body is forwarded as raw bytes, so a payload
//! that is not UTF-8 or not JSON surfaces as `InvalidCallbackPayload` from
//! [`CallbackListener::await_message`] rather than being refused by HTTP.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{one_line, ConvertError, Result};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
const PAYLOAD_PREVIEW_LEN: usize = 200;

/// Completion report sent by the foreign application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallbackMessage {
    Ok {
        path: PathBuf,
    },
    Error {
        message: String,
        #[serde(default)]
        stack: Option<String>,
    },
}

impl CallbackMessage {
    /// Decodes a raw delivery body.
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let payload = std::str::from_utf8(body).map_err(|e| ConvertError::InvalidCallbackPayload {
            payload: preview(&String::from_utf8_lossy(body)),
            reason: e.to_string(),
        })?;
        Self::parse(payload)
    }

    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| ConvertError::InvalidCallbackPayload {
            payload: preview(payload),
            reason: e.to_string(),
        })
    }

    /// Result path on success; an application-side error otherwise.
    ///
    /// The application's stack trace goes to the debug log; the error keeps
    /// the message only, flattened to one line.
    pub fn into_result(self) -> Result<PathBuf> {
        match self {
            CallbackMessage::Ok { path } => Ok(path),
            CallbackMessage::Error { message, stack } => {
                if let Some(stack) = stack.filter(|s| !s.trim().is_empty()) {
                    debug!("Export application stack trace:\n{}", stack);
                }
                Err(ConvertError::ExportServiceError {
                    detail: one_line(&message),
                })
            }
        }
    }
}

#[derive(Clone)]
struct Delivery {
    slot: Arc<Mutex<Option<oneshot::Sender<Bytes>>>>,
    stop: CancellationToken,
}

async fn deliver(State(delivery): State<Delivery>, body: Bytes) -> StatusCode {
    let sender = match delivery.slot.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    match sender {
        Some(sender) => {
            debug!("Callback received ({} bytes)", body.len());
            delivery.stop.cancel();
            if sender.send(body).is_err() {
                warn!("Callback arrived after the listener was abandoned");
            }
            StatusCode::OK
        }
        None => {
            debug!("Rejecting repeated callback delivery");
            StatusCode::CONFLICT
        }
    }
}

/// Single-use HTTP listener bound to the loopback interface.
pub struct CallbackListener {
    port: u16,
    receiver: oneshot::Receiver<Bytes>,
    stop: CancellationToken,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Binds `127.0.0.1:<port>` and starts serving. Port `0` picks an
    /// ephemeral port; read it back with [`CallbackListener::port`].
    pub async fn start(port: u16) -> Result<Self> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = tokio::net::TcpListener::bind(requested)
            .await
            .map_err(|e| ConvertError::io(requested.to_string(), e))?;
        let bound = listener
            .local_addr()
            .map_err(|e| ConvertError::io(requested.to_string(), e))?;

        let (sender, receiver) = oneshot::channel();
        let stop = CancellationToken::new();
        let delivery = Delivery {
            slot: Arc::new(Mutex::new(Some(sender))),
            stop: stop.clone(),
        };

        let app = Router::new().route("/", post(deliver)).with_state(delivery);
        let shutdown = stop.clone();
        let server = tokio::spawn(async move {
            let serving = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serving.await {
                warn!("Callback listener stopped with error: {}", e);
            }
        });

        info!("Listening for export callback on {}", bound);
        Ok(Self {
            port: bound.port(),
            receiver,
            stop,
            server,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the single delivery, at most `timeout`.
    ///
    /// The listener is consumed: whatever the outcome, the server is shut
    /// down and the port released before this returns.
    pub async fn await_message(
        mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CallbackMessage> {
        let outcome = tokio::select! {
            received = &mut self.receiver => received.map_err(|_| ConvertError::ExportServiceError {
                detail: "callback listener stopped before a message arrived".to_string(),
            }),
            _ = tokio::time::sleep(timeout) => Err(ConvertError::CallbackTimeout { waited: timeout }),
            _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        };

        self.shutdown().await;
        CallbackMessage::from_bytes(&outcome?)
    }

    async fn shutdown(&mut self) {
        self.stop.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server)
            .await
            .is_err()
        {
            debug!("Callback listener did not drain in time, aborting");
            self.server.abort();
        }
        debug!("Callback listener on port {} closed", self.port);
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.stop.cancel();
        self.server.abort();
    }
}

fn preview(payload: &str) -> String {
    if payload.len() <= PAYLOAD_PREVIEW_LEN {
        return payload.to_string();
    }
    let mut end = PAYLOAD_PREVIEW_LEN;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &payload[..end])
}
