//! HTTP transaction executor
//!
//! Sends one request at a time to the device under test. Every call races
//! the per-request timeout against the session cancellation token, except
//! calls flagged `always_send` which only observe the timeout.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::device::DeviceType;
use crate::imagebytes::IMAGE_BYTES_MIME;
use crate::io::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::parameter::Parameter;

/// Response header announcing a Base64 hand-off response
pub const BASE64_HANDOFF_HEADER: &str = "base64handoff";

/// Where a request is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// A member of the configured device; the path element is already lower-case
    Member(String),
    /// A path relative to the server root, used for malformed URLs
    Raw(String),
}

/// Why a transaction produced no response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("request cancelled")]
    Cancelled,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Transport(String),
}

/// The body of a response, sorted by how it must be validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// HTTP 200 carrying a JSON envelope
    Json(String),
    /// HTTP 200 carrying an ImageBytes frame
    ImageBytes(Vec<u8>),
    /// Any non-200 response, or an HTML error page
    Text(String),
}

/// Outcome of one HTTP call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub status: u16,
    pub body: ResponseBody,
    pub headers: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl TransactionResult {
    fn from_response(response: HttpResponse, elapsed: Duration) -> Self {
        let is_image_bytes = response
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(IMAGE_BYTES_MIME));

        let body = if response.status != 200 {
            ResponseBody::Text(response.body_text())
        } else if is_image_bytes {
            ResponseBody::ImageBytes(response.body)
        } else {
            let text = response.body_text();
            if is_html(&text) {
                ResponseBody::Text(text)
            } else {
                ResponseBody::Json(text)
            }
        };

        Self {
            status: response.status,
            body,
            headers: response.headers,
            elapsed,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The server answered with a Base64 hand-off response
    pub fn is_base64_handoff(&self) -> bool {
        self.header(BASE64_HANDOFF_HEADER)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// An HTTP 200 whose body is an HTML page rather than an Alpaca response
    pub fn is_error_page(&self) -> bool {
        self.status == 200 && matches!(self.body, ResponseBody::Text(_))
    }
}

fn is_html(body: &str) -> bool {
    let start: String = body.trim_start().chars().take(15).collect();
    let start = start.to_ascii_lowercase();
    start.starts_with("<!doctype html") || start.starts_with("<html")
}

/// Sends requests to the device under test
pub struct Executor {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    device_type: DeviceType,
    device_number: u32,
    timeout: Duration,
    cancel: CancellationToken,
    headers: Arc<Mutex<Vec<(String, String)>>>,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        device_type: DeviceType,
        device_number: u32,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            device_type,
            device_number,
            timeout,
            cancel,
            headers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `{base}/api/v1/{device type}/{device number}/{member}` for members
    pub fn url(&self, target: &RequestTarget) -> String {
        match target {
            RequestTarget::Member(member) => format!(
                "{}/api/v1/{}/{}/{}",
                self.base_url,
                self.device_type.path(),
                self.device_number,
                member
            ),
            RequestTarget::Raw(path) => format!("{}{}", self.base_url, path),
        }
    }

    /// Add request headers until the returned scope is dropped
    pub fn scoped_headers(&self, headers: Vec<(String, String)>) -> HeaderScope {
        let mut current = self.headers.lock().unwrap_or_else(|e| e.into_inner());
        let previous = current.clone();
        current.extend(headers);
        HeaderScope {
            headers: Arc::clone(&self.headers),
            previous: Some(previous),
        }
    }

    /// Headers currently added to every request
    pub fn current_headers(&self) -> Vec<(String, String)> {
        self.headers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send one request
    pub async fn send(
        &self,
        target: &RequestTarget,
        method: HttpMethod,
        params: &[Parameter],
        always_send: bool,
    ) -> Result<TransactionResult, TransactionError> {
        if !always_send && self.cancel.is_cancelled() {
            return Err(TransactionError::Cancelled);
        }

        let request = HttpRequest {
            method,
            url: self.url(target),
            params: params.to_vec(),
            headers: self.current_headers(),
        };
        let started = Instant::now();
        let call = tokio::time::timeout(self.timeout, self.transport.send(&request));

        let outcome = if always_send {
            call.await
        } else {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("{} {} cancelled", method, request.url);
                    return Err(TransactionError::Cancelled);
                }
                outcome = call => outcome,
            }
        };

        match outcome {
            Err(_) => Err(TransactionError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(TransactionError::Transport(e.to_string())),
            Ok(Ok(response)) => Ok(TransactionResult::from_response(
                response,
                started.elapsed(),
            )),
        }
    }
}

/// Restores the request headers when dropped
pub struct HeaderScope {
    headers: Arc<Mutex<Vec<(String, String)>>>,
    previous: Option<Vec<(String, String)>>,
}

impl Drop for HeaderScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let mut current = self.headers.lock().unwrap_or_else(|e| e.into_inner());
            *current = previous;
        }
    }
}
