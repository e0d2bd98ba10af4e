//! Request/response contract with the spreadsheet server.
//!
//! The server owns parsing, sorting and filtering. The client only uploads a file, asks for
//! 0-based pages of it and tells the server to forget it again.

use std::borrow::Cow;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, Response, multipart};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::query::{Cell, NON_NUMERIC_KEY, QueryResult, Row};
use crate::resolver::FetchRequest;
use crate::view_state::FileId;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    Url(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// The calls the sync controller makes. Every call blocks; the dispatcher runs them off the UI thread.
pub trait Backend: Send + Sync {
    fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<FileId, BackendError>;
    fn fetch(&self, request: &FetchRequest) -> Result<QueryResult, BackendError>;
    fn clear(&self, file: &FileId) -> Result<(), BackendError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    data: Vec<Map<String, Value>>,
    headers: Vec<String>,
    total_rows: u64,
}

pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base_url(server_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::Url(e.to_string()))
    }

    fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

impl Backend for HttpBackend {
    fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<FileId, BackendError> {
        let url = self.endpoint("upload")?;
        debug!("POST {url} ({} bytes, {file_name})", bytes.len());
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let response = Self::check(self.client.post(url).multipart(form).send()?)?;
        let body: UploadResponse = response.json()?;
        Ok(FileId::new(body.filename))
    }

    fn fetch(&self, request: &FetchRequest) -> Result<QueryResult, BackendError> {
        let url = request_url(&self.base, request)?;
        debug!("GET {url}");
        let response = Self::check(self.client.get(url).send()?)?;
        let text = response.text()?;
        decode_page(&text, request.page())
    }

    fn clear(&self, file: &FileId) -> Result<(), BackendError> {
        let url = self.endpoint("clear")?;
        debug!("POST {url} for {file}");
        let body = serde_json::json!({ "filename": file.as_str() });
        Self::check(self.client.post(url).json(&body).send()?)?;
        Ok(())
    }
}

/// Endpoints are joined onto the base, so it has to end with a slash.
pub fn base_url(server_url: &str) -> Result<Url, BackendError> {
    let mut normalized = server_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).map_err(|e| BackendError::Url(format!("{server_url}: {e}")))
}

pub fn request_url(base: &Url, request: &FetchRequest) -> Result<Url, BackendError> {
    let mut url = base
        .join(request.endpoint())
        .map_err(|e| BackendError::Url(e.to_string()))?;
    url.query_pairs_mut().extend_pairs(request.query_pairs());
    Ok(url)
}

/// Decodes a `/data` or `/filter` body into a result for `page`.
pub fn decode_page(text: &str, page: usize) -> Result<QueryResult, BackendError> {
    let body: DataResponse = serde_json::from_str(&mask_non_finite(text))?;
    trace!(
        "Decoded {} rows of {} for page {page}",
        body.data.len(),
        body.total_rows
    );
    let rows = body
        .data
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|(k, v)| (k, Cell::from(v)))
                .collect::<Row>()
        })
        .collect();
    Ok(QueryResult {
        rows,
        columns: body.headers,
        total_row_count: body.total_rows,
        requested_page: page,
    })
}

const NON_FINITE_TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Replaces bare `NaN` / `Infinity` / `-Infinity` tokens outside of strings with a sentinel
/// object that decodes into `Cell::NonNumeric`. Plain JSON has no such tokens.
pub fn mask_non_finite(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        if let Some(token) = NON_FINITE_TOKENS
            .iter()
            .find(|t| bytes[i..].starts_with(t.as_bytes()))
        {
            let buf = out.get_or_insert_with(|| String::with_capacity(text.len() + 32));
            buf.push_str(&text[copied..i]);
            buf.push_str(&format!("{{\"{NON_NUMERIC_KEY}\":\"{token}\"}}"));
            i += token.len();
            copied = i;
            continue;
        }
        i += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&text[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(text),
    }
}
