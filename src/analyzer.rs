use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::app::AiMessage;

/// Upload form layout expected by the analysis service.
const FORM_FIELD: &str = "file";
const FORM_FILE_NAME: &str = "image";
const FORM_MIME: &str = "image/jpg";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reply to an image upload. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub texts_found: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    created_at: f64,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Deserialize)]
struct WireText {
    value: String,
}

impl From<WireMessage> for AiMessage {
    fn from(m: WireMessage) -> Self {
        let text = m
            .content
            .into_iter()
            .find_map(|c| c.text)
            .map(|t| t.value)
            .unwrap_or_default();
        AiMessage {
            id: m.id,
            created_at: m.created_at,
            thread_id: m.thread_id.unwrap_or_default(),
            audio_url: m.audio.unwrap_or_default(),
            text,
        }
    }
}

/// Parse the body of a messages fetch. Order is left as the server sent it.
pub fn parse_messages(body: &str) -> Result<Vec<AiMessage>, ApiError> {
    let resp: MessagesResponse = serde_json::from_str(body)?;
    Ok(resp.messages.into_iter().map(AiMessage::from).collect())
}

pub fn parse_upload(body: &str) -> Result<UploadResponse, ApiError> {
    Ok(serde_json::from_str(body)?)
}

/// The remote OCR/analysis service.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send a captured photo for analysis.
    async fn upload_image(&self, path: &Path) -> Result<UploadResponse, ApiError>;

    /// Fetch every message the service has produced for a thread so far.
    async fn fetch_messages(&self, thread_id: &str) -> Result<Vec<AiMessage>, ApiError>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    upload_url: String,
    messages_url: String,
}

impl HttpBackend {
    pub fn new(upload_url: impl Into<String>, messages_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: upload_url.into(),
            messages_url: messages_url.into(),
        }
    }

    fn messages_endpoint(&self, thread_id: &str) -> String {
        format!("{}/{thread_id}", self.messages_url.trim_end_matches('/'))
    }

    async fn read_body(resp: reqwest::Response) -> Result<String, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload_image(&self, path: &Path) -> Result<UploadResponse, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(
            "Uploading {} ({} bytes) to {}",
            path.display(),
            bytes.len(),
            self.upload_url
        );

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(FORM_FILE_NAME)
            .mime_str(FORM_MIME)?;
        let form = reqwest::multipart::Form::new().part(FORM_FIELD, part);

        let resp = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;
        let body = Self::read_body(resp).await?;
        log::debug!("Upload response: {body}");
        parse_upload(&body)
    }

    async fn fetch_messages(&self, thread_id: &str) -> Result<Vec<AiMessage>, ApiError> {
        let url = self.messages_endpoint(thread_id);
        log::debug!("Fetching messages from {url}");
        let resp = self.client.get(&url).send().await?;
        let body = Self::read_body(resp).await?;
        parse_messages(&body)
    }
}
